//! Offline-first PIN login.
//!
//! The local directory is consulted first; the remote store is only read when
//! the local record is missing or its hash does not verify. Every successful
//! login ends with the record cached locally.

mod pin;

pub use pin::{hash_pin, verify_pin};

use std::sync::Arc;

use crate::db::DirectoryStore;
use crate::errors::{AuthError, RemoteError};
use crate::models::{normalize_email, DirectoryRecord, RawRecord, RecordField};
use crate::remote::{IdentityProviderPort, RemoteDirectoryPort, SubjectId};

/// Reconciles local and remote identity state for PIN login and PIN reset.
pub struct IdentityReconciler {
    store: Arc<dyn DirectoryStore>,
    remote: Arc<dyn RemoteDirectoryPort>,
    identity: Arc<dyn IdentityProviderPort>,
}

impl IdentityReconciler {
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        remote: Arc<dyn RemoteDirectoryPort>,
        identity: Arc<dyn IdentityProviderPort>,
    ) -> Self {
        Self {
            store,
            remote,
            identity,
        }
    }

    /// Log in with email and PIN.
    ///
    /// An unknown email and a wrong PIN both yield
    /// [`AuthError::InvalidCredentials`].
    pub async fn login_by_pin(&self, email: &str, pin: &str) -> Result<DirectoryRecord, AuthError> {
        let normalized = normalize_email(email);
        if normalized.is_empty() || pin.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        match self.store.get_by_email(email, true).await {
            Ok(Some(local)) => {
                if local.pin_hash.as_deref().is_some_and(|h| verify_pin(pin, h)) {
                    tracing::info!("Offline login for {}", normalized);
                    return Ok(self.complete_offline_login(local).await);
                }
                tracing::debug!("Local PIN check failed for {}, trying remote", normalized);
            }
            Ok(None) => {
                tracing::debug!("No local record for {}, trying remote", normalized);
            }
            Err(e) => {
                tracing::warn!("Local lookup failed for {}: {}", normalized, e);
            }
        }

        let Some((raw, from_admin)) = self.find_remote(email).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        let verified = raw
            .pin_hash
            .as_deref()
            .is_some_and(|h| verify_pin(pin, h));
        if !verified {
            return Err(AuthError::InvalidCredentials);
        }

        let doc_id = raw.doc_id.clone();
        let previous_subject = raw.auth_subject_id.clone();
        let Some(mut record) = DirectoryRecord::from_raw(raw) else {
            tracing::warn!("Remote record for {} has no usable key", normalized);
            return Err(AuthError::InvalidCredentials);
        };
        if from_admin {
            record.is_admin = true;
        }

        let subject = self.identity.bind_anonymous_session().await?;
        if previous_subject.as_deref() != Some(subject.as_str()) {
            self.write_subject(&doc_id, &subject).await;
        }
        record.auth_subject_id = Some(subject);

        if let Err(e) = self.store.upsert_one(&record).await {
            tracing::warn!("Failed to cache record after remote login: {}", e);
        }

        tracing::info!("Remote login for {}", normalized);
        Ok(record)
    }

    /// Replace the PIN for `email`, remote first.
    ///
    /// A failed remote write leaves local state untouched. A failed local
    /// mirror after a successful remote write is only logged.
    pub async fn apply_new_pin(&self, email: &str, new_pin: &str) -> Result<(), AuthError> {
        if new_pin.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        let normalized = normalize_email(email);

        let Some((mut raw, from_admin)) = self.find_remote(email).await? else {
            return Err(AuthError::NotFound);
        };

        let hash = hash_pin(new_pin);
        self.remote.write_pin(&raw.doc_id, &hash).await?;
        tracing::info!("PIN updated remotely for {}", normalized);

        let mirrored = match self.store.get_by_email(email, true).await {
            Ok(Some(mut local)) => {
                local.pin_hash = Some(hash);
                self.store.upsert_one(&local).await
            }
            Ok(None) => {
                raw.pin_hash = Some(hash);
                match DirectoryRecord::from_raw(raw) {
                    Some(mut record) => {
                        record.is_admin |= from_admin;
                        self.store.upsert_one(&record).await
                    }
                    None => Ok(()),
                }
            }
            Err(e) => Err(e),
        };
        if let Err(e) = mirrored {
            tracing::warn!("PIN updated remotely but local mirror failed: {}", e);
        }

        Ok(())
    }

    /// Normalized email, then the email as typed, then the administrators
    /// collection. The flag marks an administrators match.
    async fn find_remote(&self, email: &str) -> Result<Option<(RawRecord, bool)>, AuthError> {
        let normalized = normalize_email(email);
        let raw_case = email.trim();

        if let Some(raw) = absent_if_not_found(self.remote.fetch_by_email(&normalized).await)? {
            return Ok(Some((raw, false)));
        }
        if raw_case != normalized {
            if let Some(raw) = absent_if_not_found(self.remote.fetch_by_email(raw_case).await)? {
                return Ok(Some((raw, false)));
            }
        }
        if let Some(raw) =
            absent_if_not_found(self.remote.fetch_by_admin_email(&normalized).await)?
        {
            return Ok(Some((raw, true)));
        }

        Ok(None)
    }

    async fn complete_offline_login(&self, mut record: DirectoryRecord) -> DirectoryRecord {
        let subject = match self.identity.bind_anonymous_session().await {
            Ok(subject) => subject,
            Err(e) => {
                tracing::warn!("Session bind failed, continuing offline: {}", e);
                return record;
            }
        };

        if record.auth_subject_id.as_deref() == Some(subject.as_str()) {
            return record;
        }

        self.write_subject(&record.record_id, &subject).await;
        record.auth_subject_id = Some(subject);
        if let Err(e) = self.store.upsert_one(&record).await {
            tracing::warn!("Failed to persist refreshed subject id: {}", e);
        }
        record
    }

    async fn write_subject(&self, key: &str, subject: &SubjectId) {
        let value = serde_json::Value::String(subject.clone());
        if let Err(e) = self
            .remote
            .write_field(key, RecordField::AuthSubjectId, value)
            .await
        {
            tracing::warn!("Failed to bind subject id on remote record {}: {}", key, e);
        }
    }
}

fn absent_if_not_found(
    result: Result<Option<RawRecord>, RemoteError>,
) -> Result<Option<RawRecord>, RemoteError> {
    match result {
        Err(RemoteError::NotFound(_)) => Ok(None),
        other => other,
    }
}
