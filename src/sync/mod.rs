//! Directory synchronization against the remote collection.
//!
//! A full resync buffers every page before touching the local store, so an
//! aborted or failed run leaves it exactly as it was.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::DirectoryStore;
use crate::errors::{RemoteError, SyncError};
use crate::models::{DirectoryRecord, RecordField, RecordPatch};
use crate::remote::RemoteDirectoryPort;

/// Outcome of a full resync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub run_id: Uuid,
    pub pages_fetched: usize,
    /// Documents received across all pages
    pub documents_seen: usize,
    pub upserted: usize,
    /// Local rows removed because the remote copy is hidden or deleted
    pub removed: usize,
    /// Documents without a usable key, or shadowed by a hidden document
    /// with the same key
    pub skipped: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Keeps the local directory in step with the remote collection.
pub struct SyncEngine {
    store: Arc<dyn DirectoryStore>,
    remote: Arc<dyn RemoteDirectoryPort>,
    page_size: usize,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        remote: Arc<dyn RemoteDirectoryPort>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            remote,
            page_size: page_size.max(1),
        }
    }

    /// Pull the whole remote collection and apply it locally.
    ///
    /// Pagination stops at the first short page. Hidden and deleted documents
    /// are removed locally, then everything else is upserted in one batch.
    /// Local rows the remote no longer lists are left alone.
    pub async fn full_resync(&self) -> Result<SyncSummary, SyncError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(%run_id, "Starting full resync (page size {})", self.page_size);

        let mut after_key: Option<String> = None;
        let mut pages_fetched = 0;
        let mut documents_seen = 0;
        let mut skipped = 0;
        let mut to_upsert: Vec<DirectoryRecord> = Vec::new();
        let mut to_remove: Vec<String> = Vec::new();
        let mut removal_keys = HashSet::new();

        loop {
            let page = self
                .remote
                .fetch_page(after_key.as_deref(), self.page_size)
                .await
                .map_err(|source| {
                    tracing::warn!(%run_id, "Page fetch after {:?} failed: {}", after_key, source);
                    SyncError::PageFetch {
                        after_key: after_key.clone(),
                        source,
                    }
                })?;

            pages_fetched += 1;
            let page_len = page.len();
            documents_seen += page_len;
            if let Some(last) = page.last() {
                after_key = Some(last.doc_id.clone());
            }

            for raw in page {
                if raw.is_excluded() {
                    match raw.effective_key() {
                        Some(key) => {
                            if removal_keys.insert(key.clone()) {
                                to_remove.push(key);
                            }
                        }
                        None => skipped += 1,
                    }
                    continue;
                }
                match DirectoryRecord::from_raw(raw) {
                    Some(record) => to_upsert.push(record),
                    None => skipped += 1,
                }
            }

            tracing::debug!(%run_id, "Fetched page {} with {} documents", pages_fetched, page_len);
            if page_len < self.page_size {
                break;
            }
        }

        // A key hidden under any document stays hidden
        let before = to_upsert.len();
        to_upsert.retain(|r| !removal_keys.contains(&r.record_id));
        skipped += before - to_upsert.len();

        let removed = self.store.delete_many(&to_remove).await?;
        let upserted = self.store.upsert_many(&to_upsert).await?;

        let summary = SyncSummary {
            run_id,
            pages_fetched,
            documents_seen,
            upserted,
            removed,
            skipped,
            started_at,
            finished_at: Utc::now(),
        };
        tracing::info!(
            %run_id,
            "Full resync done: {} pages, {} upserted, {} removed, {} skipped",
            summary.pages_fetched,
            summary.upserted,
            summary.removed,
            summary.skipped
        );
        Ok(summary)
    }

    /// Resync only when the local store is empty; otherwise return it as is.
    pub async fn incremental_refresh_if_empty(&self) -> Result<Vec<DirectoryRecord>, SyncError> {
        if self.store.count().await? == 0 {
            tracing::info!("Local directory is empty, running full resync");
            self.full_resync().await?;
        }
        Ok(self.store.get_all().await?)
    }

    /// Create a record remotely, then cache it.
    pub async fn add_record(&self, record: DirectoryRecord) -> Result<DirectoryRecord, SyncError> {
        if record.record_id.trim().is_empty() {
            return Err(SyncError::Validation("record id must not be blank".into()));
        }
        if record.name.trim().is_empty() {
            return Err(SyncError::Validation("name must not be blank".into()));
        }
        if record.email.trim().is_empty() {
            return Err(SyncError::Validation("email must not be blank".into()));
        }

        let now = Utc::now();
        let mut record = record;
        record.created_at.get_or_insert(now);
        record.updated_at = Some(now);
        record.refresh_search_blob();

        self.remote.put_record(&record.to_raw()).await?;
        self.store.upsert_one(&record).await?;

        tracing::info!("Added record {}", record.record_id);
        Ok(record)
    }

    /// Write the patched fields remotely one by one, then merge locally.
    ///
    /// A failure part-way leaves earlier fields written remotely and the local
    /// row untouched; the next resync reconciles it.
    pub async fn update_fields(
        &self,
        key: &str,
        patch: &RecordPatch,
    ) -> Result<DirectoryRecord, SyncError> {
        if patch.is_empty() {
            return Err(SyncError::Validation("patch has no fields".into()));
        }
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(SyncError::Validation("name must not be blank".into()));
        }
        if patch.email.as_deref().is_some_and(|e| e.trim().is_empty()) {
            return Err(SyncError::Validation("email must not be blank".into()));
        }

        let mut record = self
            .store
            .get_by_key(key)
            .await?
            .ok_or_else(|| SyncError::NotFound(key.to_string()))?;

        for (field, value) in patch.remote_writes() {
            self.remote.write_field(key, field, value).await?;
        }

        patch.apply_to(&mut record);
        self.store.upsert_one(&record).await?;

        tracing::info!("Updated record {}", key);
        Ok(record)
    }

    /// Delete remotely, then locally. A remote copy that is already gone
    /// does not stop the local delete.
    pub async fn delete_record(&self, key: &str) -> Result<(), SyncError> {
        match self.remote.delete(key).await {
            Ok(()) | Err(RemoteError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        let removed = self.store.delete_by_key(key).await?;

        tracing::info!("Deleted record {} (local row removed: {})", key, removed);
        Ok(())
    }

    /// Flip the remote hidden flag. Hiding drops the local row right away;
    /// an unhidden record returns with the next resync.
    pub async fn set_hidden(&self, key: &str, hidden: bool) -> Result<(), SyncError> {
        self.remote
            .write_field(key, RecordField::IsHidden, serde_json::Value::Bool(hidden))
            .await?;
        if hidden {
            self.store.delete_by_key(key).await?;
        }

        tracing::info!("Set hidden={} on record {}", hidden, key);
        Ok(())
    }
}
