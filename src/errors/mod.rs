//! Error handling module for the directory core.
//!
//! One error enum per concern. Every variant maps to a stable code string and
//! reports whether the caller may retry it.

use thiserror::Error;

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const TRANSIENT_NETWORK: &str = "TRANSIENT_NETWORK";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const REMOTE_REJECTED: &str = "REMOTE_REJECTED";
    pub const INVALID_CREDENTIALS: &str = "INVALID_CREDENTIALS";
    pub const SCHEMA_MISMATCH: &str = "SCHEMA_MISMATCH";
    pub const PARTIAL_SYNC_FAILURE: &str = "PARTIAL_SYNC_FAILURE";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const SERIALIZATION_ERROR: &str = "SERIALIZATION_ERROR";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
}

/// Local persistence failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Database(_) => codes::DATABASE_ERROR,
            StoreError::Serialization(_) => codes::SERIALIZATION_ERROR,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        StoreError::Serialization(err.to_string())
    }
}

/// Failure reported by one of the remote ports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Network-level failure; the same call may succeed later.
    #[error("Transient network error: {0}")]
    Transient(String),
    #[error("Remote document not found: {0}")]
    NotFound(String),
    /// The remote store refused the request (permissions, bad payload).
    #[error("Remote rejected request: {0}")]
    Rejected(String),
}

impl RemoteError {
    pub fn code(&self) -> &'static str {
        match self {
            RemoteError::Transient(_) => codes::TRANSIENT_NETWORK,
            RemoteError::NotFound(_) => codes::NOT_FOUND,
            RemoteError::Rejected(_) => codes::REMOTE_REJECTED,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

/// Errors from configuration writes and cache maintenance.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cache schema version {found} does not match expected {expected}")]
    SchemaMismatch { expected: i64, found: i64 },
    #[error("Invalid area request: {0}")]
    Validation(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::SchemaMismatch { .. } => codes::SCHEMA_MISMATCH,
            ConfigError::Validation(_) => codes::VALIDATION_ERROR,
            ConfigError::Remote(e) => e.code(),
            ConfigError::Store(e) => e.code(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ConfigError::Remote(e) if e.is_retryable())
    }
}

/// Errors from directory synchronization and record mutations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Page fetch after {after_key:?} failed: {source}")]
    PageFetch {
        after_key: Option<String>,
        #[source]
        source: RemoteError,
    },
    #[error("Record {0} not found")]
    NotFound(String),
    #[error("Invalid record: {0}")]
    Validation(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::PageFetch { source, .. } => source.code(),
            SyncError::NotFound(_) => codes::NOT_FOUND,
            SyncError::Validation(_) => codes::VALIDATION_ERROR,
            SyncError::Remote(e) => e.code(),
            SyncError::Store(e) => e.code(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::PageFetch { source, .. } | SyncError::Remote(source) => {
                source.is_retryable()
            }
            _ => false,
        }
    }
}

/// Errors from PIN login and PIN reset.
///
/// `InvalidCredentials` deliberately carries no detail: an unknown email and a
/// wrong PIN must be indistinguishable to the caller.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or PIN")]
    InvalidCredentials,
    #[error("No directory record for this email")]
    NotFound,
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => codes::INVALID_CREDENTIALS,
            AuthError::NotFound => codes::NOT_FOUND,
            AuthError::Remote(e) => e.code(),
            AuthError::Store(e) => e.code(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Remote(e) if e.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(RemoteError::Transient("timeout".into()).is_retryable());
        assert!(!RemoteError::NotFound("x".into()).is_retryable());
        assert!(!RemoteError::Rejected("denied".into()).is_retryable());
    }

    #[test]
    fn test_error_codes_propagate_through_wrappers() {
        let err = SyncError::PageFetch {
            after_key: Some("42".into()),
            source: RemoteError::Transient("reset".into()),
        };
        assert_eq!(err.code(), codes::TRANSIENT_NETWORK);
        assert!(err.is_retryable());

        let err = AuthError::from(RemoteError::Rejected("denied".into()));
        assert_eq!(err.code(), codes::REMOTE_REJECTED);
        assert!(!err.is_retryable());

        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "Invalid email or PIN"
        );
    }
}
