//! Error types for the sheet sync engine.

use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Retry policy class for sync failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Errors that can occur while syncing against the destination store.
///
/// Errors bubble to the caller unchanged in kind; the engine performs no
/// internal retries. Re-running a whole sync after a transient failure is
/// safe because writes are idempotent by identifier.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Credential for the destination store is invalid or expired.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Credential is valid but lacks write access to the destination.
    #[error("permission error: {0}")]
    Permission(String),

    /// Network or service failure not classified as auth/permission.
    #[error("store error: {0}")]
    Transient(String),

    /// Expected column or header layout absent from an existing tab.
    #[error("schema inconsistency: {0}")]
    Schema(String),
}

impl SyncError {
    /// Create an authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Create a permission error
    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission(message.into())
    }

    /// Create a transient store error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Create a schema inconsistency error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Classify error for the caller's retry policy.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Auth(_) => RetryClass::ReauthRequired,
            Self::Permission(_) => RetryClass::Permanent,
            Self::Transient(_) => RetryClass::Retryable,
            Self::Schema(_) => RetryClass::Permanent,
        }
    }
}
