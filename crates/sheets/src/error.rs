//! Error types for the Sheets client crate.

use banksheet_core::SyncError;
use thiserror::Error;

/// Result type alias for Sheets API operations.
pub type Result<T> = std::result::Result<T, SheetsError>;

/// Errors that can occur while talking to the Sheets API.
#[derive(Debug, Error)]
pub enum SheetsError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from the Sheets service
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Authentication error (missing or malformed token)
    #[error("authentication error: {0}")]
    Auth(String),

    /// Invalid request (missing required data, etc.)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl SheetsError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Map Sheets API failures into the engine's error taxonomy: 401 means the
/// credential is bad, 403 means the credential lacks write access to this
/// spreadsheet, everything else is a transient store failure.
impl From<SheetsError> for SyncError {
    fn from(err: SheetsError) -> Self {
        match err {
            SheetsError::Api { status: 401, message } => SyncError::auth(message),
            SheetsError::Api { status: 403, message } => SyncError::permission(format!(
                "no write access to the destination spreadsheet: {message}"
            )),
            SheetsError::Auth(message) => SyncError::auth(message),
            other => SyncError::transient(other.to_string()),
        }
    }
}
