//! Worker error taxonomy.

use serde::Deserialize;

/// Result type for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

/// HTTP-like status reported for malformed event bodies.
pub const MESSAGE_FORMAT_STATUS: u16 = 422;
/// Error code reported for malformed event bodies.
pub const MESSAGE_FORMAT_CODE: &str = "error:worker:message";

/// Errors that can occur while running the worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Transport-level failure reaching or keeping the broker connection.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Queue declaration, binding or consumption could not be set up.
    #[error("Subscription failed: {0}")]
    Subscription(String),

    /// Event body is not a valid event message.
    #[error("Error parsing message: {0}")]
    MessageFormat(String),

    /// Load-or-register chain failed for a CREATE/UPDATE event.
    #[error("Registry sync failed: {0}")]
    RegistrySync(#[from] SyncError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl WorkerError {
    /// Error code and HTTP-like status, for the variants that carry one.
    pub fn code_and_status(&self) -> Option<(&str, u16)> {
        match self {
            WorkerError::MessageFormat(_) => Some((MESSAGE_FORMAT_CODE, MESSAGE_FORMAT_STATUS)),
            WorkerError::RegistrySync(e) => Some((e.code.as_str(), e.status)),
            _ => None,
        }
    }
}

/// Structured failure reported by the resource store or the registry.
///
/// The wire shape matches the store's error bodies
/// (`{"error": ..., "errorDescription": ...}`); `status` comes from the response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, thiserror::Error)]
#[error("{code} ({status}): {description}")]
pub struct SyncError {
    #[serde(rename = "error")]
    pub code: String,
    #[serde(rename = "errorDescription", default)]
    pub description: String,
    #[serde(skip)]
    pub status: u16,
}

impl SyncError {
    pub fn new(code: impl Into<String>, description: impl Into<String>, status: u16) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            status,
        }
    }

    /// Store could not be reached or answered with garbage.
    pub fn unavailable(description: impl Into<String>) -> Self {
        Self::new("error:resource:unavailable", description, 503)
    }
}
