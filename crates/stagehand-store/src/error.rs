//! Error types for stagehand-store

use thiserror::Error;

use crate::records::TestStatus;

/// Errors that can occur in the artifact store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Record not found
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Insert collided with an existing record
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    /// Status transition not allowed
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: TestStatus, to: TestStatus },

    /// Store file could not be read or written
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Store document could not be encoded or decoded
    #[error("store serialization failed: {0}")]
    Serialization(String),

    /// Backend refused the write
    #[error("store write rejected: {0}")]
    WriteRejected(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl StoreError {
    /// Whether this error means the requested record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
