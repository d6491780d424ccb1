//! Engine error taxonomy

use apptrust_core::CoreError;
use apptrust_publisher::PublishError;
use apptrust_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Referenced entity or version does not exist (or not under this entity)
    #[error("Not found: {0}")]
    NotFound(String),

    /// A reference points at the wrong entity or at nothing
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// The external publish target failed; carries its diagnostic text
    #[error("Upstream publish failed: {0}")]
    Upstream(String),

    /// Stored state breaks a chain invariant; never repaired silently
    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl From<PublishError> for EngineError {
    fn from(err: PublishError) -> Self {
        EngineError::Upstream(err.to_string())
    }
}
