//! Error types for Persistore core.

use persistore_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while binding or deleting persisted stores.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage adapter error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
