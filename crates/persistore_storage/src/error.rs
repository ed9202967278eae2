//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// A missing backend is never reported through this type: adapter creation
/// falls back to the no-op adapter instead.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A value could not be turned into text.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored text could not be turned back into a value.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Encryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Decryption failed (wrong key, tampered or malformed ciphertext).
    #[error("decryption error: {0}")]
    Decryption(String),

    /// The encryption key is malformed or has an unsupported size.
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    /// The underlying platform storage rejected the operation.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Creates a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization(message.into())
    }

    /// Creates an encryption error.
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption(message.into())
    }

    /// Creates a decryption error.
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption(message.into())
    }

    /// Creates an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey(message.into())
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}
