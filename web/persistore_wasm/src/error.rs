//! Error types for the browser platform.

use persistore_storage::StorageError;
use thiserror::Error;
use wasm_bindgen::prelude::*;

/// Errors that can occur while talking to browser storage APIs.
#[derive(Debug, Error)]
pub enum WasmError {
    /// JavaScript error occurred.
    #[error("JS error: {0}")]
    JsError(String),

    /// Feature not supported in current browser.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// IndexedDB operation failed.
    #[error("IndexedDB error: {0}")]
    IndexedDb(String),

    /// A value could not cross the JS boundary.
    #[error("conversion error: {0}")]
    Conversion(String),
}

impl From<WasmError> for JsValue {
    fn from(err: WasmError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

impl From<JsValue> for WasmError {
    fn from(val: JsValue) -> Self {
        WasmError::JsError(val.as_string().unwrap_or_else(|| format!("{:?}", val)))
    }
}

impl From<serde_wasm_bindgen::Error> for WasmError {
    fn from(err: serde_wasm_bindgen::Error) -> Self {
        WasmError::Conversion(err.to_string())
    }
}

impl From<WasmError> for StorageError {
    fn from(err: WasmError) -> Self {
        StorageError::backend(err.to_string())
    }
}

/// Result type for WASM operations.
pub type WasmResult<T> = Result<T, WasmError>;

/// Maps a failed browser call into a storage error.
pub(crate) fn js_to_storage(val: JsValue) -> StorageError {
    WasmError::from(val).into()
}
