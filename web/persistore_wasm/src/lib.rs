//! # Persistore WASM
//!
//! Browser implementation of the Persistore platform traits.
//!
//! This crate provides:
//! - cookies through `document.cookie`
//! - `localStorage` and `sessionStorage`, with cross-tab `storage` events
//! - IndexedDB object stores
//! - `chrome.storage` for browser extensions
//!
//! ## Usage
//!
//! ```no_run
//! use persistore_core::{local_writable, StorageRegistry, Writable};
//! use persistore_wasm::BrowserPlatform;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = StorageRegistry::new(BrowserPlatform::detect());
//! let counter = local_writable(&registry, "counter", 0_u32, None)?;
//! counter.update(|count| count + 1);
//! # Ok(())
//! # }
//! ```
//!
//! Every storage the page does not provide is simply missing from the
//! detected platform; the adapters then fall back to no-op storage and
//! emit a one-time warning.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cookies;
mod error;
mod extension;
mod indexed_db;
mod platform;
mod utils;
mod web_storage;

pub use cookies::BrowserCookies;
pub use error::{WasmError, WasmResult};
pub use extension::BrowserExtensionStorage;
pub use indexed_db::{BrowserIndexedDb, BrowserObjectStore};
pub use platform::BrowserPlatform;
pub use web_storage::BrowserStorageArea;

use wasm_bindgen::prelude::*;

/// Initialize the WASM module.
///
/// This sets up panic hooks for better error messages in the browser console.
#[wasm_bindgen(start)]
pub fn init() {
    utils::set_panic_hook();
}
