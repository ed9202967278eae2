//! # Persistore Core
//!
//! Keeps the value of a reactive store in a browser storage.
//!
//! This crate provides:
//! - [`WritableStore`], a minimal observable value
//! - [`persist`], which loads a store from a storage, writes every change
//!   back, and applies changes the storage reports
//! - [`StorageRegistry`], shared adapters per platform
//! - `persist_*` and `*_writable` shortcuts over the registry
//!
//! ## Example
//!
//! ```rust
//! use persistore_core::{local_writable, StorageRegistry, Writable};
//! use persistore_storage::memory::MemoryPlatform;
//!
//! let memory = MemoryPlatform::new();
//! let registry = StorageRegistry::new(memory.platform());
//!
//! let theme = local_writable(&registry, "theme", "light".to_string(), None).unwrap();
//! theme.set("dark".to_string());
//! assert_eq!(memory.local_storage().item("theme").as_deref(), Some("\"dark\""));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod aliases;
mod error;
mod persist;
mod registry;
mod store;

pub use aliases::{
    cookie_writable, local_writable, persist_browser_local, persist_browser_session, persist_cookie,
    session_writable, writable,
};
pub use error::{CoreError, CoreResult};
pub use persist::{persist, PersistentStore};
pub use registry::StorageRegistry;
pub use store::{StartStopNotifier, Stop, Subscriber, Unsubscriber, Writable, WritableStore};

/// Creates a plain, non-persisted [`WritableStore`].
pub use store::writable as plain_writable;
