//! # Persistore Storage
//!
//! Storage contract, adapters and encryption layer for Persistore.
//!
//! Every adapter implements [`StorageInterface`]: a keyed store of typed
//! values. Adapters that can observe changes made outside the current
//! binding (other tabs, other extension pages, asynchronous reads) also
//! implement [`SelfUpdateStorageInterface`].
//!
//! ## Design Principles
//!
//! - Adapters are created from a [`Platform`]; a missing backend yields the
//!   no-op adapter and a one-time warning, never an error
//! - Values go through the process-wide [`Serialization`] before reaching a
//!   text backend
//! - Platform subscriptions only exist while listeners are registered
//! - Single-threaded: adapters are shared through `Rc`
//!
//! ## Available Adapters
//!
//! - [`CookieStorage`] - `document.cookie`
//! - [`WebStorage`] - `localStorage` and `sessionStorage`
//! - [`IndexedStorage`] - IndexedDB, asynchronous reads
//! - [`ExtensionStorage`] - `chrome.storage`, asynchronous reads
//! - [`EncryptionStorage`] - wrapper that encrypts keys and values
//! - [`NoopStorage`] - stores nothing
//!
//! ## Example
//!
//! ```rust
//! use persistore_storage::memory::MemoryPlatform;
//! use persistore_storage::{create_cookie_storage, StorageInterface};
//!
//! let memory = MemoryPlatform::new();
//! let cookies = create_cookie_storage(&memory.platform());
//! cookies.set_value("theme", &"dark".to_string()).unwrap();
//! let theme: Option<String> = cookies.get_value("theme").unwrap();
//! assert_eq!(theme.as_deref(), Some("dark"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cookie;
mod encryption;
mod error;
mod extension;
mod indexed;
mod interface;
mod listener;
pub mod memory;
mod noop;
mod platform;
mod serialization;
mod warnings;
mod web_storage;

pub use cookie::{
    cookie_assignment, create_cookie_storage, create_cookie_storage_with, decode_component, encode_component,
    find_cookie, CookieOptions, CookieStorage, SameSite,
};
pub use encryption::{
    create_encrypted_storage, create_encryption_storage, Encryption, EncryptionStorage, GcmEncryption, NONCE_SIZE,
};
pub use error::{StorageError, StorageResult};
pub use extension::{create_extension_storage, ExtensionArea, ExtensionStorage};
pub use indexed::{
    create_indexed_storage, create_indexed_storage_with, IndexedDbConfig, IndexedStorage, DEFAULT_DATABASE_NAME,
    DEFAULT_STORE_NAME,
};
pub use interface::{Adapter, Listener, SelfUpdateStorageInterface, Storage, StorageInterface};
pub use listener::{Hook, ListenerHooks, ListenerIdentity, ListenerRegistry};
pub use noop::{create_noop_storage, NoopStorage};
pub use platform::{
    AsyncKeyValueStore, Completion, DocumentCookies, ExtensionChangeHandler, ExtensionStorageApi, IndexedDbFactory,
    Platform, StorageChange, StorageEvent, StorageEventHandler, SubscriptionId, WebStorageArea,
};
pub use serialization::{
    add_serializable_class, deserialize, from_value, reset_serialization, serialization, serialize,
    set_serialization, set_serialization_backend, to_value, ClassDefinition, ClassRegistrar, DeserializeFn,
    FnSerialization, JsonSerialization, Serialization, SerializeFn,
};
pub use warnings::{disable_warnings, emitted_warnings, warnings_enabled};
pub use web_storage::{create_local_storage, create_session_storage, WebStorage, WebStorageKind};
