//! Platform storage primitives.
//!
//! Adapters never reach for a browser global directly. They are created from
//! a [`Platform`], a bundle of optional handles onto the storages the current
//! execution context provides. A missing handle is how "this backend does not
//! exist here" is expressed: the matching factory then falls back to the
//! no-op adapter.
//!
//! The browser implementation of these traits lives in the wasm crate; the
//! in-memory one in [`crate::memory`].
//!
//! Everything here is single-threaded. Asynchronous primitives complete on
//! the platform's own event queue, never on another thread.

use crate::error::StorageResult;
use crate::extension::ExtensionArea;
use serde_json::Value;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Callback run once an asynchronous platform operation completes.
pub type Completion<T> = Box<dyn FnOnce(StorageResult<T>)>;

/// Handle returned when subscribing to platform change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// A change made to a web storage area by another execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Changed key, `None` when the whole area was cleared.
    pub key: Option<String>,
    /// Previous raw value.
    pub old_value: Option<String>,
    /// New raw value, `None` when the key was removed.
    pub new_value: Option<String>,
}

/// Receives [`StorageEvent`]s.
pub type StorageEventHandler = Rc<dyn Fn(&StorageEvent)>;

/// A change reported by extension storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    /// Value before the change.
    pub old_value: Option<Value>,
    /// Value after the change, `None` when the key was removed.
    pub new_value: Option<Value>,
}

/// Receives extension storage changes along with the name of the area they
/// happened in.
pub type ExtensionChangeHandler = Rc<dyn Fn(&BTreeMap<String, StorageChange>, &str)>;

/// Access to `document.cookie`.
pub trait DocumentCookies {
    /// Returns the full cookie string (`a=1; b=2`).
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses access.
    fn cookie_string(&self) -> StorageResult<String>;

    /// Writes one cookie assignment (`name=value; path=/; samesite=Strict`).
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses the write.
    fn write_cookie(&self, assignment: &str) -> StorageResult<()>;
}

/// A synchronous key/value area such as `localStorage` or `sessionStorage`.
pub trait WebStorageArea {
    /// Reads the raw value under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses access.
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;

    /// Writes the raw value under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is refused (quota, privacy mode).
    fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses access.
    fn remove_item(&self, key: &str) -> StorageResult<()>;

    /// Subscribes to changes made to this area by *other* execution
    /// contexts. Writes made through this handle are never reported.
    fn subscribe(&self, handler: StorageEventHandler) -> SubscriptionId;

    /// Drops a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// An asynchronous key/value store (IndexedDB object store).
pub trait AsyncKeyValueStore {
    /// Reads `key` and hands the raw value to `done` later.
    fn get(&self, key: &str, done: Completion<Option<String>>);

    /// Writes `value` under `key`. Completion is fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be issued.
    fn set(&self, key: &str, value: String) -> StorageResult<()>;

    /// Deletes `key`. Completion is fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be issued.
    fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Opens [`AsyncKeyValueStore`]s.
pub trait IndexedDbFactory {
    /// Opens (or lazily creates) `store_name` inside `database_name`.
    fn open_store(&self, database_name: &str, store_name: &str) -> Rc<dyn AsyncKeyValueStore>;
}

/// Extension storage (`chrome.storage`). Values are stored structurally.
pub trait ExtensionStorageApi {
    /// Reads `key` from `area` and hands the value to `done` later.
    fn get(&self, area: ExtensionArea, key: &str, done: Completion<Option<Value>>);

    /// Writes `value` under `key` in `area`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be issued.
    fn set(&self, area: ExtensionArea, key: &str, value: Value) -> StorageResult<()>;

    /// Removes `key` from `area`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be issued.
    fn remove(&self, area: ExtensionArea, key: &str) -> StorageResult<()>;

    /// Subscribes to changes in every area.
    fn add_change_listener(&self, handler: ExtensionChangeHandler) -> SubscriptionId;

    /// Drops a change subscription. Unknown ids are ignored.
    fn remove_change_listener(&self, id: SubscriptionId);
}

/// The storages available to the current execution context.
///
/// Cloning is cheap; handles are shared.
#[derive(Clone, Default)]
pub struct Platform {
    cookies: Option<Rc<dyn DocumentCookies>>,
    local_storage: Option<Rc<dyn WebStorageArea>>,
    session_storage: Option<Rc<dyn WebStorageArea>>,
    indexed_db: Option<Rc<dyn IndexedDbFactory>>,
    extension_storage: Option<Rc<dyn ExtensionStorageApi>>,
}

impl Platform {
    /// A platform without any storage, as seen from a server or a plain
    /// native process. Every factory falls back to the no-op adapter.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// Sets the cookie handle.
    #[must_use]
    pub fn with_cookies(mut self, cookies: Rc<dyn DocumentCookies>) -> Self {
        self.cookies = Some(cookies);
        self
    }

    /// Sets the `localStorage` handle.
    #[must_use]
    pub fn with_local_storage(mut self, area: Rc<dyn WebStorageArea>) -> Self {
        self.local_storage = Some(area);
        self
    }

    /// Sets the `sessionStorage` handle.
    #[must_use]
    pub fn with_session_storage(mut self, area: Rc<dyn WebStorageArea>) -> Self {
        self.session_storage = Some(area);
        self
    }

    /// Sets the IndexedDB handle.
    #[must_use]
    pub fn with_indexed_db(mut self, factory: Rc<dyn IndexedDbFactory>) -> Self {
        self.indexed_db = Some(factory);
        self
    }

    /// Sets the extension storage handle.
    #[must_use]
    pub fn with_extension_storage(mut self, api: Rc<dyn ExtensionStorageApi>) -> Self {
        self.extension_storage = Some(api);
        self
    }

    /// Returns the cookie handle.
    pub fn cookies(&self) -> Option<Rc<dyn DocumentCookies>> {
        self.cookies.clone()
    }

    /// Returns the `localStorage` handle.
    pub fn local_storage(&self) -> Option<Rc<dyn WebStorageArea>> {
        self.local_storage.clone()
    }

    /// Returns the `sessionStorage` handle.
    pub fn session_storage(&self) -> Option<Rc<dyn WebStorageArea>> {
        self.session_storage.clone()
    }

    /// Returns the IndexedDB handle.
    pub fn indexed_db(&self) -> Option<Rc<dyn IndexedDbFactory>> {
        self.indexed_db.clone()
    }

    /// Returns the extension storage handle.
    pub fn extension_storage(&self) -> Option<Rc<dyn ExtensionStorageApi>> {
        self.extension_storage.clone()
    }

    /// Whether any storage is available at all.
    pub fn is_browser(&self) -> bool {
        self.cookies.is_some()
            || self.local_storage.is_some()
            || self.session_storage.is_some()
            || self.indexed_db.is_some()
            || self.extension_storage.is_some()
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("cookies", &self.cookies.is_some())
            .field("local_storage", &self.local_storage.is_some())
            .field("session_storage", &self.session_storage.is_some())
            .field("indexed_db", &self.indexed_db.is_some())
            .field("extension_storage", &self.extension_storage.is_some())
            .finish()
    }
}
