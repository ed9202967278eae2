//! IndexedDB storage.
//!
//! IndexedDB cannot answer synchronously. [`IndexedStorage`] therefore reads
//! in two channels: `get_value` always returns `Ok(None)` right away and
//! schedules the real read; once it completes, the decoded value is handed
//! to every listener registered for that key. A key that is not stored
//! produces no notification.

use crate::error::StorageResult;
use crate::interface::{Adapter, Listener, SelfUpdateStorageInterface, Storage, StorageInterface};
use crate::listener::ListenerRegistry;
use crate::noop::NoopStorage;
use crate::platform::{AsyncKeyValueStore, Platform};
use crate::serialization::{serialization, serialize};
use crate::warnings::warn_storage_not_found;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::rc::Rc;
use tracing::error;

/// Default database name.
pub const DEFAULT_DATABASE_NAME: &str = "persistore";
/// Default object store name.
pub const DEFAULT_STORE_NAME: &str = "persist";

/// Where [`IndexedStorage`] keeps its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedDbConfig {
    /// Database name.
    pub database_name: String,
    /// Object store name.
    pub store_name: String,
}

impl Default for IndexedDbConfig {
    fn default() -> Self {
        Self {
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            store_name: DEFAULT_STORE_NAME.to_string(),
        }
    }
}

impl IndexedDbConfig {
    /// Creates a configuration for `store_name` inside `database_name`.
    pub fn new(database_name: impl Into<String>, store_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            store_name: store_name.into(),
        }
    }
}

/// Storage implementation that uses IndexedDB.
#[derive(Clone)]
pub struct IndexedStorage {
    store: Rc<dyn AsyncKeyValueStore>,
    listeners: Rc<ListenerRegistry<Value>>,
    config: IndexedDbConfig,
}

impl IndexedStorage {
    /// Creates an adapter over an opened object store.
    pub fn new(store: Rc<dyn AsyncKeyValueStore>, config: IndexedDbConfig) -> Self {
        Self {
            store,
            listeners: Rc::new(ListenerRegistry::new()),
            config,
        }
    }

    /// Where values are kept.
    pub fn config(&self) -> &IndexedDbConfig {
        &self.config
    }

    /// Schedules a read of `key`; the result goes to the listeners.
    pub fn request(&self, key: &str) {
        let listeners = Rc::clone(&self.listeners);
        let owned_key = key.to_string();
        self.store.get(
            key,
            Box::new(move |result| match result {
                Ok(Some(text)) => match serialization().deserialize(&text) {
                    Ok(value) => listeners.call_listeners(&owned_key, Some(value)),
                    Err(err) => error!(key = %owned_key, error = %err, "undecodable IndexedDB value"),
                },
                Ok(None) => {}
                Err(err) => error!(key = %owned_key, error = %err, "IndexedDB read failed"),
            }),
        );
    }
}

impl std::fmt::Debug for IndexedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedStorage")
            .field("config", &self.config)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl<T: Serialize + DeserializeOwned> StorageInterface<T> for IndexedStorage {
    fn get_value(&self, key: &str) -> StorageResult<Option<T>> {
        self.request(key);
        Ok(None)
    }

    fn set_value(&self, key: &str, value: &T) -> StorageResult<()> {
        self.store.set(key, serialize(value)?)
    }

    fn delete_value(&self, key: &str) -> StorageResult<()> {
        self.store.delete(key)
    }
}

impl<T: Serialize + DeserializeOwned + 'static> SelfUpdateStorageInterface<T> for IndexedStorage {
    fn add_listener(&self, key: &str, listener: &Listener<T>) {
        self.listeners.add_typed(key, listener);
    }

    fn remove_listener(&self, key: &str, listener: &Listener<T>) {
        self.listeners.remove_typed(key, listener);
    }
}

impl<T: Serialize + DeserializeOwned + 'static> From<Rc<Adapter<IndexedStorage>>> for Storage<T> {
    fn from(storage: Rc<Adapter<IndexedStorage>>) -> Self {
        Storage::SelfUpdating(storage)
    }
}

/// Storage implementation that uses the browser IndexedDB, in the default
/// database.
pub fn create_indexed_storage(platform: &Platform) -> Adapter<IndexedStorage> {
    create_indexed_storage_with(platform, IndexedDbConfig::default())
}

/// Storage implementation that uses the browser IndexedDB.
pub fn create_indexed_storage_with(platform: &Platform, config: IndexedDbConfig) -> Adapter<IndexedStorage> {
    match platform.indexed_db() {
        Some(factory) => {
            let store = factory.open_store(&config.database_name, &config.store_name);
            Adapter::Available(IndexedStorage::new(store, config))
        }
        None => {
            warn_storage_not_found("IndexedDB", platform);
            Adapter::Unavailable(NoopStorage)
        }
    }
}
