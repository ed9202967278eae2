//! Shortcuts over the registry's shared adapters.

use crate::error::CoreResult;
use crate::persist::{persist, PersistentStore};
use crate::registry::StorageRegistry;
use crate::store::{StartStopNotifier, Writable, WritableStore};
use serde::{de::DeserializeOwned, Serialize};

/// Persists `store` into the cookie named `cookie_name`.
///
/// # Errors
///
/// Returns an error if the stored value cannot be read.
pub fn persist_cookie<T, W>(registry: &StorageRegistry, store: W, cookie_name: &str) -> CoreResult<PersistentStore<T, W>>
where
    T: Serialize + DeserializeOwned + 'static,
    W: Writable<T> + Clone + 'static,
{
    persist(store, registry.cookie(), cookie_name)
}

/// Persists `store` into the browser local storage under `key`.
///
/// # Errors
///
/// Returns an error if the stored value cannot be read.
pub fn persist_browser_local<T, W>(registry: &StorageRegistry, store: W, key: &str) -> CoreResult<PersistentStore<T, W>>
where
    T: Serialize + DeserializeOwned + 'static,
    W: Writable<T> + Clone + 'static,
{
    persist(store, registry.local(), key)
}

/// Persists `store` into the browser session storage under `key`.
///
/// # Errors
///
/// Returns an error if the stored value cannot be read.
pub fn persist_browser_session<T, W>(
    registry: &StorageRegistry,
    store: W,
    key: &str,
) -> CoreResult<PersistentStore<T, W>>
where
    T: Serialize + DeserializeOwned + 'static,
    W: Writable<T> + Clone + 'static,
{
    persist(store, registry.session(), key)
}

fn new_store<T>(initial_value: T, start: Option<StartStopNotifier<T>>) -> WritableStore<T>
where
    T: Clone + PartialEq + 'static,
{
    match start {
        Some(start) => WritableStore::with_start(initial_value, start),
        None => WritableStore::new(initial_value),
    }
}

/// Creates a store persisted in the browser local storage.
///
/// # Errors
///
/// Returns an error if the stored value cannot be read.
pub fn local_writable<T>(
    registry: &StorageRegistry,
    key: &str,
    initial_value: T,
    start: Option<StartStopNotifier<T>>,
) -> CoreResult<PersistentStore<T, WritableStore<T>>>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + 'static,
{
    persist_browser_local(registry, new_store(initial_value, start), key)
}

/// Creates a store persisted in the browser local storage. Same as
/// [`local_writable`].
///
/// # Errors
///
/// Returns an error if the stored value cannot be read.
pub fn writable<T>(
    registry: &StorageRegistry,
    key: &str,
    initial_value: T,
    start: Option<StartStopNotifier<T>>,
) -> CoreResult<PersistentStore<T, WritableStore<T>>>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + 'static,
{
    local_writable(registry, key, initial_value, start)
}

/// Creates a store persisted in the browser session storage.
///
/// # Errors
///
/// Returns an error if the stored value cannot be read.
pub fn session_writable<T>(
    registry: &StorageRegistry,
    key: &str,
    initial_value: T,
    start: Option<StartStopNotifier<T>>,
) -> CoreResult<PersistentStore<T, WritableStore<T>>>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + 'static,
{
    persist_browser_session(registry, new_store(initial_value, start), key)
}

/// Creates a store persisted in a cookie.
///
/// # Errors
///
/// Returns an error if the stored value cannot be read.
pub fn cookie_writable<T>(
    registry: &StorageRegistry,
    key: &str,
    initial_value: T,
    start: Option<StartStopNotifier<T>>,
) -> CoreResult<PersistentStore<T, WritableStore<T>>>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + 'static,
{
    persist_cookie(registry, new_store(initial_value, start), key)
}
