//! Binding a store to a storage.

use crate::error::CoreResult;
use crate::store::{Subscriber, Unsubscriber, Writable};
use persistore_storage::{Listener, Storage, StorageInterface};
use std::rc::Rc;
use tracing::{debug, error};

/// A store whose value is kept in a storage.
///
/// Reads and writes go to the wrapped store; every change is written back
/// to the storage under [`key`](Self::key).
pub struct PersistentStore<T, W> {
    store: W,
    storage: Storage<T>,
    key: String,
    listener: Option<Listener<T>>,
    write_back: Option<Unsubscriber>,
}

/// Makes `store` persistent under `key`.
///
/// 1. A value already stored under `key` replaces the store's value.
/// 2. If the storage reports external changes, they are applied to the
///    store.
/// 3. The store's value, now and after each change, is written to the
///    storage.
///
/// The binding lives until [`PersistentStore::unbind`].
///
/// # Errors
///
/// Returns an error if the stored value cannot be read or decoded. Errors
/// while writing back later changes have no caller and are logged.
pub fn persist<T, W>(store: W, storage: impl Into<Storage<T>>, key: &str) -> CoreResult<PersistentStore<T, W>>
where
    T: 'static,
    W: Writable<T> + Clone + 'static,
{
    let storage = storage.into();

    if let Some(initial) = storage.get_value(key)? {
        store.set(initial);
    }

    let listener = storage.as_self_update().map(|self_updating| {
        let target = store.clone();
        let listener: Listener<T> = Rc::new(move |value: T| target.set(value));
        self_updating.add_listener(key, &listener);
        listener
    });

    let writer = storage.clone();
    let owned_key = key.to_string();
    let write_back = store.subscribe(Box::new(move |value: &T| {
        if let Err(err) = writer.set_value(&owned_key, value) {
            error!(key = %owned_key, error = %err, "failed to persist store value");
        }
    }) as Subscriber<T>);

    debug!(key, self_updating = listener.is_some(), "bound store to storage");
    Ok(PersistentStore {
        store,
        storage,
        key: key.to_string(),
        listener,
        write_back: Some(write_back),
    })
}

impl<T, W> PersistentStore<T, W> {
    /// Key the value is stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The storage the value is kept in.
    pub fn storage(&self) -> &Storage<T> {
        &self.storage
    }

    /// The wrapped store.
    pub fn store(&self) -> &W {
        &self.store
    }

    /// Deletes the stored value. The store keeps its current value.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage refuses the deletion.
    pub fn delete(&self) -> CoreResult<()> {
        self.storage.delete_value(&self.key)?;
        Ok(())
    }

    /// Stops following external changes and writing changes back, and
    /// returns the plain store.
    pub fn unbind(mut self) -> W {
        if let (Some(listener), Some(self_updating)) = (&self.listener, self.storage.as_self_update()) {
            self_updating.remove_listener(&self.key, listener);
        }
        if let Some(write_back) = self.write_back.take() {
            write_back.unsubscribe();
        }
        debug!(key = %self.key, "unbound store from storage");
        self.store
    }
}

impl<T, W: Writable<T>> Writable<T> for PersistentStore<T, W> {
    fn set(&self, value: T) {
        self.store.set(value);
    }

    fn get(&self) -> T {
        self.store.get()
    }

    fn subscribe(&self, subscriber: Subscriber<T>) -> Unsubscriber {
        self.store.subscribe(subscriber)
    }
}

impl<T, W: std::fmt::Debug> std::fmt::Debug for PersistentStore<T, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStore")
            .field("key", &self.key)
            .field("store", &self.store)
            .field("storage", &self.storage)
            .finish()
    }
}
