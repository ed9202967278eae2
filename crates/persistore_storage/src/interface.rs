//! The storage contract.

use crate::error::StorageResult;
use crate::noop::NoopStorage;
use std::rc::Rc;

/// Callback told about the new value of a key changed outside of the
/// current binding.
pub type Listener<T> = Rc<dyn Fn(T)>;

/// A keyed storage of values of type `T`.
///
/// # Invariants
///
/// - `get_value` is synchronous and returns `None` when the key is absent
/// - a backend that can only answer asynchronously returns `Ok(None)` and
///   delivers the stored value later through
///   [`SelfUpdateStorageInterface`] listeners (two-channel read)
/// - `delete_value` on a missing key succeeds
///
/// # Implementors
///
/// - [`crate::CookieStorage`], [`crate::WebStorage`] - synchronous backends
/// - [`crate::IndexedStorage`], [`crate::ExtensionStorage`] - asynchronous backends
/// - [`crate::EncryptionStorage`] - encrypting wrapper
/// - [`NoopStorage`] - stores nothing
pub trait StorageInterface<T> {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored text cannot be decoded, decrypted, or
    /// the platform refuses the read.
    fn get_value(&self, key: &str) -> StorageResult<Option<T>>;

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded or the platform
    /// refuses the write.
    fn set_value(&self, key: &str, value: &T) -> StorageResult<()>;

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses the removal.
    fn delete_value(&self, key: &str) -> StorageResult<()>;
}

/// A storage that can tell listeners about values changed outside of this
/// process's own writes.
///
/// Listeners are only called for observed changes; a change whose new value
/// is unknown or absent is never reported.
pub trait SelfUpdateStorageInterface<T>: StorageInterface<T> {
    /// Calls `listener` whenever the value under `key` changes externally.
    fn add_listener(&self, key: &str, listener: &Listener<T>);

    /// Removes the first registration of the same `listener` for `key`.
    ///
    /// The listener is matched by key and callback identity. Removing a
    /// listener that was never added does nothing.
    fn remove_listener(&self, key: &str, listener: &Listener<T>);
}

impl<T, S: StorageInterface<T> + ?Sized> StorageInterface<T> for Rc<S> {
    fn get_value(&self, key: &str) -> StorageResult<Option<T>> {
        (**self).get_value(key)
    }

    fn set_value(&self, key: &str, value: &T) -> StorageResult<()> {
        (**self).set_value(key, value)
    }

    fn delete_value(&self, key: &str) -> StorageResult<()> {
        (**self).delete_value(key)
    }
}

/// A storage together with the capabilities it offers.
///
/// This is what a binding accepts: matching on the variant tells it whether
/// external changes can be followed.
pub enum Storage<T> {
    /// Read, write and delete only.
    Plain(Rc<dyn StorageInterface<T>>),
    /// Also reports external changes.
    SelfUpdating(Rc<dyn SelfUpdateStorageInterface<T>>),
}

impl<T> Storage<T> {
    /// Wraps a storage that cannot report external changes.
    pub fn plain<S: StorageInterface<T> + 'static>(storage: Rc<S>) -> Self {
        Self::Plain(storage)
    }

    /// Wraps a storage that reports external changes.
    pub fn self_updating<S: SelfUpdateStorageInterface<T> + 'static>(storage: Rc<S>) -> Self {
        Self::SelfUpdating(storage)
    }

    /// Whether external changes can be listened to.
    pub fn is_self_updating(&self) -> bool {
        matches!(self, Self::SelfUpdating(_))
    }

    /// Returns the listener side of the storage, if any.
    pub fn as_self_update(&self) -> Option<&Rc<dyn SelfUpdateStorageInterface<T>>> {
        match self {
            Self::Plain(_) => None,
            Self::SelfUpdating(storage) => Some(storage),
        }
    }

    fn as_interface(&self) -> &dyn StorageInterface<T> {
        match self {
            Self::Plain(storage) => storage.as_ref(),
            Self::SelfUpdating(storage) => storage.as_ref(),
        }
    }
}

impl<T> StorageInterface<T> for Storage<T> {
    fn get_value(&self, key: &str) -> StorageResult<Option<T>> {
        self.as_interface().get_value(key)
    }

    fn set_value(&self, key: &str, value: &T) -> StorageResult<()> {
        self.as_interface().set_value(key, value)
    }

    fn delete_value(&self, key: &str) -> StorageResult<()> {
        self.as_interface().delete_value(key)
    }
}

impl<T> Clone for Storage<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Plain(storage) => Self::Plain(Rc::clone(storage)),
            Self::SelfUpdating(storage) => Self::SelfUpdating(Rc::clone(storage)),
        }
    }
}

impl<T> std::fmt::Debug for Storage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Storage::Plain"),
            Self::SelfUpdating(_) => f.write_str("Storage::SelfUpdating"),
        }
    }
}

/// The result of an adapter factory: the real backend, or the no-op
/// adapter when the backend does not exist in this execution context.
#[derive(Debug)]
pub enum Adapter<A> {
    /// The backend exists.
    Available(A),
    /// The backend is missing; nothing is persisted.
    Unavailable(NoopStorage),
}

impl<A> Adapter<A> {
    /// Whether the real backend is in use.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Returns the real backend, if any.
    pub fn backend(&self) -> Option<&A> {
        match self {
            Self::Available(backend) => Some(backend),
            Self::Unavailable(_) => None,
        }
    }
}

impl<T, A: StorageInterface<T>> StorageInterface<T> for Adapter<A> {
    fn get_value(&self, key: &str) -> StorageResult<Option<T>> {
        match self {
            Self::Available(backend) => backend.get_value(key),
            Self::Unavailable(noop) => StorageInterface::<T>::get_value(noop, key),
        }
    }

    fn set_value(&self, key: &str, value: &T) -> StorageResult<()> {
        match self {
            Self::Available(backend) => backend.set_value(key, value),
            Self::Unavailable(noop) => noop.set_value(key, value),
        }
    }

    fn delete_value(&self, key: &str) -> StorageResult<()> {
        match self {
            Self::Available(backend) => backend.delete_value(key),
            Self::Unavailable(noop) => StorageInterface::<T>::delete_value(noop, key),
        }
    }
}

impl<T, A: SelfUpdateStorageInterface<T>> SelfUpdateStorageInterface<T> for Adapter<A> {
    fn add_listener(&self, key: &str, listener: &Listener<T>) {
        match self {
            Self::Available(backend) => backend.add_listener(key, listener),
            Self::Unavailable(noop) => noop.add_listener(key, listener),
        }
    }

    fn remove_listener(&self, key: &str, listener: &Listener<T>) {
        match self {
            Self::Available(backend) => backend.remove_listener(key, listener),
            Self::Unavailable(noop) => noop.remove_listener(key, listener),
        }
    }
}
