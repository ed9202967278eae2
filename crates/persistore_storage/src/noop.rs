//! Storage that stores nothing.

use crate::error::StorageResult;
use crate::interface::{Listener, SelfUpdateStorageInterface, Storage, StorageInterface};
use std::rc::Rc;

/// Storage implementation that does nothing.
///
/// `get_value` always returns `None`; writes, deletes and listener
/// registrations are dropped. This is what every factory hands out when its
/// backend does not exist in the current execution context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoopStorage;

/// Creates a storage that does nothing.
#[must_use]
pub fn create_noop_storage() -> NoopStorage {
    NoopStorage
}

impl<T> StorageInterface<T> for NoopStorage {
    fn get_value(&self, _key: &str) -> StorageResult<Option<T>> {
        Ok(None)
    }

    fn set_value(&self, _key: &str, _value: &T) -> StorageResult<()> {
        Ok(())
    }

    fn delete_value(&self, _key: &str) -> StorageResult<()> {
        Ok(())
    }
}

impl<T> SelfUpdateStorageInterface<T> for NoopStorage {
    fn add_listener(&self, _key: &str, _listener: &Listener<T>) {}

    fn remove_listener(&self, _key: &str, _listener: &Listener<T>) {}
}

impl<T> From<Rc<NoopStorage>> for Storage<T> {
    fn from(storage: Rc<NoopStorage>) -> Self {
        Storage::SelfUpdating(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_is_always_none() {
        let storage = create_noop_storage();
        storage.set_value("k", &"v".to_string()).unwrap();
        let value: Option<String> = storage.get_value("k").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn delete_of_missing_key_succeeds() {
        let storage = create_noop_storage();
        assert!(StorageInterface::<u8>::delete_value(&storage, "missing").is_ok());
    }

    #[test]
    fn listeners_are_never_called() {
        let storage = create_noop_storage();
        let listener: Listener<u8> = Rc::new(|_: u8| panic!("noop storage must stay silent"));
        storage.add_listener("k", &listener);
        storage.set_value("k", &1).unwrap();
        storage.remove_listener("k", &listener);
    }
}
