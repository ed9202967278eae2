//! Browser extension storage (`chrome.storage`).
//!
//! Values are stored structurally, without the global text serialization.
//! Reads are asynchronous: `get_value` returns `Ok(None)` and the stored
//! value is delivered to the key's listeners once the read completes.
//! With `listen_external_changes`, one `onChanged` subscription is attached
//! while at least one listener is registered; changes from other areas are
//! ignored.
//!
//! `onChanged` also reports this adapter's own writes, possibly after later
//! writes were already issued. Those echoes are recognised and dropped so a
//! bound store never replays its own stale values.

use crate::error::StorageResult;
use crate::interface::{Adapter, Listener, SelfUpdateStorageInterface, Storage, StorageInterface};
use crate::listener::{ListenerHooks, ListenerRegistry};
use crate::noop::NoopStorage;
use crate::platform::{ExtensionStorageApi, Platform, StorageChange, SubscriptionId};
use crate::serialization::to_value;
use crate::warnings::warn_storage_not_found;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::{Rc, Weak};
use tracing::{debug, error};

/// Extension storage area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExtensionArea {
    /// `chrome.storage.local`.
    #[default]
    Local,
    /// `chrome.storage.session`.
    Session,
    /// `chrome.storage.sync`.
    Sync,
}

impl ExtensionArea {
    /// Area name, as reported by `onChanged`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Session => "session",
            Self::Sync => "sync",
        }
    }
}

/// Own writes to one key whose change event has not arrived yet.
#[derive(Debug, Default)]
struct PendingWrites {
    /// Oldest first, tagged with the operation number that issued them.
    writes: VecDeque<(u64, Option<Value>)>,
    /// What the key holds once every issued write has landed, when known.
    expected: Option<Option<Value>>,
}

struct Shared {
    api: Rc<dyn ExtensionStorageApi>,
    area: ExtensionArea,
    listen_external_changes: bool,
    listeners: ListenerRegistry<Value>,
    subscription: Cell<Option<SubscriptionId>>,
    pending: RefCell<HashMap<String, PendingWrites>>,
    next_op: Cell<u64>,
}

impl Shared {
    fn connect(self: &Rc<Self>) {
        if !self.listen_external_changes {
            return;
        }
        let weak = Rc::downgrade(self);
        let id = self.api.add_change_listener(Rc::new(
            move |changes: &BTreeMap<String, StorageChange>, area_name: &str| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_changed(changes, area_name);
                }
            },
        ));
        self.subscription.set(Some(id));
        debug!(area = self.area.as_str(), "attached extension change listener");
    }

    fn disconnect(&self) {
        if let Some(id) = self.subscription.take() {
            self.api.remove_change_listener(id);
            self.pending.borrow_mut().clear();
            debug!(area = self.area.as_str(), "detached extension change listener");
        }
    }

    fn on_changed(&self, changes: &BTreeMap<String, StorageChange>, area_name: &str) {
        if area_name != self.area.as_str() {
            return;
        }
        for (key, change) in changes {
            if self.take_echo(key, &change.new_value) {
                continue;
            }
            self.listeners.call_listeners(key, change.new_value.clone());
        }
    }

    fn next_op(&self) -> u64 {
        let op = self.next_op.get();
        self.next_op.set(op + 1);
        op
    }

    /// Remembers a write so its change event can be told apart from
    /// external ones. Only tracked while subscribed to `onChanged`.
    fn record_write(&self, key: &str, value: Option<Value>) {
        let op = self.next_op();
        if self.subscription.get().is_none() {
            return;
        }
        let mut pending = self.pending.borrow_mut();
        let entry = pending.entry(key.to_string()).or_default();
        // Storing what the key already holds raises no event.
        if entry.expected.as_ref() == Some(&value) {
            return;
        }
        entry.writes.push_back((op, value.clone()));
        entry.expected = Some(value);
    }

    /// Returns true if `new_value` is the event of one of our own writes.
    ///
    /// Events arrive in write order, so writes queued before the matched
    /// one changed nothing and are dropped with it.
    fn take_echo(&self, key: &str, new_value: &Option<Value>) -> bool {
        let mut pending = self.pending.borrow_mut();
        let entry = pending.entry(key.to_string()).or_default();
        match entry.writes.iter().position(|(_, written)| written == new_value) {
            Some(position) => {
                entry.writes.drain(..=position);
                true
            }
            None => {
                if entry.writes.is_empty() {
                    entry.expected = Some(new_value.clone());
                }
                false
            }
        }
    }

    /// A read issued as operation `op` saw `value`. Writes issued right
    /// after it that stored the same value changed nothing.
    fn settle_read(&self, key: &str, op: u64, value: &Option<Value>) {
        if self.subscription.get().is_none() {
            return;
        }
        let mut pending = self.pending.borrow_mut();
        let entry = pending.entry(key.to_string()).or_default();
        while entry
            .writes
            .front()
            .is_some_and(|(write_op, written)| *write_op > op && written == value)
        {
            entry.writes.pop_front();
        }
        if entry.writes.is_empty() {
            entry.expected = Some(value.clone());
        }
    }
}

/// Storage implementation that uses browser extension storage.
#[derive(Clone)]
pub struct ExtensionStorage {
    shared: Rc<Shared>,
}

impl ExtensionStorage {
    /// Creates an adapter over `area` of `api`.
    pub fn new(api: Rc<dyn ExtensionStorageApi>, area: ExtensionArea, listen_external_changes: bool) -> Self {
        let shared = Rc::new_cyclic(|weak: &Weak<Shared>| {
            let on_first = weak.clone();
            let on_emptied = weak.clone();
            let hooks = ListenerHooks::new()
                .on_first(move || {
                    if let Some(shared) = on_first.upgrade() {
                        shared.connect();
                    }
                })
                .on_emptied(move || {
                    if let Some(shared) = on_emptied.upgrade() {
                        shared.disconnect();
                    }
                });
            Shared {
                api,
                area,
                listen_external_changes,
                listeners: ListenerRegistry::with_hooks(hooks),
                subscription: Cell::new(None),
                pending: RefCell::new(HashMap::new()),
                next_op: Cell::new(0),
            }
        });
        Self { shared }
    }

    /// Which area this adapter uses.
    pub fn area(&self) -> ExtensionArea {
        self.shared.area
    }

    /// Whether external changes are followed.
    pub fn listens_external_changes(&self) -> bool {
        self.shared.listen_external_changes
    }

    /// Schedules a read of `key`; the result goes to the listeners.
    pub fn request(&self, key: &str) {
        let weak = Rc::downgrade(&self.shared);
        let owned_key = key.to_string();
        let op = self.shared.next_op();
        self.shared.api.get(
            self.shared.area,
            key,
            Box::new(move |result| {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                match result {
                    Ok(value) => {
                        shared.settle_read(&owned_key, op, &value);
                        shared.listeners.call_listeners(&owned_key, value);
                    }
                    Err(err) => error!(key = %owned_key, error = %err, "extension storage read failed"),
                }
            }),
        );
    }
}

impl std::fmt::Debug for ExtensionStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionStorage")
            .field("area", &self.shared.area)
            .field("listen_external_changes", &self.shared.listen_external_changes)
            .field("listeners", &self.shared.listeners.len())
            .finish()
    }
}

impl<T: Serialize + DeserializeOwned> StorageInterface<T> for ExtensionStorage {
    fn get_value(&self, key: &str) -> StorageResult<Option<T>> {
        self.request(key);
        Ok(None)
    }

    fn set_value(&self, key: &str, value: &T) -> StorageResult<()> {
        let value = to_value(value)?;
        self.shared.api.set(self.shared.area, key, value.clone())?;
        self.shared.record_write(key, Some(value));
        Ok(())
    }

    fn delete_value(&self, key: &str) -> StorageResult<()> {
        self.shared.api.remove(self.shared.area, key)?;
        self.shared.record_write(key, None);
        Ok(())
    }
}

impl<T: Serialize + DeserializeOwned + 'static> SelfUpdateStorageInterface<T> for ExtensionStorage {
    fn add_listener(&self, key: &str, listener: &Listener<T>) {
        self.shared.listeners.add_typed(key, listener);
    }

    fn remove_listener(&self, key: &str, listener: &Listener<T>) {
        self.shared.listeners.remove_typed(key, listener);
    }
}

impl<T: Serialize + DeserializeOwned + 'static> From<Rc<Adapter<ExtensionStorage>>> for Storage<T> {
    fn from(storage: Rc<Adapter<ExtensionStorage>>) -> Self {
        Storage::SelfUpdating(storage)
    }
}

/// Storage implementation that uses the browser extension storage.
///
/// With `listen_external_changes`, stores follow changes made from other
/// extension pages.
pub fn create_extension_storage(
    platform: &Platform,
    area: ExtensionArea,
    listen_external_changes: bool,
) -> Adapter<ExtensionStorage> {
    match platform.extension_storage() {
        Some(api) => Adapter::Available(ExtensionStorage::new(api, area, listen_external_changes)),
        None => {
            warn_storage_not_found("ChromeStorage", platform);
            Adapter::Unavailable(NoopStorage)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPlatform;
    use serde::Deserialize;
    use serde_json::json;
    use std::cell::RefCell;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Prefs {
        theme: String,
        zoom: u8,
    }

    fn recorder<T: 'static>() -> (Listener<T>, Rc<RefCell<Vec<T>>>) {
        let seen = Rc::new(RefCell::new(Vec::<T>::new()));
        let sink = Rc::clone(&seen);
        (Rc::new(move |v: T| sink.borrow_mut().push(v)), seen)
    }

    #[test]
    fn values_are_stored_structurally() {
        let memory = MemoryPlatform::new();
        let storage = create_extension_storage(&memory.platform(), ExtensionArea::Local, false);
        let prefs = Prefs { theme: "dark".into(), zoom: 2 };

        storage.set_value("prefs", &prefs).unwrap();

        assert_eq!(
            memory.extension_storage().item(ExtensionArea::Local, "prefs"),
            Some(json!({ "theme": "dark", "zoom": 2 }))
        );
    }

    #[test]
    fn read_is_delivered_through_listener() {
        let memory = MemoryPlatform::new();
        let storage = create_extension_storage(&memory.platform(), ExtensionArea::Sync, false);
        let (listener, seen) = recorder::<Prefs>();
        storage.add_listener("prefs", &listener);
        let prefs = Prefs { theme: "light".into(), zoom: 1 };
        storage.set_value("prefs", &prefs).unwrap();

        let immediate: Option<Prefs> = storage.get_value("prefs").unwrap();
        assert!(immediate.is_none());
        memory.run_until_idle();

        assert_eq!(*seen.borrow(), vec![prefs]);
    }

    #[test]
    fn changes_in_other_areas_are_ignored() {
        let memory = MemoryPlatform::new();
        let storage = create_extension_storage(&memory.platform(), ExtensionArea::Local, true);
        let (listener, seen) = recorder::<String>();
        storage.add_listener("k", &listener);

        memory
            .extension_storage()
            .external_set(ExtensionArea::Session, "k", Some(json!("other")));
        memory
            .extension_storage()
            .external_set(ExtensionArea::Local, "k", Some(json!("mine")));
        memory.run_until_idle();

        assert_eq!(*seen.borrow(), vec!["mine".to_string()]);
    }

    #[test]
    fn removal_is_not_propagated() {
        let memory = MemoryPlatform::new();
        let storage = create_extension_storage(&memory.platform(), ExtensionArea::Local, true);
        let (listener, seen) = recorder::<String>();
        storage.add_listener("k", &listener);

        memory
            .extension_storage()
            .external_set(ExtensionArea::Local, "k", Some(json!("v")));
        memory.extension_storage().external_set(ExtensionArea::Local, "k", None);
        memory.run_until_idle();

        assert_eq!(*seen.borrow(), vec!["v".to_string()]);
    }

    #[test]
    fn own_writes_are_not_reported_back() {
        let memory = MemoryPlatform::new();
        let storage = create_extension_storage(&memory.platform(), ExtensionArea::Local, true);
        let (listener, seen) = recorder::<u32>();
        storage.add_listener("k", &listener);

        storage.set_value("k", &1_u32).unwrap();
        storage.set_value("k", &2_u32).unwrap();
        memory.run_until_idle();
        assert!(seen.borrow().is_empty());

        memory
            .extension_storage()
            .external_set(ExtensionArea::Local, "k", Some(json!(3)));
        memory.run_until_idle();
        assert_eq!(*seen.borrow(), vec![3]);
    }

    #[test]
    fn unchanged_write_does_not_hide_later_external_change() {
        let memory = MemoryPlatform::new();
        memory
            .extension_storage()
            .external_set(ExtensionArea::Local, "k", Some(json!("dark")));
        memory.run_until_idle();

        let storage = create_extension_storage(&memory.platform(), ExtensionArea::Local, true);
        let (listener, seen) = recorder::<String>();
        let _: Option<String> = storage.get_value("k").unwrap();
        storage.add_listener("k", &listener);
        // Same value as stored: no change event will come for it.
        storage.set_value("k", &"dark".to_string()).unwrap();
        memory.run_until_idle();

        memory
            .extension_storage()
            .external_set(ExtensionArea::Local, "k", Some(json!("light")));
        memory
            .extension_storage()
            .external_set(ExtensionArea::Local, "k", Some(json!("dark")));
        memory.run_until_idle();

        assert_eq!(
            *seen.borrow(),
            vec!["dark".to_string(), "light".to_string(), "dark".to_string()]
        );
    }

    #[test]
    fn change_listener_follows_listener_count() {
        let memory = MemoryPlatform::new();
        let storage = create_extension_storage(&memory.platform(), ExtensionArea::Local, true);
        let (listener, _) = recorder::<String>();

        storage.add_listener("k", &listener);
        assert_eq!(memory.extension_storage().subscriber_count(), 1);
        storage.remove_listener("k", &listener);
        assert_eq!(memory.extension_storage().subscriber_count(), 0);
    }

    #[test]
    fn missing_api_falls_back_to_noop() {
        let adapter = create_extension_storage(&Platform::detached(), ExtensionArea::Local, true);
        assert!(!adapter.is_available());
    }
}
