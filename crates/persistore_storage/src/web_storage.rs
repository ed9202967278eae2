//! `localStorage` / `sessionStorage` storage.
//!
//! Reads and writes are synchronous. With `listen_external_changes`, the
//! adapter attaches one platform `storage` event subscription while at
//! least one listener is registered. The platform only reports changes made
//! by *other* execution contexts (other tabs or windows), so this context's
//! own writes never come back as notifications.

use crate::error::StorageResult;
use crate::interface::{Adapter, Listener, SelfUpdateStorageInterface, Storage, StorageInterface};
use crate::listener::{ListenerHooks, ListenerRegistry};
use crate::noop::NoopStorage;
use crate::platform::{Platform, StorageEvent, SubscriptionId, WebStorageArea};
use crate::serialization::{deserialize, serialization, serialize};
use crate::warnings::warn_storage_not_found;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::cell::Cell;
use std::rc::{Rc, Weak};
use tracing::{debug, error};

/// Which web storage area an adapter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebStorageKind {
    /// `window.localStorage`.
    Local,
    /// `window.sessionStorage`.
    Session,
}

impl WebStorageKind {
    /// Name of the browser global.
    pub fn name(self) -> &'static str {
        match self {
            Self::Local => "window.localStorage",
            Self::Session => "window.sessionStorage",
        }
    }
}

struct Shared {
    area: Rc<dyn WebStorageArea>,
    kind: WebStorageKind,
    listen_external_changes: bool,
    listeners: ListenerRegistry<Value>,
    subscription: Cell<Option<SubscriptionId>>,
}

impl Shared {
    fn connect(self: &Rc<Self>) {
        if !self.listen_external_changes {
            return;
        }
        let weak = Rc::downgrade(self);
        let id = self.area.subscribe(Rc::new(move |event: &StorageEvent| {
            if let Some(shared) = weak.upgrade() {
                shared.on_storage_event(event);
            }
        }));
        self.subscription.set(Some(id));
        debug!(area = self.kind.name(), "attached storage event subscription");
    }

    fn disconnect(&self) {
        if let Some(id) = self.subscription.take() {
            self.area.unsubscribe(id);
            debug!(area = self.kind.name(), "detached storage event subscription");
        }
    }

    fn on_storage_event(&self, event: &StorageEvent) {
        let Some(key) = &event.key else {
            return;
        };
        let new_value = match &event.new_value {
            Some(text) => match serialization().deserialize(text) {
                Ok(value) => Some(value),
                Err(err) => {
                    error!(area = self.kind.name(), key = %key, error = %err, "undecodable external change");
                    return;
                }
            },
            None => None,
        };
        self.listeners.call_listeners(key, new_value);
    }
}

/// Storage implementation that uses a browser web storage area.
#[derive(Clone)]
pub struct WebStorage {
    shared: Rc<Shared>,
}

impl WebStorage {
    /// Creates an adapter over `area`.
    pub fn new(area: Rc<dyn WebStorageArea>, kind: WebStorageKind, listen_external_changes: bool) -> Self {
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
                area,
                kind,
                listen_external_changes,
                listeners: ListenerRegistry::with_hooks(hooks),
                subscription: Cell::new(None),
            }
        });
        Self { shared }
    }

    /// Which area this adapter uses.
    pub fn kind(&self) -> WebStorageKind {
        self.shared.kind
    }

    /// Whether external changes are followed.
    pub fn listens_external_changes(&self) -> bool {
        self.shared.listen_external_changes
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.len()
    }
}

impl std::fmt::Debug for WebStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebStorage")
            .field("kind", &self.shared.kind)
            .field("listen_external_changes", &self.shared.listen_external_changes)
            .field("listeners", &self.shared.listeners.len())
            .finish()
    }
}

impl<T: Serialize + DeserializeOwned> StorageInterface<T> for WebStorage {
    fn get_value(&self, key: &str) -> StorageResult<Option<T>> {
        match self.shared.area.get_item(key)? {
            Some(text) => deserialize(&text).map(Some),
            None => Ok(None),
        }
    }

    fn set_value(&self, key: &str, value: &T) -> StorageResult<()> {
        self.shared.area.set_item(key, &serialize(value)?)
    }

    fn delete_value(&self, key: &str) -> StorageResult<()> {
        self.shared.area.remove_item(key)
    }
}

impl<T: Serialize + DeserializeOwned + 'static> SelfUpdateStorageInterface<T> for WebStorage {
    fn add_listener(&self, key: &str, listener: &Listener<T>) {
        self.shared.listeners.add_typed(key, listener);
    }

    fn remove_listener(&self, key: &str, listener: &Listener<T>) {
        self.shared.listeners.remove_typed(key, listener);
    }
}

impl<T: Serialize + DeserializeOwned + 'static> From<Rc<Adapter<WebStorage>>> for Storage<T> {
    fn from(storage: Rc<Adapter<WebStorage>>) -> Self {
        Storage::SelfUpdating(storage)
    }
}

fn create_web_storage(
    platform: &Platform,
    kind: WebStorageKind,
    listen_external_changes: bool,
) -> Adapter<WebStorage> {
    let area = match kind {
        WebStorageKind::Local => platform.local_storage(),
        WebStorageKind::Session => platform.session_storage(),
    };
    match area {
        Some(area) => Adapter::Available(WebStorage::new(area, kind, listen_external_changes)),
        None => {
            warn_storage_not_found(kind.name(), platform);
            Adapter::Unavailable(NoopStorage)
        }
    }
}

/// Storage implementation that uses the browser local storage.
///
/// With `listen_external_changes`, stores follow changes made from other
/// pages.
pub fn create_local_storage(platform: &Platform, listen_external_changes: bool) -> Adapter<WebStorage> {
    create_web_storage(platform, WebStorageKind::Local, listen_external_changes)
}

/// Storage implementation that uses the browser session storage.
///
/// With `listen_external_changes`, stores follow changes made from other
/// pages.
pub fn create_session_storage(platform: &Platform, listen_external_changes: bool) -> Adapter<WebStorage> {
    create_web_storage(platform, WebStorageKind::Session, listen_external_changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPlatform;
    use std::cell::RefCell;

    fn recorder() -> (Listener<String>, Rc<RefCell<Vec<String>>>) {
        let seen = Rc::new(RefCell::new(Vec::<String>::new()));
        let sink = Rc::clone(&seen);
        (Rc::new(move |v: String| sink.borrow_mut().push(v)), seen)
    }

    #[test]
    fn set_get_delete() {
        let memory = MemoryPlatform::new();
        let storage = create_local_storage(&memory.platform(), false);

        storage.set_value("k", &vec![1, 2, 3]).unwrap();
        let value: Option<Vec<i32>> = storage.get_value("k").unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));
        assert_eq!(memory.local_storage().item("k").as_deref(), Some("[1,2,3]"));

        StorageInterface::<Vec<i32>>::delete_value(&storage, "k").unwrap();
        let value: Option<Vec<i32>> = storage.get_value("k").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn local_and_session_are_separate() {
        let memory = MemoryPlatform::new();
        let local = create_local_storage(&memory.platform(), false);
        let session = create_session_storage(&memory.platform(), false);

        local.set_value("k", &"local".to_string()).unwrap();
        let value: Option<String> = session.get_value("k").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn external_change_reaches_only_its_key() {
        let memory = MemoryPlatform::new();
        let storage = create_local_storage(&memory.platform(), true);
        let (k_listener, k_seen) = recorder();
        let (j_listener, j_seen) = recorder();
        storage.add_listener("k", &k_listener);
        storage.add_listener("j", &j_listener);

        memory.local_storage().external_set("k", Some("\"C\""));
        memory.run_until_idle();

        assert_eq!(*k_seen.borrow(), vec!["C".to_string()]);
        assert!(j_seen.borrow().is_empty());
    }

    #[test]
    fn own_writes_are_not_reported() {
        let memory = MemoryPlatform::new();
        let storage = create_local_storage(&memory.platform(), true);
        let (listener, seen) = recorder();
        storage.add_listener("k", &listener);

        storage.set_value("k", &"mine".to_string()).unwrap();
        memory.run_until_idle();

        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn external_removal_is_not_propagated() {
        let memory = MemoryPlatform::new();
        let storage = create_local_storage(&memory.platform(), true);
        let (listener, seen) = recorder();
        storage.add_listener("k", &listener);

        memory.local_storage().external_set("k", None);
        memory.run_until_idle();

        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn subscription_follows_listener_count() {
        let memory = MemoryPlatform::new();
        let storage = create_local_storage(&memory.platform(), true);
        let (first, _) = recorder();
        let (second, _) = recorder();
        assert_eq!(memory.local_storage().subscriber_count(), 0);

        storage.add_listener("a", &first);
        storage.add_listener("b", &second);
        assert_eq!(memory.local_storage().subscriber_count(), 1);

        storage.remove_listener("a", &first);
        assert_eq!(memory.local_storage().subscriber_count(), 1);
        storage.remove_listener("b", &second);
        assert_eq!(memory.local_storage().subscriber_count(), 0);
    }

    #[test]
    fn no_subscription_without_listen_flag() {
        let memory = MemoryPlatform::new();
        let storage = create_session_storage(&memory.platform(), false);
        let (listener, seen) = recorder();
        storage.add_listener("k", &listener);

        memory.session_storage().external_set("k", Some("\"x\""));
        memory.run_until_idle();

        assert_eq!(memory.session_storage().subscriber_count(), 0);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn missing_area_falls_back_to_noop() {
        let adapter = create_session_storage(&Platform::detached(), true);
        assert!(!adapter.is_available());
        adapter.set_value("k", &1).unwrap();
        let value: Option<i32> = adapter.get_value("k").unwrap();
        assert!(value.is_none());
    }
}
