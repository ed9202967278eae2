//! In-memory platform.
//!
//! Implements every platform primitive without a browser, for native
//! processes and tests. Asynchronous completions and change events are
//! queued on a shared [`EventQueue`] and only run from
//! [`MemoryPlatform::run_until_idle`], which mimics the browser event loop:
//! nothing is delivered re-entrantly from inside the call that caused it.
//!
//! Each storage also offers `external_*` methods that change data the way
//! another tab or extension page would, so change events can be exercised.

use crate::error::StorageResult;
use crate::extension::ExtensionArea;
use crate::platform::{
    AsyncKeyValueStore, Completion, DocumentCookies, ExtensionChangeHandler, ExtensionStorageApi,
    IndexedDbFactory, Platform, StorageChange, StorageEvent, StorageEventHandler, SubscriptionId,
    WebStorageArea,
};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

type Task = Box<dyn FnOnce()>;

/// A FIFO of pending callbacks.
#[derive(Clone, Default)]
pub struct EventQueue {
    tasks: Rc<RefCell<VecDeque<Task>>>,
}

impl EventQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `task`.
    pub fn push(&self, task: impl FnOnce() + 'static) {
        self.tasks.borrow_mut().push_back(Box::new(task));
    }

    /// Number of tasks waiting.
    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Runs tasks, including ones scheduled meanwhile, until none is left.
    ///
    /// Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.tasks.borrow_mut().pop_front();
            let Some(task) = next else {
                return ran;
            };
            task();
            ran += 1;
        }
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue").field("pending", &self.pending()).finish()
    }
}

/// Subscriptions keyed by id; dispatch works on a snapshot so handlers may
/// unsubscribe while being called.
struct Subscribers<H> {
    handlers: RefCell<BTreeMap<u64, H>>,
    next_id: Cell<u64>,
}

impl<H: Clone> Subscribers<H> {
    fn new() -> Self {
        Self {
            handlers: RefCell::new(BTreeMap::new()),
            next_id: Cell::new(1),
        }
    }

    fn insert(&self, handler: H) -> SubscriptionId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.handlers.borrow_mut().insert(id, handler);
        SubscriptionId(id)
    }

    fn remove(&self, id: SubscriptionId) {
        self.handlers.borrow_mut().remove(&id.0);
    }

    fn snapshot(&self) -> Vec<H> {
        self.handlers.borrow().values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.handlers.borrow().len()
    }
}

/// `document.cookie` kept in memory.
///
/// Assignments are parsed the way a browser does: the first `name=value`
/// pair sets the cookie, an expiring `max-age=0` removes it, other attributes
/// are recorded but not enforced.
#[derive(Debug, Default)]
pub struct MemoryCookies {
    jar: RefCell<BTreeMap<String, String>>,
    assignments: RefCell<Vec<String>>,
}

impl MemoryCookies {
    /// Creates an empty cookie jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent assignment written to the jar.
    pub fn last_assignment(&self) -> Option<String> {
        self.assignments.borrow().last().cloned()
    }

    /// Every assignment written so far, oldest first.
    pub fn assignments(&self) -> Vec<String> {
        self.assignments.borrow().clone()
    }
}

impl DocumentCookies for MemoryCookies {
    fn cookie_string(&self) -> StorageResult<String> {
        let jar = self.jar.borrow();
        let pairs: Vec<String> = jar.iter().map(|(name, value)| format!("{name}={value}")).collect();
        Ok(pairs.join("; "))
    }

    fn write_cookie(&self, assignment: &str) -> StorageResult<()> {
        self.assignments.borrow_mut().push(assignment.to_string());

        let mut parts = assignment.split(';').map(str::trim);
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return Ok(());
        };
        let expired = parts.any(|attribute| attribute.eq_ignore_ascii_case("max-age=0"));

        let mut jar = self.jar.borrow_mut();
        if expired {
            jar.remove(name);
        } else {
            jar.insert(name.to_string(), value.to_string());
        }
        Ok(())
    }
}

/// A `localStorage` / `sessionStorage` area kept in memory.
pub struct MemoryWebStorage {
    items: RefCell<BTreeMap<String, String>>,
    subscribers: Rc<Subscribers<StorageEventHandler>>,
    queue: EventQueue,
}

impl MemoryWebStorage {
    /// Creates an empty area whose events go to `queue`.
    pub fn new(queue: EventQueue) -> Self {
        Self {
            items: RefCell::new(BTreeMap::new()),
            subscribers: Rc::new(Subscribers::new()),
            queue,
        }
    }

    /// Raw value stored under `key`.
    pub fn item(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }

    /// Every stored key, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.items.borrow().keys().cloned().collect()
    }

    /// Number of attached `storage` event subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Changes `key` as another tab would, queueing a `storage` event.
    /// `None` removes the key.
    pub fn external_set(&self, key: &str, value: Option<&str>) {
        let old_value = {
            let mut items = self.items.borrow_mut();
            match value {
                Some(value) => items.insert(key.to_string(), value.to_string()),
                None => items.remove(key),
            }
        };
        let event = StorageEvent {
            key: Some(key.to_string()),
            old_value,
            new_value: value.map(str::to_string),
        };
        self.dispatch(event);
    }

    /// Clears the area as another tab would.
    pub fn external_clear(&self) {
        self.items.borrow_mut().clear();
        self.dispatch(StorageEvent {
            key: None,
            old_value: None,
            new_value: None,
        });
    }

    fn dispatch(&self, event: StorageEvent) {
        let subscribers = Rc::clone(&self.subscribers);
        self.queue.push(move || {
            for handler in subscribers.snapshot() {
                handler(&event);
            }
        });
    }
}

impl std::fmt::Debug for MemoryWebStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWebStorage")
            .field("items", &self.items.borrow().len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl WebStorageArea for MemoryWebStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.item(key))
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        self.items.borrow_mut().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }

    fn subscribe(&self, handler: StorageEventHandler) -> SubscriptionId {
        self.subscribers.insert(handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.remove(id);
    }
}

/// One object store kept in memory.
pub struct MemoryKeyValueStore {
    items: Rc<RefCell<BTreeMap<String, String>>>,
    queue: EventQueue,
}

impl MemoryKeyValueStore {
    fn new(queue: EventQueue) -> Self {
        Self {
            items: Rc::new(RefCell::new(BTreeMap::new())),
            queue,
        }
    }

    /// Raw value stored under `key`.
    pub fn item(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }

    /// Writes `key` as another tab would. IndexedDB has no change events, so
    /// nothing is notified.
    pub fn external_put(&self, key: &str, value: &str) {
        self.items.borrow_mut().insert(key.to_string(), value.to_string());
    }
}

impl std::fmt::Debug for MemoryKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeyValueStore")
            .field("items", &self.items.borrow().len())
            .finish()
    }
}

impl AsyncKeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str, done: Completion<Option<String>>) {
        // Requests are ordered: the read sees every write issued before it.
        let value = self.item(key);
        self.queue.push(move || done(Ok(value)));
    }

    fn set(&self, key: &str, value: String) -> StorageResult<()> {
        self.items.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

/// IndexedDB kept in memory. Stores are created on first open.
#[derive(Debug)]
pub struct MemoryIndexedDb {
    stores: RefCell<BTreeMap<(String, String), Rc<MemoryKeyValueStore>>>,
    queue: EventQueue,
}

impl MemoryIndexedDb {
    /// Creates an empty database set whose completions go to `queue`.
    pub fn new(queue: EventQueue) -> Self {
        Self {
            stores: RefCell::new(BTreeMap::new()),
            queue,
        }
    }

    /// Returns (creating it if needed) `store_name` inside `database_name`.
    pub fn store(&self, database_name: &str, store_name: &str) -> Rc<MemoryKeyValueStore> {
        let key = (database_name.to_string(), store_name.to_string());
        Rc::clone(
            self.stores
                .borrow_mut()
                .entry(key)
                .or_insert_with(|| Rc::new(MemoryKeyValueStore::new(self.queue.clone()))),
        )
    }
}

impl IndexedDbFactory for MemoryIndexedDb {
    fn open_store(&self, database_name: &str, store_name: &str) -> Rc<dyn AsyncKeyValueStore> {
        self.store(database_name, store_name)
    }
}

/// Extension storage kept in memory.
///
/// Like `chrome.storage`, every effective change (including this context's
/// own writes) fires `onChanged`; writing an identical value does not.
pub struct MemoryExtensionStorage {
    areas: RefCell<HashMap<ExtensionArea, BTreeMap<String, Value>>>,
    subscribers: Rc<Subscribers<ExtensionChangeHandler>>,
    queue: EventQueue,
}

impl MemoryExtensionStorage {
    /// Creates empty areas whose events go to `queue`.
    pub fn new(queue: EventQueue) -> Self {
        Self {
            areas: RefCell::new(HashMap::new()),
            subscribers: Rc::new(Subscribers::new()),
            queue,
        }
    }

    /// Value stored under `key` in `area`.
    pub fn item(&self, area: ExtensionArea, key: &str) -> Option<Value> {
        self.areas.borrow().get(&area).and_then(|items| items.get(key).cloned())
    }

    /// Number of attached `onChanged` listeners.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Changes `key` as another extension page would. `None` removes it.
    pub fn external_set(&self, area: ExtensionArea, key: &str, value: Option<Value>) {
        self.apply(area, key, value);
    }

    fn apply(&self, area: ExtensionArea, key: &str, new_value: Option<Value>) {
        let old_value = {
            let mut areas = self.areas.borrow_mut();
            let items = areas.entry(area).or_default();
            if items.get(key) == new_value.as_ref() {
                return;
            }
            match &new_value {
                Some(value) => items.insert(key.to_string(), value.clone()),
                None => items.remove(key),
            }
        };

        let mut changes = BTreeMap::new();
        changes.insert(key.to_string(), StorageChange { old_value, new_value });
        let subscribers = Rc::clone(&self.subscribers);
        self.queue.push(move || {
            for handler in subscribers.snapshot() {
                handler(&changes, area.as_str());
            }
        });
    }
}

impl std::fmt::Debug for MemoryExtensionStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryExtensionStorage")
            .field("areas", &self.areas.borrow().len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl ExtensionStorageApi for MemoryExtensionStorage {
    fn get(&self, area: ExtensionArea, key: &str, done: Completion<Option<Value>>) {
        let value = self.item(area, key);
        self.queue.push(move || done(Ok(value)));
    }

    fn set(&self, area: ExtensionArea, key: &str, value: Value) -> StorageResult<()> {
        self.apply(area, key, Some(value));
        Ok(())
    }

    fn remove(&self, area: ExtensionArea, key: &str) -> StorageResult<()> {
        self.apply(area, key, None);
        Ok(())
    }

    fn add_change_listener(&self, handler: ExtensionChangeHandler) -> SubscriptionId {
        self.subscribers.insert(handler)
    }

    fn remove_change_listener(&self, id: SubscriptionId) {
        self.subscribers.remove(id);
    }
}

/// Every storage, in memory, sharing one event queue.
///
/// ```rust
/// use persistore_storage::memory::MemoryPlatform;
/// use persistore_storage::{create_local_storage, StorageInterface};
///
/// let memory = MemoryPlatform::new();
/// let storage = create_local_storage(&memory.platform(), false);
/// storage.set_value("greeting", &"hi".to_string()).unwrap();
/// assert_eq!(memory.local_storage().item("greeting").as_deref(), Some("\"hi\""));
/// ```
#[derive(Debug)]
pub struct MemoryPlatform {
    queue: EventQueue,
    cookies: Rc<MemoryCookies>,
    local_storage: Rc<MemoryWebStorage>,
    session_storage: Rc<MemoryWebStorage>,
    indexed_db: Rc<MemoryIndexedDb>,
    extension_storage: Rc<MemoryExtensionStorage>,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPlatform {
    /// Creates empty storages.
    #[must_use]
    pub fn new() -> Self {
        let queue = EventQueue::new();
        Self {
            cookies: Rc::new(MemoryCookies::new()),
            local_storage: Rc::new(MemoryWebStorage::new(queue.clone())),
            session_storage: Rc::new(MemoryWebStorage::new(queue.clone())),
            indexed_db: Rc::new(MemoryIndexedDb::new(queue.clone())),
            extension_storage: Rc::new(MemoryExtensionStorage::new(queue.clone())),
            queue,
        }
    }

    /// A [`Platform`] handing out these storages.
    pub fn platform(&self) -> Platform {
        Platform::detached()
            .with_cookies(self.cookies.clone())
            .with_local_storage(self.local_storage.clone())
            .with_session_storage(self.session_storage.clone())
            .with_indexed_db(self.indexed_db.clone())
            .with_extension_storage(self.extension_storage.clone())
    }

    /// The cookie jar.
    pub fn cookies(&self) -> Rc<MemoryCookies> {
        Rc::clone(&self.cookies)
    }

    /// The `localStorage` area.
    pub fn local_storage(&self) -> Rc<MemoryWebStorage> {
        Rc::clone(&self.local_storage)
    }

    /// The `sessionStorage` area.
    pub fn session_storage(&self) -> Rc<MemoryWebStorage> {
        Rc::clone(&self.session_storage)
    }

    /// IndexedDB.
    pub fn indexed_db(&self) -> Rc<MemoryIndexedDb> {
        Rc::clone(&self.indexed_db)
    }

    /// Extension storage.
    pub fn extension_storage(&self) -> Rc<MemoryExtensionStorage> {
        Rc::clone(&self.extension_storage)
    }

    /// The shared event queue.
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Delivers every pending completion and change event.
    pub fn run_until_idle(&self) -> usize {
        self.queue.run_until_idle()
    }
}
