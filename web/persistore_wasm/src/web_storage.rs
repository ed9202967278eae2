//! `window.localStorage` and `window.sessionStorage`.
//!
//! One `storage` event listener is attached to the window while at least
//! one subscription exists. Events for the other area are filtered out by
//! comparing `event.storageArea`.

use crate::error::js_to_storage;
use persistore_storage::{StorageEvent, StorageEventHandler, StorageResult, SubscriptionId, WebStorageArea};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, error};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Storage, Window};

type Handlers = Rc<RefCell<BTreeMap<u64, StorageEventHandler>>>;

/// A web storage area of the current window.
pub struct BrowserStorageArea {
    window: Window,
    storage: Storage,
    handlers: Handlers,
    next_id: Cell<u64>,
    listener: RefCell<Option<Closure<dyn FnMut(web_sys::StorageEvent)>>>,
}

impl BrowserStorageArea {
    /// Wraps `storage`, one of `window`'s areas.
    pub fn new(window: Window, storage: Storage) -> Self {
        Self {
            window,
            storage,
            handlers: Rc::new(RefCell::new(BTreeMap::new())),
            next_id: Cell::new(1),
            listener: RefCell::new(None),
        }
    }

    fn attach(&self) {
        let handlers = Rc::clone(&self.handlers);
        let own_area: JsValue = self.storage.clone().into();
        let closure = Closure::<dyn FnMut(web_sys::StorageEvent)>::new(move |event: web_sys::StorageEvent| {
            let same_area = event
                .storage_area()
                .is_some_and(|area| JsValue::from(area) == own_area);
            if !same_area {
                return;
            }
            let change = StorageEvent {
                key: event.key(),
                old_value: event.old_value(),
                new_value: event.new_value(),
            };
            let snapshot: Vec<StorageEventHandler> = handlers.borrow().values().cloned().collect();
            for handler in snapshot {
                handler(&change);
            }
        });

        if let Err(err) = self
            .window
            .add_event_listener_with_callback("storage", closure.as_ref().unchecked_ref())
        {
            error!(error = ?err, "failed to attach storage event listener");
            return;
        }
        debug!("attached window storage listener");
        *self.listener.borrow_mut() = Some(closure);
    }

    fn detach(&self) {
        if let Some(closure) = self.listener.borrow_mut().take() {
            if let Err(err) = self
                .window
                .remove_event_listener_with_callback("storage", closure.as_ref().unchecked_ref())
            {
                error!(error = ?err, "failed to detach storage event listener");
            }
            debug!("detached window storage listener");
        }
    }
}

impl std::fmt::Debug for BrowserStorageArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserStorageArea")
            .field("subscribers", &self.handlers.borrow().len())
            .finish_non_exhaustive()
    }
}

impl WebStorageArea for BrowserStorageArea {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        self.storage.get_item(key).map_err(js_to_storage)
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        self.storage.set_item(key, value).map_err(js_to_storage)
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.storage.remove_item(key).map_err(js_to_storage)
    }

    fn subscribe(&self, handler: StorageEventHandler) -> SubscriptionId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let first = {
            let mut handlers = self.handlers.borrow_mut();
            handlers.insert(id, handler);
            handlers.len() == 1
        };
        if first {
            self.attach();
        }
        SubscriptionId(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let emptied = {
            let mut handlers = self.handlers.borrow_mut();
            handlers.remove(&id.0).is_some() && handlers.is_empty()
        };
        if emptied {
            self.detach();
        }
    }
}

impl Drop for BrowserStorageArea {
    fn drop(&mut self) {
        self.detach();
    }
}
