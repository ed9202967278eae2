//! IndexedDB object stores.
//!
//! Opening a database is asynchronous. Requests issued before the database
//! is open are queued and replayed in order once it is; IndexedDB then runs
//! them in that same order, so a read always sees the writes issued before
//! it. Each database holds the single object store it was opened for.

use crate::error::{js_to_storage, WasmError};
use persistore_storage::{AsyncKeyValueStore, Completion, IndexedDbFactory, StorageResult};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::{debug, error};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{IdbDatabase, IdbFactory, IdbObjectStore, IdbRequest, IdbTransactionMode};

const DATABASE_VERSION: u32 = 1;

/// `window.indexedDB`.
#[derive(Debug, Clone)]
pub struct BrowserIndexedDb {
    factory: IdbFactory,
}

impl BrowserIndexedDb {
    /// Wraps `factory`.
    pub fn new(factory: IdbFactory) -> Self {
        Self { factory }
    }
}

impl IndexedDbFactory for BrowserIndexedDb {
    fn open_store(&self, database_name: &str, store_name: &str) -> Rc<dyn AsyncKeyValueStore> {
        BrowserObjectStore::open(&self.factory, database_name, store_name)
    }
}

enum Request {
    Get(String, Completion<Option<String>>),
    Put(String, String),
    Delete(String),
}

enum State {
    Opening(VecDeque<Request>),
    Ready(IdbDatabase),
    Failed(String),
}

/// One object store, usable before its database finished opening.
pub struct BrowserObjectStore {
    store_name: String,
    state: RefCell<State>,
}

impl BrowserObjectStore {
    fn open(factory: &IdbFactory, database_name: &str, store_name: &str) -> Rc<Self> {
        let store = Rc::new(Self {
            store_name: store_name.to_string(),
            state: RefCell::new(State::Opening(VecDeque::new())),
        });

        let request = match factory.open_with_u32(database_name, DATABASE_VERSION) {
            Ok(request) => request,
            Err(err) => {
                store.fail(WasmError::from(err).to_string());
                return store;
            }
        };

        let upgrade_store_name = store_name.to_string();
        let upgrade_request = request.clone();
        let on_upgrade = Closure::once_into_js(move || {
            let created = upgrade_request
                .result()
                .and_then(|db| db.dyn_into::<IdbDatabase>())
                .and_then(|db| db.create_object_store(&upgrade_store_name));
            if let Err(err) = created {
                error!(error = ?err, "failed to create object store");
            }
        });
        request.set_onupgradeneeded(Some(on_upgrade.unchecked_ref()));

        let ready = Rc::clone(&store);
        let ready_request = request.clone();
        let on_success = Closure::once_into_js(move || {
            match ready_request.result().and_then(|db| db.dyn_into::<IdbDatabase>()) {
                Ok(db) => ready.ready(db),
                Err(err) => ready.fail(WasmError::from(err).to_string()),
            }
        });
        request.set_onsuccess(Some(on_success.unchecked_ref()));

        let failed = Rc::clone(&store);
        let failed_request = request.clone();
        let on_error = Closure::once_into_js(move || {
            let message = failed_request
                .error()
                .ok()
                .flatten()
                .map(|exception| exception.message())
                .unwrap_or_else(|| "failed to open database".to_string());
            failed.fail(message);
        });
        request.set_onerror(Some(on_error.unchecked_ref()));

        store
    }

    fn ready(&self, db: IdbDatabase) {
        debug!(store = %self.store_name, "IndexedDB opened");
        let previous = std::mem::replace(&mut *self.state.borrow_mut(), State::Ready(db));
        if let State::Opening(pending) = previous {
            for request in pending {
                self.run(request);
            }
        }
    }

    fn fail(&self, message: String) {
        error!(store = %self.store_name, error = %message, "IndexedDB unavailable");
        let previous = std::mem::replace(&mut *self.state.borrow_mut(), State::Failed(message.clone()));
        if let State::Opening(pending) = previous {
            for request in pending {
                if let Request::Get(_, done) = request {
                    done(Err(WasmError::IndexedDb(message.clone()).into()));
                }
            }
        }
    }

    fn object_store(&self, db: &IdbDatabase, mode: IdbTransactionMode) -> Result<IdbObjectStore, JsValue> {
        db.transaction_with_str_and_mode(&self.store_name, mode)?
            .object_store(&self.store_name)
    }

    fn submit(&self, request: Request) -> StorageResult<()> {
        let failure = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Opening(pending) => {
                    pending.push_back(request);
                    return Ok(());
                }
                State::Failed(message) => Some(message.clone()),
                State::Ready(_) => None,
            }
        };

        match (failure, request) {
            (None, request) => {
                self.run(request);
                Ok(())
            }
            (Some(message), Request::Get(_, done)) => {
                done(Err(WasmError::IndexedDb(message).into()));
                Ok(())
            }
            (Some(message), _) => Err(WasmError::IndexedDb(message).into()),
        }
    }

    fn run(&self, request: Request) {
        let db = match &*self.state.borrow() {
            State::Ready(db) => db.clone(),
            _ => return,
        };
        match request {
            Request::Get(key, done) => self.run_get(&db, &key, done),
            Request::Put(key, value) => {
                let result = self
                    .object_store(&db, IdbTransactionMode::Readwrite)
                    .and_then(|store| store.put_with_key(&JsValue::from_str(&value), &JsValue::from_str(&key)));
                if let Err(err) = result {
                    error!(key = %key, error = ?err, "IndexedDB put failed");
                }
            }
            Request::Delete(key) => {
                let result = self
                    .object_store(&db, IdbTransactionMode::Readwrite)
                    .and_then(|store| store.delete(&JsValue::from_str(&key)));
                if let Err(err) = result {
                    error!(key = %key, error = ?err, "IndexedDB delete failed");
                }
            }
        }
    }

    fn run_get(&self, db: &IdbDatabase, key: &str, done: Completion<Option<String>>) {
        let request: IdbRequest = match self
            .object_store(db, IdbTransactionMode::Readonly)
            .and_then(|store| store.get(&JsValue::from_str(key)))
        {
            Ok(request) => request,
            Err(err) => {
                done(Err(js_to_storage(err)));
                return;
            }
        };

        // Only one of the two handlers ever runs; they share the completion.
        let done = Rc::new(RefCell::new(Some(done)));
        let success_done = Rc::clone(&done);
        let success_request = request.clone();
        let on_success = Closure::once_into_js(move || {
            if let Some(done) = success_done.borrow_mut().take() {
                done(success_request.result().map(|value| value.as_string()).map_err(js_to_storage));
            }
        });
        let error_request = request.clone();
        let on_error = Closure::once_into_js(move || {
            if let Some(done) = done.borrow_mut().take() {
                let message = error_request
                    .error()
                    .ok()
                    .flatten()
                    .map(|exception| exception.message())
                    .unwrap_or_else(|| "read failed".to_string());
                done(Err(WasmError::IndexedDb(message).into()));
            }
        });
        request.set_onsuccess(Some(on_success.unchecked_ref()));
        request.set_onerror(Some(on_error.unchecked_ref()));
    }
}

impl std::fmt::Debug for BrowserObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.borrow() {
            State::Opening(pending) => format!("opening ({} pending)", pending.len()),
            State::Ready(_) => "ready".to_string(),
            State::Failed(message) => format!("failed: {message}"),
        };
        f.debug_struct("BrowserObjectStore")
            .field("store_name", &self.store_name)
            .field("state", &state)
            .finish()
    }
}

impl AsyncKeyValueStore for BrowserObjectStore {
    fn get(&self, key: &str, done: Completion<Option<String>>) {
        // Errors for reads go through `done`.
        let _ = self.submit(Request::Get(key.to_string(), done));
    }

    fn set(&self, key: &str, value: String) -> StorageResult<()> {
        self.submit(Request::Put(key.to_string(), value))
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.submit(Request::Delete(key.to_string()))
    }
}
