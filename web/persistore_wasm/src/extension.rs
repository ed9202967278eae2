//! `chrome.storage`.
//!
//! The API is reached through `js_sys::Reflect` since web-sys has no
//! bindings for it. Values cross the boundary with `serde-wasm-bindgen`, as
//! plain JSON-compatible objects. Requests pass a completion callback, which
//! both the callback (Manifest V2) and promise (Manifest V3) APIs accept.

use crate::error::{js_to_storage, WasmError, WasmResult};
use js_sys::{Array, Function, Object, Reflect};
use persistore_storage::{
    Completion, ExtensionArea, ExtensionChangeHandler, ExtensionStorageApi, StorageChange, StorageResult,
    SubscriptionId,
};
use serde::Serialize;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::error;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

type ChangeClosure = Closure<dyn FnMut(JsValue, JsValue)>;

/// The `chrome.storage` namespace.
pub struct BrowserExtensionStorage {
    storage: JsValue,
    listeners: RefCell<BTreeMap<u64, ChangeClosure>>,
    next_id: Cell<u64>,
}

impl BrowserExtensionStorage {
    /// Wraps the `chrome.storage` object.
    pub fn new(storage: JsValue) -> Self {
        Self {
            storage,
            listeners: RefCell::new(BTreeMap::new()),
            next_id: Cell::new(1),
        }
    }

    /// Looks up `chrome.storage` on the global object.
    pub fn detect() -> Option<Self> {
        let chrome = Reflect::get(&js_sys::global(), &JsValue::from_str("chrome")).ok()?;
        if !chrome.is_object() {
            return None;
        }
        let storage = Reflect::get(&chrome, &JsValue::from_str("storage")).ok()?;
        storage.is_object().then(|| Self::new(storage))
    }

    fn area(&self, area: ExtensionArea) -> WasmResult<JsValue> {
        let value = Reflect::get(&self.storage, &JsValue::from_str(area.as_str()))?;
        if value.is_object() {
            Ok(value)
        } else {
            Err(WasmError::NotSupported(format!("chrome.storage.{}", area.as_str())))
        }
    }

    fn call(target: &JsValue, method: &str, argument: &JsValue) -> WasmResult<JsValue> {
        let function: Function = Reflect::get(target, &JsValue::from_str(method))?.dyn_into()?;
        Ok(function.call1(target, argument)?)
    }

    fn call_with_callback(target: &JsValue, method: &str, argument: &JsValue, callback: &JsValue) -> WasmResult<()> {
        let function: Function = Reflect::get(target, &JsValue::from_str(method))?.dyn_into()?;
        function.call2(target, argument, callback)?;
        Ok(())
    }

    fn call_area(&self, area: ExtensionArea, method: &'static str, argument: &JsValue) -> WasmResult<()> {
        let callback = Closure::once_into_js(move || {
            if let Some(message) = last_error() {
                error!(method, error = %message, "chrome.storage request failed");
            }
        });
        Self::call_with_callback(&self.area(area)?, method, argument, &callback)
    }

    fn on_changed(&self) -> WasmResult<JsValue> {
        Ok(Reflect::get(&self.storage, &JsValue::from_str("onChanged"))?)
    }
}

impl std::fmt::Debug for BrowserExtensionStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserExtensionStorage")
            .field("listeners", &self.listeners.borrow().len())
            .finish_non_exhaustive()
    }
}

/// `chrome.runtime.lastError`, set while a failed request's callback runs.
fn last_error() -> Option<String> {
    let chrome = Reflect::get(&js_sys::global(), &JsValue::from_str("chrome")).ok()?;
    let runtime = Reflect::get(&chrome, &JsValue::from_str("runtime")).ok()?;
    let error = Reflect::get(&runtime, &JsValue::from_str("lastError")).ok()?;
    if error.is_undefined() || error.is_null() {
        return None;
    }
    let message = Reflect::get(&error, &JsValue::from_str("message"))
        .ok()
        .and_then(|message| message.as_string());
    Some(message.unwrap_or_else(|| format!("{:?}", error)))
}

fn to_js(value: &Value) -> WasmResult<JsValue> {
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    Ok(value.serialize(&serializer)?)
}

fn from_js(value: JsValue) -> WasmResult<Option<Value>> {
    if value.is_undefined() {
        return Ok(None);
    }
    Ok(Some(serde_wasm_bindgen::from_value(value)?))
}

fn read_changes(changes: &JsValue) -> BTreeMap<String, StorageChange> {
    let mut parsed = BTreeMap::new();
    let Some(changes) = changes.dyn_ref::<Object>() else {
        return parsed;
    };
    for key in Object::keys(changes).iter() {
        let Some(name) = key.as_string() else {
            continue;
        };
        let Ok(change) = Reflect::get(changes, &key) else {
            continue;
        };
        let field = |field: &str| {
            Reflect::get(&change, &JsValue::from_str(field))
                .map_err(WasmError::from)
                .and_then(from_js)
        };
        match (field("oldValue"), field("newValue")) {
            (Ok(old_value), Ok(new_value)) => {
                parsed.insert(name, StorageChange { old_value, new_value });
            }
            (Err(err), _) | (_, Err(err)) => error!(key = %name, error = %err, "unreadable storage change"),
        }
    }
    parsed
}

impl ExtensionStorageApi for BrowserExtensionStorage {
    fn get(&self, area: ExtensionArea, key: &str, done: Completion<Option<Value>>) {
        let done = Rc::new(RefCell::new(Some(done)));
        let callback_done = Rc::clone(&done);
        let name = key.to_string();
        let callback = Closure::once_into_js(move |items: JsValue| {
            let Some(done) = callback_done.borrow_mut().take() else {
                return;
            };
            let result = match last_error() {
                Some(message) => Err(WasmError::JsError(message)),
                None => Reflect::get(&items, &JsValue::from_str(&name))
                    .map_err(WasmError::from)
                    .and_then(from_js),
            };
            done(result.map_err(Into::into));
        });

        let keys = Array::of1(&JsValue::from_str(key));
        let requested = self
            .area(area)
            .and_then(|target| Self::call_with_callback(&target, "get", &keys, &callback));
        if let Err(err) = requested {
            if let Some(done) = done.borrow_mut().take() {
                done(Err(err.into()));
            }
        }
    }

    fn set(&self, area: ExtensionArea, key: &str, value: Value) -> StorageResult<()> {
        let items = Object::new();
        Reflect::set(&items, &JsValue::from_str(key), &to_js(&value)?).map_err(js_to_storage)?;
        Ok(self.call_area(area, "set", &items)?)
    }

    fn remove(&self, area: ExtensionArea, key: &str) -> StorageResult<()> {
        Ok(self.call_area(area, "remove", &JsValue::from_str(key))?)
    }

    fn add_change_listener(&self, handler: ExtensionChangeHandler) -> SubscriptionId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let closure = ChangeClosure::new(move |changes: JsValue, area_name: JsValue| {
            let area_name = area_name.as_string().unwrap_or_default();
            handler(&read_changes(&changes), &area_name);
        });
        let attached = self
            .on_changed()
            .and_then(|on_changed| Self::call(&on_changed, "addListener", closure.as_ref()));
        if let Err(err) = attached {
            error!(error = %err, "failed to attach chrome.storage.onChanged listener");
        }
        self.listeners.borrow_mut().insert(id, closure);
        SubscriptionId(id)
    }

    fn remove_change_listener(&self, id: SubscriptionId) {
        let Some(closure) = self.listeners.borrow_mut().remove(&id.0) else {
            return;
        };
        let detached = self
            .on_changed()
            .and_then(|on_changed| Self::call(&on_changed, "removeListener", closure.as_ref()));
        if let Err(err) = detached {
            error!(error = %err, "failed to detach chrome.storage.onChanged listener");
        }
    }
}
