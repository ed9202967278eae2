//! Browser tests, run with `wasm-pack test --headless --firefox`.

#![cfg(target_arch = "wasm32")]

use js_sys::Function;
use persistore_core::{local_writable, StorageRegistry, Writable};
use persistore_storage::{
    create_cookie_storage, create_extension_storage, create_local_storage, create_session_storage, ExtensionArea,
    Listener, Platform, SelfUpdateStorageInterface, StorageInterface,
};
use persistore_wasm::{BrowserExtensionStorage, BrowserPlatform};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn detects_page_storages() {
    let platform = BrowserPlatform::detect();
    assert!(platform.cookies().is_some());
    assert!(platform.local_storage().is_some());
    assert!(platform.session_storage().is_some());
    assert!(platform.indexed_db().is_some());
    assert!(platform.extension_storage().is_none());
}

#[wasm_bindgen_test]
fn local_storage_round_trip() {
    let storage = create_local_storage(&BrowserPlatform::detect(), false);
    assert!(storage.is_available());

    storage.set_value("wasm-local", &vec![1_u32, 2, 3]).unwrap();
    let read: Option<Vec<u32>> = storage.get_value("wasm-local").unwrap();
    assert_eq!(read, Some(vec![1, 2, 3]));

    StorageInterface::<Vec<u32>>::delete_value(&storage, "wasm-local").unwrap();
    let read: Option<Vec<u32>> = storage.get_value("wasm-local").unwrap();
    assert_eq!(read, None);
}

#[wasm_bindgen_test]
fn session_storage_is_separate_from_local() {
    let platform = BrowserPlatform::detect();
    let local = create_local_storage(&platform, false);
    let session = create_session_storage(&platform, false);

    session.set_value("wasm-area", &"session".to_string()).unwrap();
    let from_local: Option<String> = local.get_value("wasm-area").unwrap();
    let from_session: Option<String> = session.get_value("wasm-area").unwrap();
    assert_eq!(from_local, None);
    assert_eq!(from_session.as_deref(), Some("session"));

    StorageInterface::<String>::delete_value(&session, "wasm-area").unwrap();
}

#[wasm_bindgen_test]
fn cookie_round_trip() {
    let cookies = create_cookie_storage(&BrowserPlatform::detect());
    cookies.set_value("wasm-cookie", &"a b;c".to_string()).unwrap();
    let read: Option<String> = cookies.get_value("wasm-cookie").unwrap();
    assert_eq!(read.as_deref(), Some("a b;c"));

    StorageInterface::<String>::delete_value(&cookies, "wasm-cookie").unwrap();
    let read: Option<String> = cookies.get_value("wasm-cookie").unwrap();
    assert_eq!(read, None);
}

#[wasm_bindgen_test]
fn persisted_store_writes_through() {
    let registry = StorageRegistry::new(BrowserPlatform::detect());
    let store = local_writable(&registry, "wasm-counter", 1_u32, None).unwrap();
    store.update(|count| count + 1);

    let stored: Option<u32> = registry.local().get_value("wasm-counter").unwrap();
    assert_eq!(stored, Some(2));
    store.delete().unwrap();
}

/// A `chrome.storage` stand-in with the callback-only API of Manifest V2:
/// methods return `undefined` and answer through their last argument.
fn callback_chrome_storage() -> JsValue {
    let make = Function::new_no_args(
        r#"
        const items = {};
        const area = {
            get(keys, callback) {
                const found = {};
                for (const key of keys) {
                    if (key in items) found[key] = items[key];
                }
                callback(found);
            },
            set(values, callback) {
                Object.assign(items, values);
                callback();
            },
            remove(key, callback) {
                delete items[key];
                callback();
            },
        };
        return { local: area, onChanged: { addListener() {}, removeListener() {} } };
        "#,
    );
    make.call0(&JsValue::NULL).unwrap()
}

#[wasm_bindgen_test]
fn extension_storage_works_with_callback_api() {
    let api = BrowserExtensionStorage::new(callback_chrome_storage());
    let platform = Platform::detached().with_extension_storage(Rc::new(api));
    let storage = create_extension_storage(&platform, ExtensionArea::Local, false);

    let seen = Rc::new(RefCell::new(Vec::<String>::new()));
    let sink = Rc::clone(&seen);
    let listener: Listener<String> = Rc::new(move |value: String| sink.borrow_mut().push(value));
    storage.add_listener("wasm-ext", &listener);

    storage.set_value("wasm-ext", &"stored".to_string()).unwrap();
    let immediate: Option<String> = storage.get_value("wasm-ext").unwrap();
    assert_eq!(immediate, None);
    assert_eq!(*seen.borrow(), vec!["stored".to_string()]);

    StorageInterface::<String>::delete_value(&storage, "wasm-ext").unwrap();
    let _: Option<String> = storage.get_value("wasm-ext").unwrap();
    assert_eq!(seen.borrow().len(), 1);
}
