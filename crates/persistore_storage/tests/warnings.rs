//! Missing-backend warnings. Runs in its own process so the process-wide
//! warning set starts empty.

use persistore_storage::memory::MemoryPlatform;
use persistore_storage::{
    create_cookie_storage, create_extension_storage, create_indexed_storage, create_local_storage,
    emitted_warnings, ExtensionArea, Platform, StorageInterface,
};

#[test]
fn each_missing_backend_warns_once() {
    let detached = Platform::detached();

    let first = create_cookie_storage(&detached);
    let second = create_cookie_storage(&detached);
    create_local_storage(&detached, true);
    create_indexed_storage(&detached);
    create_extension_storage(&detached, ExtensionArea::Sync, false);

    assert!(!first.is_available());
    assert!(!second.is_available());

    let warnings = emitted_warnings();
    let cookie_warnings: Vec<_> = warnings
        .iter()
        .filter(|message| message.contains("document.cookies"))
        .collect();
    assert_eq!(cookie_warnings.len(), 1);
    assert_eq!(
        cookie_warnings[0].as_str(),
        "Unable to find the document.cookies. No data will be persisted."
    );
    assert!(warnings.iter().any(|message| message.contains("window.localStorage")));
    assert!(warnings.iter().any(|message| message.contains("IndexedDB")));
    assert!(warnings.iter().any(|message| message.contains("ChromeStorage")));

    // The no-op fallback accepts everything and returns nothing.
    first.set_value("k", &"v".to_string()).unwrap();
    let value: Option<String> = first.get_value("k").unwrap();
    assert!(value.is_none());
}

#[test]
fn available_backends_do_not_warn() {
    let memory = MemoryPlatform::new();
    let storage = create_indexed_storage(&memory.platform());
    assert!(storage.is_available());
    assert!(!emitted_warnings()
        .iter()
        .any(|message| message.contains("window.sessionStorage")));
}
