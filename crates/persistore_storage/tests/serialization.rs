//! Swapping the process-wide serialization. Runs in its own process.

use persistore_storage::memory::MemoryPlatform;
use persistore_storage::{
    add_serializable_class, create_local_storage, ClassDefinition, reset_serialization, set_serialization, StorageError,
    StorageInterface,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Point {
    x: i32,
    y: i32,
}

#[test]
fn custom_serialization_is_used_by_text_adapters() {
    let registered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&registered);
    set_serialization(
        |value: &Value| Ok(format!("custom:{value}")),
        |text: &str| {
            let json = text
                .strip_prefix("custom:")
                .ok_or_else(|| StorageError::deserialization("missing prefix"))?;
            serde_json::from_str(json).map_err(|e| StorageError::deserialization(e.to_string()))
        },
        Some(Box::new(move |_: &ClassDefinition| {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
    );
    add_serializable_class::<Point>();
    assert_eq!(registered.load(Ordering::SeqCst), 1);

    let memory = MemoryPlatform::new();
    let storage = create_local_storage(&memory.platform(), false);
    storage.set_value("p", &Point { x: 1, y: 2 }).unwrap();
    assert_eq!(
        memory.local_storage().item("p").as_deref(),
        Some(r#"custom:{"x":1,"y":2}"#)
    );
    let back: Option<Point> = storage.get_value("p").unwrap();
    assert_eq!(back, Some(Point { x: 1, y: 2 }));

    reset_serialization();
    storage.set_value("p", &Point { x: 3, y: 4 }).unwrap();
    assert_eq!(
        memory.local_storage().item("p").as_deref(),
        Some(r#"{"x":3,"y":4}"#)
    );
}
