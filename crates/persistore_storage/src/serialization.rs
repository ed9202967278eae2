//! Pluggable serialization port.
//!
//! Adapters never pick a text format themselves. Typed values are first
//! converted into a [`serde_json::Value`] and the process-wide
//! [`Serialization`] turns that value into the text that lands in the
//! backend (and back). The default is compact JSON.
//!
//! ```rust
//! use persistore_storage::{deserialize, serialize};
//!
//! let text = serialize(&vec![1, 2, 3]).unwrap();
//! assert_eq!(text, "[1,2,3]");
//! let back: Vec<u8> = deserialize(&text).unwrap();
//! assert_eq!(back, vec![1, 2, 3]);
//! ```

use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::{Arc, LazyLock};

/// Identifies a custom type registered with [`add_serializable_class`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassDefinition {
    /// Fully qualified type name.
    pub name: &'static str,
}

impl ClassDefinition {
    /// Returns the definition of `T`.
    #[must_use]
    pub fn of<T: ?Sized>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
        }
    }
}

/// Text encoding used by every adapter that stores text.
pub trait Serialization: Send + Sync {
    /// Encodes a value as text.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the value cannot be encoded.
    fn serialize(&self, value: &Value) -> StorageResult<String>;

    /// Decodes text produced by [`serialize`](Self::serialize).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Deserialization`] if the text is malformed.
    fn deserialize(&self, text: &str) -> StorageResult<Value>;

    /// Allows a custom type to round-trip through this serialization.
    fn add_serializable_class(&self, _class: &ClassDefinition) {}
}

/// The default serialization: compact JSON.
///
/// Types describe their own shape through `serde`, so class registration is
/// not needed and is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerialization;

impl Serialization for JsonSerialization {
    fn serialize(&self, value: &Value) -> StorageResult<String> {
        serde_json::to_string(value).map_err(|e| StorageError::serialization(e.to_string()))
    }

    fn deserialize(&self, text: &str) -> StorageResult<Value> {
        serde_json::from_str(text).map_err(|e| StorageError::deserialization(e.to_string()))
    }
}

/// Serializer function accepted by [`set_serialization`].
pub type SerializeFn = Box<dyn Fn(&Value) -> StorageResult<String> + Send + Sync>;
/// Deserializer function accepted by [`set_serialization`].
pub type DeserializeFn = Box<dyn Fn(&str) -> StorageResult<Value> + Send + Sync>;
/// Class registrar accepted by [`set_serialization`].
pub type ClassRegistrar = Box<dyn Fn(&ClassDefinition) + Send + Sync>;

/// A [`Serialization`] assembled from plain functions.
pub struct FnSerialization {
    serializer: SerializeFn,
    deserializer: DeserializeFn,
    class_registrar: Option<ClassRegistrar>,
}

impl FnSerialization {
    /// Builds a serialization from a serializer and its inverse.
    pub fn new<S, D>(serializer: S, deserializer: D) -> Self
    where
        S: Fn(&Value) -> StorageResult<String> + Send + Sync + 'static,
        D: Fn(&str) -> StorageResult<Value> + Send + Sync + 'static,
    {
        Self {
            serializer: Box::new(serializer),
            deserializer: Box::new(deserializer),
            class_registrar: None,
        }
    }

    /// Sets the function called by [`add_serializable_class`].
    #[must_use]
    pub fn with_class_registrar(mut self, registrar: ClassRegistrar) -> Self {
        self.class_registrar = Some(registrar);
        self
    }
}

impl std::fmt::Debug for FnSerialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSerialization")
            .field("class_registrar", &self.class_registrar.is_some())
            .finish_non_exhaustive()
    }
}

impl Serialization for FnSerialization {
    fn serialize(&self, value: &Value) -> StorageResult<String> {
        (self.serializer)(value)
    }

    fn deserialize(&self, text: &str) -> StorageResult<Value> {
        (self.deserializer)(text)
    }

    fn add_serializable_class(&self, class: &ClassDefinition) {
        if let Some(registrar) = &self.class_registrar {
            registrar(class);
        }
    }
}

static SERIALIZATION: LazyLock<RwLock<Arc<dyn Serialization>>> =
    LazyLock::new(|| RwLock::new(Arc::new(JsonSerialization)));

/// Returns the serialization currently in use.
pub fn serialization() -> Arc<dyn Serialization> {
    Arc::clone(&SERIALIZATION.read())
}

/// Replaces the process-wide serialization with plain functions.
///
/// When `class_registrar` is `None`, [`add_serializable_class`] becomes a
/// no-op.
pub fn set_serialization<S, D>(
    serializer: S,
    deserializer: D,
    class_registrar: Option<ClassRegistrar>,
) where
    S: Fn(&Value) -> StorageResult<String> + Send + Sync + 'static,
    D: Fn(&str) -> StorageResult<Value> + Send + Sync + 'static,
{
    let mut backend = FnSerialization::new(serializer, deserializer);
    backend.class_registrar = class_registrar;
    set_serialization_backend(Arc::new(backend));
}

/// Replaces the process-wide serialization.
pub fn set_serialization_backend(backend: Arc<dyn Serialization>) {
    *SERIALIZATION.write() = backend;
}

/// Restores the default JSON serialization.
pub fn reset_serialization() {
    set_serialization_backend(Arc::new(JsonSerialization));
}

/// Registers `T` with the current serialization.
pub fn add_serializable_class<T: ?Sized>() {
    serialization().add_serializable_class(&ClassDefinition::of::<T>());
}

/// Converts a typed value into the intermediate value model.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if `serde` rejects the value.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> StorageResult<Value> {
    serde_json::to_value(value).map_err(|e| StorageError::serialization(e.to_string()))
}

/// Converts an intermediate value back into a typed value.
///
/// # Errors
///
/// Returns [`StorageError::Deserialization`] if the value does not fit `T`.
pub fn from_value<T: DeserializeOwned>(value: Value) -> StorageResult<T> {
    serde_json::from_value(value).map_err(|e| StorageError::deserialization(e.to_string()))
}

/// Encodes a typed value with the current serialization.
///
/// # Errors
///
/// Returns an error if the value cannot be represented or encoded.
pub fn serialize<T: Serialize + ?Sized>(value: &T) -> StorageResult<String> {
    serialization().serialize(&to_value(value)?)
}

/// Decodes text with the current serialization into a typed value.
///
/// # Errors
///
/// Returns an error if the text is malformed or does not fit `T`.
pub fn deserialize<T: DeserializeOwned>(text: &str) -> StorageResult<T> {
    from_value(serialization().deserialize(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct NameHolder {
        name: String,
    }

    #[test]
    fn json_roundtrip_of_struct() {
        let holder = NameHolder {
            name: "John".into(),
        };
        let json = JsonSerialization;
        let text = json.serialize(&to_value(&holder).unwrap()).unwrap();
        assert_eq!(text, r#"{"name":"John"}"#);

        let back: NameHolder = from_value(json.deserialize(&text).unwrap()).unwrap();
        assert_eq!(back, holder);
    }

    #[test]
    fn null_is_a_real_value() {
        let json = JsonSerialization;
        assert_eq!(json.serialize(&Value::Null).unwrap(), "null");
        assert_eq!(json.deserialize("null").unwrap(), Value::Null);
    }

    #[test]
    fn malformed_text_fails() {
        let result = JsonSerialization.deserialize("{not json");
        assert!(matches!(result, Err(StorageError::Deserialization(_))));
    }

    #[test]
    fn wrong_shape_fails() {
        let result: StorageResult<NameHolder> = from_value(Value::from(42));
        assert!(matches!(result, Err(StorageError::Deserialization(_))));
    }

    #[test]
    fn fn_serialization_calls_registrar() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static REGISTERED: AtomicUsize = AtomicUsize::new(0);
        let backend = FnSerialization::new(
            |value: &Value| Ok(value.to_string()),
            |text: &str| serde_json::from_str(text).map_err(|e| StorageError::deserialization(e.to_string())),
        )
        .with_class_registrar(Box::new(|class: &ClassDefinition| {
            assert!(class.name.ends_with("NameHolder"));
            REGISTERED.fetch_add(1, Ordering::SeqCst);
        }));

        backend.add_serializable_class(&ClassDefinition::of::<NameHolder>());
        assert_eq!(REGISTERED.load(Ordering::SeqCst), 1);
        assert_eq!(backend.serialize(&Value::from("a")).unwrap(), "\"a\"");
    }
}
