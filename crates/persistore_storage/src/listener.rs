//! Listener bookkeeping shared by the self-updating adapters.
//!
//! A [`ListenerRegistry`] tracks `(key, callback)` pairs for one adapter,
//! fans backend notifications out by key, and runs lifecycle hooks when the
//! total number of listeners goes from 0 to 1 ([`ListenerHooks::on_first`])
//! and from 1 to 0 ([`ListenerHooks::on_emptied`]). Adapters use the hooks to
//! attach their platform change subscription only while somebody listens.

use crate::interface::Listener;
use crate::serialization::from_value;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::error;

/// A lifecycle hook.
pub type Hook = Box<dyn Fn()>;

/// Hooks run on listener count transitions.
#[derive(Default)]
pub struct ListenerHooks {
    on_first: Option<Hook>,
    on_emptied: Option<Hook>,
}

impl ListenerHooks {
    /// No hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `hook` every time the listener count goes from 0 to 1.
    #[must_use]
    pub fn on_first(mut self, hook: impl Fn() + 'static) -> Self {
        self.on_first = Some(Box::new(hook));
        self
    }

    /// Runs `hook` every time the listener count goes from 1 to 0.
    #[must_use]
    pub fn on_emptied(mut self, hook: impl Fn() + 'static) -> Self {
        self.on_emptied = Some(Box::new(hook));
        self
    }
}

/// Identity of a registered callback: the address of its shared allocation.
///
/// Two clones of the same `Rc` have the same identity; two separately built
/// closures never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerIdentity(*const ());

impl ListenerIdentity {
    /// Identity of `listener`.
    pub fn of<F: ?Sized>(listener: &Rc<F>) -> Self {
        Self(Rc::as_ptr(listener).cast::<()>())
    }
}

struct Entry<V> {
    key: String,
    identity: ListenerIdentity,
    callback: Rc<dyn Fn(V)>,
}

/// Per-adapter registry of key listeners.
pub struct ListenerRegistry<V> {
    entries: RefCell<Vec<Entry<V>>>,
    hooks: ListenerHooks,
}

impl<V: Clone> ListenerRegistry<V> {
    /// Creates an empty registry without hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::with_hooks(ListenerHooks::new())
    }

    /// Creates an empty registry with lifecycle hooks.
    #[must_use]
    pub fn with_hooks(hooks: ListenerHooks) -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            hooks,
        }
    }

    /// Registers `callback` for `key` under `identity`.
    pub fn add_listener(&self, key: &str, identity: ListenerIdentity, callback: Rc<dyn Fn(V)>) {
        let count = {
            let mut entries = self.entries.borrow_mut();
            entries.push(Entry {
                key: key.to_string(),
                identity,
                callback,
            });
            entries.len()
        };

        if count == 1 {
            if let Some(hook) = &self.hooks.on_first {
                hook();
            }
        }
    }

    /// Removes the first entry matching both `key` and `identity`.
    ///
    /// Returns whether an entry was removed. Hooks only run when a removal
    /// leaves the registry empty.
    pub fn remove_listener(&self, key: &str, identity: ListenerIdentity) -> bool {
        let remaining = {
            let mut entries = self.entries.borrow_mut();
            let Some(position) = entries
                .iter()
                .position(|entry| entry.key == key && entry.identity == identity)
            else {
                return false;
            };
            entries.remove(position);
            entries.len()
        };

        if remaining == 0 {
            if let Some(hook) = &self.hooks.on_emptied {
                hook();
            }
        }
        true
    }

    /// Notifies every listener of `key`, in registration order.
    ///
    /// `None` means the new value could not be determined; nobody is called.
    pub fn call_listeners(&self, key: &str, new_value: Option<V>) {
        let Some(new_value) = new_value else {
            return;
        };

        // Collected first so callbacks may add or remove listeners.
        let callbacks: Vec<Rc<dyn Fn(V)>> = self
            .entries
            .borrow()
            .iter()
            .filter(|entry| entry.key == key)
            .map(|entry| Rc::clone(&entry.callback))
            .collect();

        for callback in callbacks {
            callback(new_value.clone());
        }
    }

    /// Total number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Number of listeners registered for `key`.
    pub fn listener_count(&self, key: &str) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.key == key)
            .count()
    }
}

impl<V: Clone> Default for ListenerRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerRegistry<Value> {
    /// Registers a typed listener; values that do not fit `T` are logged
    /// and skipped.
    pub fn add_typed<T: DeserializeOwned + 'static>(&self, key: &str, listener: &Listener<T>) {
        let target = Rc::clone(listener);
        let owned_key = key.to_string();
        self.add_listener(
            key,
            ListenerIdentity::of(listener),
            Rc::new(move |value: Value| match from_value::<T>(value) {
                Ok(typed) => target(typed),
                Err(err) => error!(key = %owned_key, error = %err, "dropping external change"),
            }),
        );
    }

    /// Removes a listener added with [`add_typed`](Self::add_typed).
    pub fn remove_typed<T>(&self, key: &str, listener: &Listener<T>) -> bool {
        self.remove_listener(key, ListenerIdentity::of(listener))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::Cell;

    fn counting_registry() -> (ListenerRegistry<i32>, Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let first = Rc::new(Cell::new(0));
        let emptied = Rc::new(Cell::new(0));
        let hooks = ListenerHooks::new()
            .on_first({
                let first = Rc::clone(&first);
                move || first.set(first.get() + 1)
            })
            .on_emptied({
                let emptied = Rc::clone(&emptied);
                move || emptied.set(emptied.get() + 1)
            });
        (ListenerRegistry::with_hooks(hooks), first, emptied)
    }

    fn recorder() -> (Rc<dyn Fn(i32)>, Rc<RefCell<Vec<i32>>>) {
        let seen = Rc::new(RefCell::new(Vec::<i32>::new()));
        let sink = Rc::clone(&seen);
        (Rc::new(move |v: i32| sink.borrow_mut().push(v)), seen)
    }

    #[test]
    fn notifies_only_matching_key() {
        let registry = ListenerRegistry::new();
        let (k_listener, k_seen) = recorder();
        let (j_listener, j_seen) = recorder();
        registry.add_listener("k", ListenerIdentity::of(&k_listener), Rc::clone(&k_listener));
        registry.add_listener("j", ListenerIdentity::of(&j_listener), Rc::clone(&j_listener));

        registry.call_listeners("k", Some(7));

        assert_eq!(*k_seen.borrow(), vec![7]);
        assert!(j_seen.borrow().is_empty());
    }

    #[test]
    fn absent_value_is_not_propagated() {
        let registry = ListenerRegistry::new();
        let (listener, seen) = recorder();
        registry.add_listener("k", ListenerIdentity::of(&listener), Rc::clone(&listener));

        registry.call_listeners("k", None);

        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let registry: ListenerRegistry<i32> = ListenerRegistry::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut listeners: Vec<Rc<dyn Fn(i32)>> = Vec::new();
        for id in 0..3 {
            let order = Rc::clone(&order);
            listeners.push(Rc::new(move |_: i32| order.borrow_mut().push(id)));
        }
        for listener in &listeners {
            registry.add_listener("k", ListenerIdentity::of(listener), Rc::clone(listener));
        }

        registry.call_listeners("k", Some(1));

        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn removal_matches_key_and_identity() {
        let (registry, _, emptied) = counting_registry();
        let (listener, seen) = recorder();
        let (other, _) = recorder();
        registry.add_listener("k", ListenerIdentity::of(&listener), Rc::clone(&listener));

        assert!(!registry.remove_listener("j", ListenerIdentity::of(&listener)));
        assert!(!registry.remove_listener("k", ListenerIdentity::of(&other)));
        assert_eq!(registry.len(), 1);
        assert_eq!(emptied.get(), 0);

        assert!(registry.remove_listener("k", ListenerIdentity::of(&listener)));
        registry.call_listeners("k", Some(1));
        assert!(seen.borrow().is_empty());
        assert_eq!(emptied.get(), 1);
    }

    #[test]
    fn duplicate_registration_is_removed_one_at_a_time() {
        let (registry, first, emptied) = counting_registry();
        let (listener, seen) = recorder();
        registry.add_listener("k", ListenerIdentity::of(&listener), Rc::clone(&listener));
        registry.add_listener("k", ListenerIdentity::of(&listener), Rc::clone(&listener));

        registry.remove_listener("k", ListenerIdentity::of(&listener));
        registry.call_listeners("k", Some(3));

        assert_eq!(*seen.borrow(), vec![3]);
        assert_eq!(first.get(), 1);
        assert_eq!(emptied.get(), 0);
    }

    #[test]
    fn removing_from_empty_registry_runs_no_hook() {
        let (registry, _, emptied) = counting_registry();
        let (listener, _) = recorder();
        assert!(!registry.remove_listener("k", ListenerIdentity::of(&listener)));
        assert_eq!(emptied.get(), 0);
    }

    #[test]
    fn callback_may_remove_itself() {
        let registry: Rc<ListenerRegistry<i32>> = Rc::new(ListenerRegistry::new());
        let calls = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Rc<dyn Fn(i32)>>>> = Rc::new(RefCell::new(None));
        let listener: Rc<dyn Fn(i32)> = {
            let registry = Rc::downgrade(&registry);
            let calls = Rc::clone(&calls);
            let slot = Rc::clone(&slot);
            Rc::new(move |_: i32| {
                calls.set(calls.get() + 1);
                if let (Some(registry), Some(me)) = (registry.upgrade(), slot.borrow().as_ref()) {
                    registry.remove_listener("k", ListenerIdentity::of(me));
                }
            })
        };
        *slot.borrow_mut() = Some(Rc::clone(&listener));
        registry.add_listener("k", ListenerIdentity::of(&listener), Rc::clone(&listener));

        registry.call_listeners("k", Some(1));
        registry.call_listeners("k", Some(2));

        assert_eq!(calls.get(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn typed_listener_skips_values_of_wrong_shape() {
        let registry: ListenerRegistry<Value> = ListenerRegistry::new();
        let seen = Rc::new(RefCell::new(Vec::<u32>::new()));
        let listener: Listener<u32> = {
            let seen = Rc::clone(&seen);
            Rc::new(move |v: u32| seen.borrow_mut().push(v))
        };
        registry.add_typed("k", &listener);

        registry.call_listeners("k", Some(Value::from("not a number")));
        registry.call_listeners("k", Some(Value::from(5)));

        assert_eq!(*seen.borrow(), vec![5]);
        assert!(registry.remove_typed("k", &listener));
        assert!(registry.is_empty());
    }

    proptest! {
        #[test]
        fn hooks_fire_once_for_paired_adds_and_removes(n in 1usize..40) {
            let (registry, first, emptied) = counting_registry();
            let listeners: Vec<Rc<dyn Fn(i32)>> =
                (0..n).map(|_| Rc::new(|_: i32| {}) as Rc<dyn Fn(i32)>).collect();

            for (i, listener) in listeners.iter().enumerate() {
                let key = format!("key-{}", i % 3);
                registry.add_listener(&key, ListenerIdentity::of(listener), Rc::clone(listener));
            }
            for (i, listener) in listeners.iter().enumerate() {
                let key = format!("key-{}", i % 3);
                prop_assert!(registry.remove_listener(&key, ListenerIdentity::of(listener)));
            }

            prop_assert_eq!(first.get(), 1);
            prop_assert_eq!(emptied.get(), 1);
            prop_assert!(registry.is_empty());
        }
    }
}
