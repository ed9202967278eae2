//! Minimal reactive value container.
//!
//! [`WritableStore`] holds one value and tells subscribers about it: once
//! immediately on subscription, then after every change. Setting a value
//! equal to the current one notifies nobody.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Callback told about the store's value.
pub type Subscriber<T> = Box<dyn Fn(&T)>;

/// Cleanup returned by a [`StartStopNotifier`].
pub type Stop = Box<dyn FnOnce()>;

/// Runs when a store gets its first subscriber; the returned [`Stop`] runs
/// once the last subscriber leaves.
pub type StartStopNotifier<T> = Box<dyn Fn(&WritableStore<T>) -> Option<Stop>>;

/// Ends a subscription.
#[must_use = "dropping an Unsubscriber keeps the subscription alive"]
pub struct Unsubscriber {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Unsubscriber {
    /// Wraps the function that ends the subscription.
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// An unsubscriber with nothing to end.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Ends the subscription.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Unsubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscriber")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// A value that can be read, written and observed.
pub trait Writable<T> {
    /// Replaces the value.
    fn set(&self, value: T);

    /// Replaces the value with `f(current)`.
    fn update(&self, f: impl FnOnce(T) -> T)
    where
        Self: Sized,
    {
        self.set(f(self.get()));
    }

    /// Returns a copy of the current value.
    fn get(&self) -> T;

    /// Calls `subscriber` with the current value now and after every
    /// change.
    fn subscribe(&self, subscriber: Subscriber<T>) -> Unsubscriber;
}

struct Inner<T> {
    value: RefCell<T>,
    subscribers: RefCell<Vec<(u64, Rc<dyn Fn(&T)>)>>,
    next_id: Cell<u64>,
    start: Option<StartStopNotifier<T>>,
    stop: RefCell<Option<Stop>>,
}

/// Shared, cloneable store. Clones observe the same value.
pub struct WritableStore<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for WritableStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> WritableStore<T> {
    /// Creates a store holding `value`.
    pub fn new(value: T) -> Self {
        Self::build(value, None)
    }

    /// Creates a store with a start/stop notifier.
    pub fn with_start(value: T, start: StartStopNotifier<T>) -> Self {
        Self::build(value, Some(start))
    }

    fn build(value: T, start: Option<StartStopNotifier<T>>) -> Self {
        Self {
            inner: Rc::new(Inner {
                value: RefCell::new(value),
                subscribers: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                start,
                stop: RefCell::new(None),
            }),
        }
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    fn notify(&self, value: &T) {
        let subscribers: Vec<Rc<dyn Fn(&T)>> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(_, subscriber)| Rc::clone(subscriber))
            .collect();
        for subscriber in subscribers {
            subscriber(value);
        }
    }

    fn unsubscribe_id(inner: &Weak<Inner<T>>, id: u64) {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let emptied = {
            let mut subscribers = inner.subscribers.borrow_mut();
            let before = subscribers.len();
            subscribers.retain(|(candidate, _)| *candidate != id);
            before != subscribers.len() && subscribers.is_empty()
        };
        if emptied {
            let stop = inner.stop.borrow_mut().take();
            if let Some(stop) = stop {
                stop();
            }
        }
    }
}

impl<T: Clone + PartialEq + 'static> Writable<T> for WritableStore<T> {
    fn set(&self, value: T) {
        if *self.inner.value.borrow() == value {
            return;
        }
        *self.inner.value.borrow_mut() = value.clone();
        self.notify(&value);
    }

    fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    fn subscribe(&self, subscriber: Subscriber<T>) -> Unsubscriber {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        let subscriber: Rc<dyn Fn(&T)> = Rc::from(subscriber);

        // The notifier runs before the first subscriber is registered, so
        // values it sets are only seen through the initial call below.
        if self.inner.subscribers.borrow().is_empty() {
            if let Some(start) = &self.inner.start {
                let stop = start(self);
                *self.inner.stop.borrow_mut() = stop;
            }
        }
        self.inner
            .subscribers
            .borrow_mut()
            .push((id, Rc::clone(&subscriber)));

        subscriber(&self.get());

        let inner = Rc::downgrade(&self.inner);
        Unsubscriber::new(move || Self::unsubscribe_id(&inner, id))
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for WritableStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritableStore")
            .field("value", &self.inner.value.borrow())
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .finish()
    }
}

/// Creates a [`WritableStore`] holding `value`.
pub fn writable<T: Clone + PartialEq + 'static>(value: T) -> WritableStore<T> {
    WritableStore::new(value)
}
