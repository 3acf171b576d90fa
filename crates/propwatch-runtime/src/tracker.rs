#![forbid(unsafe_code)]

//! Per-instance change batching and flush delivery.
//!
//! A [`Tracker`] is the change-tracking capability of one observable
//! instance. Every [`Prop`] created from it routes its writes into the
//! tracker's batch; the first write of a turn queues a flush on the
//! [`Runtime`], and the flush hands the finished [`Changes`] to each
//! property-changed listener.
//!
//! # Invariants
//!
//! 1. At most one flush is queued per instance at any time.
//! 2. `first_change` is decided at flush time: `true` exactly when the key has
//!    never been delivered on this instance before.
//! 3. The batch and the pending flag are reset *before* listeners run, so a
//!    write made by a listener starts a new batch delivered on a later tick.
//! 4. A flush for a dropped instance does nothing.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use propwatch_core::PropertyRegistry;
//! use propwatch_runtime::{Runtime, Tracker};
//!
//! struct Point;
//!
//! let mut builder = PropertyRegistry::builder();
//! builder.class::<Point>().observe("x").observe("y");
//! let registry = builder.build().unwrap();
//!
//! let rt = Runtime::new();
//! let tracker = Tracker::for_class::<Point>(&rt, &registry);
//! let x = tracker.prop("x", 0).unwrap();
//! let y = tracker.prop("y", 0).unwrap();
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//! tracker.on_property_changed(move |changes| {
//!     sink.borrow_mut().extend(changes.keys());
//! });
//!
//! x.set(1);
//! x.set(2);
//! y.set(5);
//! rt.tick();
//! assert_eq!(*seen.borrow(), vec!["x", "y"]);
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use ahash::AHashSet;
use propwatch_core::{ClassId, Changes, PropertyKey, PropertyRegistry, PropertyValue, Value};
use tracing::{debug, trace};

use crate::error::{BindError, CallbackOrigin};
use crate::prop::Prop;
use crate::runtime::Runtime;

type Listener = Rc<dyn Fn(&Changes)>;

/// Handle for removing a listener registered with
/// [`Tracker::on_property_changed`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub(crate) struct TrackerInner {
    class: ClassId,
    registry: PropertyRegistry,
    runtime: Runtime,
    batch: RefCell<Changes>,
    flush_pending: Cell<bool>,
    initialized: RefCell<AHashSet<PropertyKey>>,
    bound: RefCell<AHashSet<PropertyKey>>,
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    next_listener: Cell<u64>,
}

/// Change-tracking state of one observable instance.
///
/// Cloning shares the same state.
#[derive(Clone)]
pub struct Tracker {
    inner: Rc<TrackerInner>,
}

impl Tracker {
    /// Create the tracker for one instance of `class`.
    #[must_use]
    pub fn new(runtime: &Runtime, registry: &PropertyRegistry, class: ClassId) -> Self {
        Self {
            inner: Rc::new(TrackerInner {
                class,
                registry: registry.clone(),
                runtime: runtime.clone(),
                batch: RefCell::new(Changes::new()),
                flush_pending: Cell::new(false),
                initialized: RefCell::new(AHashSet::new()),
                bound: RefCell::new(AHashSet::new()),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
            }),
        }
    }

    /// Create the tracker for one instance of `C`.
    #[must_use]
    pub fn for_class<C: ?Sized + 'static>(runtime: &Runtime, registry: &PropertyRegistry) -> Self {
        Self::new(runtime, registry, ClassId::of::<C>())
    }

    /// Class of the tracked instance.
    #[must_use]
    pub fn class(&self) -> ClassId {
        self.inner.class
    }

    /// Registry the tracker reads its keys from.
    #[must_use]
    pub fn registry(&self) -> &PropertyRegistry {
        &self.inner.registry
    }

    /// Runtime that schedules this instance's flushes.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Whether `self` and `other` track the same instance.
    #[must_use]
    pub fn same_instance(&self, other: &Tracker) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Create the storage slot for observed property `key`.
    ///
    /// # Errors
    ///
    /// - [`BindError::NotObserved`] if `key` is not observed on the class.
    /// - [`BindError::AlreadyBound`] if this instance already has a slot for
    ///   `key`.
    pub fn prop<T: PropertyValue>(&self, key: PropertyKey, initial: T) -> Result<Prop<T>, BindError> {
        let class = self.inner.class;
        if !self.inner.registry.is_observed(class, key) {
            return Err(BindError::NotObserved { class, key });
        }
        if !self.inner.bound.borrow_mut().insert(key) {
            return Err(BindError::AlreadyBound { class, key });
        }
        Ok(Prop::new(key, initial, self.clone()))
    }

    /// Register `listener` to receive every flushed batch of this instance.
    ///
    /// Listeners run in registration order.
    pub fn on_property_changed(&self, listener: impl Fn(&Changes) + 'static) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.get());
        self.inner.next_listener.set(id.0 + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        id
    }

    /// Unregister a listener. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let removed = {
            let mut listeners = self.inner.listeners.borrow_mut();
            let index = listeners.iter().position(|(entry, _)| *entry == id);
            index.map(|index| listeners.remove(index))
        };
        removed.is_some()
    }

    /// Whether a flush is queued.
    #[must_use]
    pub fn has_pending_flush(&self) -> bool {
        self.inner.flush_pending.get()
    }

    /// Keys written in the current, not yet delivered batch.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<PropertyKey> {
        self.inner.batch.borrow().keys().collect()
    }

    /// Whether `key` has been delivered at least once.
    #[must_use]
    pub fn is_initialized(&self, key: &str) -> bool {
        self.inner.initialized.borrow().contains(key)
    }

    /// Merge one changed write into the batch and make sure a flush is
    /// queued.
    pub(crate) fn record(&self, key: PropertyKey, previous: Value, value: Value) {
        self.inner.batch.borrow_mut().record(key, previous, value);
        self.schedule_flush();
        self.inner.runtime.arm_effects();
    }

    fn schedule_flush(&self) {
        if self.inner.flush_pending.replace(true) {
            return;
        }
        trace!(class = %self.inner.class, "flush scheduled");
        let weak = Rc::downgrade(&self.inner);
        self.inner.runtime.queue_microtask(move || {
            if let Some(inner) = weak.upgrade() {
                Tracker { inner }.flush();
            }
        });
    }

    fn flush(&self) {
        let mut changes = std::mem::take(&mut *self.inner.batch.borrow_mut());
        self.inner.flush_pending.set(false);
        if changes.is_empty() {
            return;
        }
        {
            let mut initialized = self.inner.initialized.borrow_mut();
            for (key, change) in changes.iter_mut() {
                change.first_change = initialized.insert(key);
            }
        }

        let class = self.inner.class;
        debug!(
            class = %class,
            keys = ?changes.keys().collect::<Vec<_>>(),
            "delivering property changes"
        );
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for (index, listener) in listeners.iter().enumerate() {
            self.inner
                .runtime
                .guarded(CallbackOrigin::Listener { class, index }, || listener(&changes));
        }
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("class", &self.inner.class)
            .field("pending_keys", &self.pending_keys())
            .field("flush_pending", &self.has_pending_flush())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallbackError;
    use pretty_assertions::assert_eq;

    struct Model;

    fn registry() -> PropertyRegistry {
        let mut builder = PropertyRegistry::builder();
        builder.class::<Model>().observe("a").observe("b");
        builder.build().unwrap()
    }

    fn capture(tracker: &Tracker) -> Rc<RefCell<Vec<Changes>>> {
        let deliveries = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&deliveries);
        tracker.on_property_changed(move |changes| sink.borrow_mut().push(changes.clone()));
        deliveries
    }

    #[test]
    fn unobserved_keys_are_rejected() {
        let rt = Runtime::new();
        let tracker = Tracker::for_class::<Model>(&rt, &registry());
        let err = tracker.prop("nope", 0).unwrap_err();
        assert_eq!(
            err,
            BindError::NotObserved {
                class: ClassId::of::<Model>(),
                key: "nope"
            }
        );
    }

    #[test]
    fn keys_bind_once_per_instance() {
        let rt = Runtime::new();
        let reg = registry();
        let tracker = Tracker::for_class::<Model>(&rt, &reg);
        let _a = tracker.prop("a", 0).unwrap();
        assert!(matches!(
            tracker.prop("a", 1),
            Err(BindError::AlreadyBound { key: "a", .. })
        ));

        // Another instance of the same class has its own slots.
        let other = Tracker::for_class::<Model>(&rt, &reg);
        assert!(other.prop("a", 0).is_ok());
    }

    #[test]
    fn writes_coalesce_into_one_delivery() {
        let rt = Runtime::new();
        let tracker = Tracker::for_class::<Model>(&rt, &registry());
        let a = tracker.prop("a", 'a').unwrap();
        let deliveries = capture(&tracker);

        a.set('b');
        a.set('c');
        assert!(tracker.has_pending_flush());
        assert_eq!(tracker.pending_keys(), vec!["a"]);
        assert!(deliveries.borrow().is_empty());

        rt.tick();
        let deliveries = deliveries.borrow();
        assert_eq!(deliveries.len(), 1);
        let change = deliveries[0].get("a").unwrap();
        assert_eq!(change.value_as::<char>(), Some(&'c'));
        assert_eq!(change.previous_as::<char>(), Some(&'a'));
        assert!(!tracker.has_pending_flush());
        assert!(tracker.pending_keys().is_empty());
    }

    #[test]
    fn first_change_is_decided_at_flush() {
        let rt = Runtime::new();
        let tracker = Tracker::for_class::<Model>(&rt, &registry());
        let a = tracker.prop("a", 0).unwrap();
        let b = tracker.prop("b", 0).unwrap();
        let deliveries = capture(&tracker);

        a.set(1);
        rt.tick();
        a.set(0);
        b.set(1);
        rt.tick();
        a.set(1);
        rt.tick();

        let deliveries = deliveries.borrow();
        let firsts: Vec<Vec<(PropertyKey, bool)>> = deliveries
            .iter()
            .map(|c| c.iter().map(|(k, c)| (k, c.first_change)).collect())
            .collect();
        assert_eq!(
            firsts,
            vec![
                vec![("a", true)],
                vec![("a", false), ("b", true)],
                vec![("a", false)],
            ]
        );
        assert!(tracker.is_initialized("a"));
    }

    #[test]
    fn listener_writes_start_a_new_batch() {
        let rt = Runtime::new();
        let tracker = Tracker::for_class::<Model>(&rt, &registry());
        let a = tracker.prop("a", 0).unwrap();
        let b = tracker.prop("b", 0).unwrap();
        let deliveries = capture(&tracker);

        let b_in_listener = b.clone();
        tracker.on_property_changed(move |changes| {
            if changes.contains("a") {
                b_in_listener.set(99);
            }
        });

        a.set(1);
        assert_eq!(rt.tick(), 1);
        {
            let deliveries = deliveries.borrow();
            assert_eq!(deliveries.len(), 1);
            assert_eq!(deliveries[0].keys().collect::<Vec<_>>(), vec!["a"]);
        }
        assert!(tracker.has_pending_flush(), "listener write armed a new flush");

        rt.tick();
        let deliveries = deliveries.borrow();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[1].value_of::<i32>("b"), Some(&99));
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let rt = Runtime::new();
        let errors = Rc::new(RefCell::new(Vec::<CallbackError>::new()));
        let sink = Rc::clone(&errors);
        rt.set_error_reporter(move |err| sink.borrow_mut().push(err.clone()));

        let tracker = Tracker::for_class::<Model>(&rt, &registry());
        let a = tracker.prop("a", 0).unwrap();
        tracker.on_property_changed(|_| panic!("listener exploded"));
        let deliveries = capture(&tracker);

        a.set(1);
        rt.tick();
        assert_eq!(deliveries.borrow().len(), 1);
        let errors = errors.borrow();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].origin,
            CallbackOrigin::Listener {
                class: ClassId::of::<Model>(),
                index: 0
            }
        );
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let rt = Runtime::new();
        let tracker = Tracker::for_class::<Model>(&rt, &registry());
        let a = tracker.prop("a", 0).unwrap();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let id = tracker.on_property_changed(move |_| c.set(c.get() + 1));

        a.set(1);
        rt.tick();
        assert!(tracker.remove_listener(id));
        assert!(!tracker.remove_listener(id));
        a.set(2);
        rt.tick();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn dropped_instance_flushes_nothing() {
        let rt = Runtime::new();
        let count = Rc::new(Cell::new(0));
        {
            let tracker = Tracker::for_class::<Model>(&rt, &registry());
            let a = tracker.prop("a", 0).unwrap();
            let c = Rc::clone(&count);
            tracker.on_property_changed(move |_| c.set(c.get() + 1));
            a.set(1);
        }
        assert_eq!(rt.tick(), 1);
        assert_eq!(count.get(), 0);
    }
}
