#![forbid(unsafe_code)]

//! Intercepted storage slot of one observed property.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use propwatch_core::{PropertyKey, PropertyValue, Value};

use crate::tracker::Tracker;

struct PropInner<T> {
    key: PropertyKey,
    slot: RefCell<T>,
    tracker: Tracker,
}

/// Shared handle to an observed property slot.
///
/// Reads return the stored value directly; the pending batch is never
/// consulted. Writes that leave the value unchanged (by `PartialEq`) do
/// nothing at all: no batch entry, no flush, no effect run.
///
/// Cloning shares the slot.
pub struct Prop<T> {
    inner: Rc<PropInner<T>>,
}

impl<T> Clone for Prop<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: PropertyValue> Prop<T> {
    pub(crate) fn new(key: PropertyKey, initial: T, tracker: Tracker) -> Self {
        Self {
            inner: Rc::new(PropInner {
                key,
                slot: RefCell::new(initial),
                tracker,
            }),
        }
    }

    /// Property name.
    #[must_use]
    pub fn key(&self) -> PropertyKey {
        self.inner.key
    }

    /// Tracker of the owning instance.
    #[must_use]
    pub fn tracker(&self) -> &Tracker {
        &self.inner.tracker
    }

    /// Current value (cloned).
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.slot.borrow().clone()
    }

    /// Borrow the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.slot.borrow())
    }

    /// Store `value`, recording a change when it differs from the current one.
    pub fn set(&self, value: T) {
        let previous = {
            let mut slot = self.inner.slot.borrow_mut();
            if *slot == value {
                return;
            }
            std::mem::replace(&mut *slot, value.clone())
        };
        self.inner
            .tracker
            .record(self.inner.key, Value::new(previous), Value::new(value));
    }

    /// Modify a copy of the current value and store it through [`set`](Self::set).
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut next = self.get();
        f(&mut next);
        self.set(next);
    }
}

impl<T: PropertyValue> fmt::Debug for Prop<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prop")
            .field("key", &self.inner.key)
            .field("value", &*self.inner.slot.borrow())
            .finish()
    }
}
