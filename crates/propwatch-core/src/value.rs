#![forbid(unsafe_code)]

//! Type-erased property values.
//!
//! Observed properties are strongly typed at their storage slot, but a single
//! batch mixes properties of different types. [`Value`] erases the type behind
//! a shared pointer so a [`Changes`](crate::Changes) map can carry all of them,
//! and [`Value::downcast_ref`] recovers the concrete type on the consumer side.

use std::any::{Any, type_name};
use std::fmt;
use std::rc::Rc;

/// Bound satisfied by every type that can live in an observed property slot.
///
/// Equality is the interceptor's "did this write change anything" check, so
/// it should be cheap. `Debug` is required so batches can be logged.
pub trait PropertyValue: Clone + PartialEq + fmt::Debug + 'static {}

impl<T: Clone + PartialEq + fmt::Debug + 'static> PropertyValue for T {}

trait Erased: Any + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + fmt::Debug> Erased for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// A shared, type-erased property value.
///
/// Cloning is a reference-count bump.
#[derive(Clone)]
pub struct Value(Rc<dyn Erased>);

impl Value {
    /// Erase `value`.
    #[must_use]
    pub fn new<T: Any + fmt::Debug>(value: T) -> Self {
        Self(Rc::new(value))
    }

    fn erased(&self) -> &dyn Erased {
        &*self.0
    }

    /// Borrow the value as `T`, or `None` if it holds a different type.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.erased().as_any().downcast_ref::<T>()
    }

    /// Whether the value holds a `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.erased().as_any().is::<T>()
    }

    /// Rust type name of the held value, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.erased().type_name()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.erased(), f)
    }
}
