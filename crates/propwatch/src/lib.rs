#![forbid(unsafe_code)]

//! propwatch public facade.
//!
//! Observable properties whose writes are batched per instance and delivered
//! once per turn, global effects that re-run after any observed write, and a
//! bridge that keeps properties and host attributes in sync.
//!
//! # Example
//!
//! ```
//! use propwatch::prelude::*;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! struct Slider;
//!
//! let mut builder = PropertyRegistry::builder();
//! builder.class::<Slider>().observe("position");
//! let registry = builder.build().unwrap();
//!
//! let rt = Runtime::new();
//! let tracker = Tracker::for_class::<Slider>(&rt, &registry);
//! let position = tracker.prop("position", 0.0_f64).unwrap();
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//! tracker.on_property_changed(move |changes| {
//!     sink.borrow_mut().push(changes.value_of::<f64>("position").copied());
//! });
//!
//! position.set(0.25);
//! position.set(0.5);
//! rt.tick();
//! assert_eq!(*seen.borrow(), vec![Some(0.5)]);
//! ```

pub use propwatch_core as core;
pub use propwatch_runtime as runtime;

pub use propwatch_core::{
    AttrValue, AttributeValue, Change, Changes, ClassId, PropertyKey, PropertyRegistry,
    PropertyValue, RegistryBuilder, RegistryError, Value, parse_attribute,
};
pub use propwatch_runtime::{
    AttributeBridge, BindError, CallbackError, Effect, HostElement, Prop, Runtime, RuntimeConfig,
    RuntimeError, Tracker,
};

/// Common imports for components built on propwatch.
pub mod prelude {
    pub use propwatch_core::{
        AttrValue, AttributeValue, Change, Changes, ClassId, PropertyKey, PropertyRegistry,
    };
    pub use propwatch_runtime::{
        AttributeBridge, Effect, HostElement, Prop, Runtime, RuntimeConfig, Tracker,
    };
}
