#![forbid(unsafe_code)]

//! Counter element with an attribute-bridged `value`.
//!
//! `increment`/`decrement` write the property; the next tick mirrors it to
//! the `value` attribute, and the attribute-changed callback re-renders the
//! inner text from the property. Setting the attribute from outside goes the
//! other way: the bridge parses and assigns it, then the text re-renders.

use std::rc::Rc;

use propwatch_core::{PropertyKey, PropertyRegistry, RegistryBuilder};
use propwatch_runtime::{AttributeBridge, BindError, Prop, Runtime, Tracker};

use crate::element::TestElement;

/// Tag the element would be defined under in a DOM host.
pub const TAG_NAME: &str = "propwatch-counter";

const VALUE: PropertyKey = "value";

/// Declare the counter's properties.
pub fn register(builder: &mut RegistryBuilder) {
    builder.class::<CounterElement>().attribute(VALUE);
}

/// Counter component attached to a [`TestElement`].
#[derive(Debug)]
pub struct CounterElement {
    element: Rc<TestElement>,
    value: Prop<i64>,
    bridge: AttributeBridge,
}

impl CounterElement {
    /// Build a counter on `element`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError`] when `registry` lacks the counter declaration
    /// (see [`register`]).
    pub fn new(
        runtime: &Runtime,
        registry: &PropertyRegistry,
        element: Rc<TestElement>,
    ) -> Result<Self, BindError> {
        let tracker = Tracker::for_class::<Self>(runtime, registry);
        let value = tracker.prop(VALUE, 0_i64)?;
        let bridge = AttributeBridge::builder(&tracker, element.clone())
            .bind(&value)?
            .build();
        element.attach(&bridge);

        let rendered = value.clone();
        element.on_attribute_changed(move |el, _, _, _| {
            el.set_inner_text(rendered.get().to_string());
        });

        Ok(Self {
            element,
            value,
            bridge,
        })
    }

    /// Attach to the document: hydrate from attributes and render.
    pub fn connect(&self) {
        self.element.connect();
        self.render();
    }

    /// Add one, saturating at `i64::MAX`.
    pub fn increment(&self) {
        self.value.update(|v| *v = v.saturating_add(1));
    }

    pub fn decrement(&self) {
        self.value.update(|v| *v = v.saturating_sub(1));
    }

    #[must_use]
    pub fn value(&self) -> i64 {
        self.value.get()
    }

    pub fn set_value(&self, value: i64) {
        self.value.set(value);
    }

    #[must_use]
    pub fn element(&self) -> &Rc<TestElement> {
        &self.element
    }

    #[must_use]
    pub fn bridge(&self) -> &AttributeBridge {
        &self.bridge
    }

    fn render(&self) {
        self.element.set_inner_text(self.value.get().to_string());
    }
}
