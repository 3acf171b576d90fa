#![forbid(unsafe_code)]

//! In-memory host element.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use propwatch_runtime::{AttributeBridge, HostElement, WeakAttributeBridge};

type AttributeCallback = Rc<dyn Fn(&TestElement, &str, Option<&str>, Option<&str>)>;

/// One `set_attribute` call observed on a [`TestElement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeWrite {
    pub name: String,
    pub value: String,
}

/// Host element backed by a map, with DOM-style callbacks.
///
/// Once [`attach`](Self::attach)ed to a bridge, every write or removal of an
/// observed attribute synchronously calls
/// [`AttributeBridge::attribute_changed`] and then each callback registered
/// with [`on_attribute_changed`](Self::on_attribute_changed). Writes of an
/// unchanged value still fire, as they do on a DOM element.
#[derive(Default)]
pub struct TestElement {
    attributes: RefCell<IndexMap<String, String>>,
    writes: RefCell<Vec<AttributeWrite>>,
    observed: RefCell<Vec<String>>,
    bridge: RefCell<WeakAttributeBridge>,
    callbacks: RefCell<Vec<AttributeCallback>>,
    inner_text: RefCell<String>,
}

impl TestElement {
    /// Create a detached element with no attributes.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Create a detached element with initial attributes.
    ///
    /// Initial attributes are not recorded as writes.
    #[must_use]
    pub fn with_attributes<'a>(attrs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Rc<Self> {
        let element = Self::default();
        element.attributes.borrow_mut().extend(
            attrs
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value.to_owned())),
        );
        Rc::new(element)
    }

    /// Start forwarding observed attribute changes to `bridge`.
    pub fn attach(&self, bridge: &AttributeBridge) {
        *self.bridge.borrow_mut() = bridge.downgrade();
        *self.observed.borrow_mut() = bridge
            .observed_attributes()
            .into_iter()
            .map(str::to_owned)
            .collect();
    }

    /// Lifecycle hook: hydrate the attached bridge from current attributes.
    pub fn connect(&self) {
        let bridge = self.bridge.borrow().upgrade();
        if let Some(bridge) = bridge {
            bridge.connected();
        }
    }

    /// Register a callback run after the bridge for every observed change.
    pub fn on_attribute_changed(
        &self,
        callback: impl Fn(&TestElement, &str, Option<&str>, Option<&str>) + 'static,
    ) {
        self.callbacks.borrow_mut().push(Rc::new(callback));
    }

    /// Every attribute write, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<AttributeWrite> {
        self.writes.borrow().clone()
    }

    /// Forget recorded writes.
    pub fn clear_writes(&self) {
        self.writes.borrow_mut().clear();
    }

    /// Snapshot of all attributes, in insertion order.
    #[must_use]
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.attributes
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[must_use]
    pub fn inner_text(&self) -> String {
        self.inner_text.borrow().clone()
    }

    pub fn set_inner_text(&self, text: impl Into<String>) {
        *self.inner_text.borrow_mut() = text.into();
    }

    fn is_observed(&self, name: &str) -> bool {
        self.observed.borrow().iter().any(|n| n == name)
    }

    // No borrow of `self` may be held here: the bridge re-enters through
    // property setters and callbacks may write attributes again.
    fn fire(&self, name: &str, old: Option<&str>, new: Option<&str>) {
        if !self.is_observed(name) {
            return;
        }
        let bridge = self.bridge.borrow().upgrade();
        if let Some(bridge) = bridge {
            bridge.attribute_changed(name, old, new);
        }
        let callbacks: Vec<AttributeCallback> = self.callbacks.borrow().clone();
        for callback in callbacks {
            callback(self, name, old, new);
        }
    }
}

impl HostElement for TestElement {
    fn get_attribute(&self, name: &str) -> Option<String> {
        self.attributes.borrow().get(name).cloned()
    }

    fn set_attribute(&self, name: &str, value: &str) {
        let old = self
            .attributes
            .borrow_mut()
            .insert(name.to_owned(), value.to_owned());
        self.writes.borrow_mut().push(AttributeWrite {
            name: name.to_owned(),
            value: value.to_owned(),
        });
        self.fire(name, old.as_deref(), Some(value));
    }

    // Fires only if the attribute was present.
    fn remove_attribute(&self, name: &str) {
        let old = self.attributes.borrow_mut().shift_remove(name);
        if old.is_some() {
            self.fire(name, old.as_deref(), None);
        }
    }
}

impl fmt::Debug for TestElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestElement")
            .field("attributes", &*self.attributes.borrow())
            .field("observed", &*self.observed.borrow())
            .field("inner_text", &*self.inner_text.borrow())
            .finish()
    }
}
