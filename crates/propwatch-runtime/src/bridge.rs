#![forbid(unsafe_code)]

//! Two-way link between attribute-bridged properties and host attributes.
//!
//! An [`AttributeBridge`] connects the observed properties of one instance to
//! the string attributes of its [`HostElement`]:
//!
//! - [`connected`](AttributeBridge::connected) hydrates each bound property
//!   from the host attribute of the same name, when present.
//! - [`attribute_changed`](AttributeBridge::attribute_changed) converts the
//!   new attribute text and assigns it through the property's normal setter.
//!   A removal assigns [`AttributeValue::from_missing`] when the type has one.
//! - Each flushed batch is mirrored back: every changed key that is bound is
//!   written to the host with [`AttributeValue::to_attribute`], or removed
//!   when that renders nothing.
//!
//! # Mirror loop termination
//!
//! Writing an attribute makes the host call `attribute_changed`, which assigns
//! the property again. That assignment carries the value the property already
//! holds, so the setter's equality check turns it into a no-op: nothing is
//! recorded and no flush is queued. This needs every [`AttributeValue`] to
//! convert its own rendering back to an equal value. The bridge itself keeps
//! no re-entrancy guard.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::collections::HashMap;
//! use std::rc::Rc;
//! use propwatch_core::PropertyRegistry;
//! use propwatch_runtime::{AttributeBridge, HostElement, Runtime, Tracker};
//!
//! #[derive(Default)]
//! struct Host(RefCell<HashMap<String, String>>);
//!
//! impl HostElement for Host {
//!     fn get_attribute(&self, name: &str) -> Option<String> {
//!         self.0.borrow().get(name).cloned()
//!     }
//!     fn set_attribute(&self, name: &str, value: &str) {
//!         self.0.borrow_mut().insert(name.to_owned(), value.to_owned());
//!     }
//!     fn remove_attribute(&self, name: &str) {
//!         self.0.borrow_mut().remove(name);
//!     }
//! }
//!
//! struct Counter;
//!
//! let mut builder = PropertyRegistry::builder();
//! builder.class::<Counter>().attribute("value");
//! let registry = builder.build().unwrap();
//!
//! let rt = Runtime::new();
//! let host = Rc::new(Host::default());
//! host.set_attribute("value", "3");
//!
//! let tracker = Tracker::for_class::<Counter>(&rt, &registry);
//! let value = tracker.prop("value", 0_i64).unwrap();
//! let bridge = AttributeBridge::builder(&tracker, host.clone())
//!     .bind(&value)
//!     .unwrap()
//!     .build();
//!
//! bridge.connected();
//! assert_eq!(value.get(), 3);
//!
//! value.set(10);
//! rt.tick();
//! assert_eq!(host.get_attribute("value").as_deref(), Some("10"));
//! ```

use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use propwatch_core::{AttributeValue, Changes, PropertyKey, PropertyValue, Value};
use tracing::{trace, warn};

use crate::error::BindError;
use crate::prop::Prop;
use crate::tracker::{ListenerId, Tracker};

/// The element an instance is attached to.
///
/// Implementations may call back into
/// [`AttributeBridge::attribute_changed`] synchronously from
/// [`set_attribute`](Self::set_attribute) and
/// [`remove_attribute`](Self::remove_attribute), the way a DOM element fires
/// its attribute-changed callback.
pub trait HostElement {
    /// Current value of attribute `name`, if set.
    fn get_attribute(&self, name: &str) -> Option<String>;

    /// Set attribute `name` to `value`.
    fn set_attribute(&self, name: &str, value: &str);

    /// Remove attribute `name`. Removing an absent attribute does nothing.
    fn remove_attribute(&self, name: &str);
}

/// What a flushed value means for the host attribute.
enum Mirror {
    Set(String),
    Remove,
}

struct AttrBinding {
    assign: Box<dyn Fn(&str) -> bool>,
    clear: Box<dyn Fn() -> bool>,
    render: Box<dyn Fn(&Value) -> Option<Mirror>>,
}

struct BridgeInner {
    tracker: Tracker,
    host: Rc<dyn HostElement>,
    bindings: IndexMap<PropertyKey, AttrBinding>,
    listener: Option<ListenerId>,
}

impl BridgeInner {
    fn assign(&self, key: PropertyKey, binding: &AttrBinding, raw: &str) {
        if !(binding.assign)(raw) {
            warn!(
                class = %self.tracker.class(),
                attribute = key,
                raw,
                "attribute value does not convert to the property type"
            );
        }
    }

    fn mirror(&self, changes: &Changes) {
        for (key, change) in changes.iter() {
            let Some(binding) = self.bindings.get(key) else {
                continue;
            };
            match (binding.render)(&change.value) {
                Some(Mirror::Set(text)) => {
                    trace!(class = %self.tracker.class(), attribute = key, value = %text, "mirroring attribute");
                    self.host.set_attribute(key, &text);
                }
                Some(Mirror::Remove) => {
                    trace!(class = %self.tracker.class(), attribute = key, "removing mirrored attribute");
                    self.host.remove_attribute(key);
                }
                None => {}
            }
        }
    }
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        if let Some(id) = self.listener.take() {
            self.tracker.remove_listener(id);
        }
    }
}

/// Builder returned by [`AttributeBridge::builder`].
pub struct AttributeBridgeBuilder {
    tracker: Tracker,
    host: Rc<dyn HostElement>,
    bindings: IndexMap<PropertyKey, AttrBinding>,
}

impl AttributeBridgeBuilder {
    /// Bridge `prop` to the host attribute of the same name.
    ///
    /// # Errors
    ///
    /// - [`BindError::ForeignProperty`] if `prop` belongs to another instance.
    /// - [`BindError::NotAttribute`] if the key is not attribute-bridged on
    ///   the class.
    pub fn bind<T>(mut self, prop: &Prop<T>) -> Result<Self, BindError>
    where
        T: PropertyValue + AttributeValue,
    {
        let key = prop.key();
        if !prop.tracker().same_instance(&self.tracker) {
            return Err(BindError::ForeignProperty { key });
        }
        let class = self.tracker.class();
        if !self.tracker.registry().is_attribute(class, key) {
            return Err(BindError::NotAttribute { class, key });
        }
        let target = prop.clone();
        let cleared = prop.clone();
        let binding = AttrBinding {
            assign: Box::new(move |raw: &str| match T::from_attribute_text(raw) {
                Some(value) => {
                    target.set(value);
                    true
                }
                None => false,
            }),
            clear: Box::new(move || match T::from_missing() {
                Some(value) => {
                    cleared.set(value);
                    true
                }
                None => false,
            }),
            render: Box::new(|value: &Value| {
                value
                    .downcast_ref::<T>()
                    .map(|v| v.to_attribute().map_or(Mirror::Remove, Mirror::Set))
            }),
        };
        self.bindings.insert(key, binding);
        Ok(self)
    }

    /// Finish the bridge and start mirroring flushed changes to the host.
    #[must_use]
    pub fn build(self) -> AttributeBridge {
        let tracker = self.tracker.clone();
        let inner = Rc::new_cyclic(|weak: &Weak<BridgeInner>| {
            let weak = weak.clone();
            let listener = tracker.on_property_changed(move |changes| {
                if let Some(inner) = weak.upgrade() {
                    inner.mirror(changes);
                }
            });
            BridgeInner {
                tracker: self.tracker,
                host: self.host,
                bindings: self.bindings,
                listener: Some(listener),
            }
        });
        AttributeBridge { inner }
    }
}

impl fmt::Debug for AttributeBridgeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeBridgeBuilder")
            .field("class", &self.tracker.class())
            .field("attributes", &self.bindings.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Attribute hydration and mirroring for one instance.
///
/// Dropping the bridge stops mirroring.
#[derive(Clone)]
pub struct AttributeBridge {
    inner: Rc<BridgeInner>,
}

impl AttributeBridge {
    /// Start a bridge between `tracker`'s instance and `host`.
    pub fn builder(tracker: &Tracker, host: Rc<dyn HostElement>) -> AttributeBridgeBuilder {
        AttributeBridgeBuilder {
            tracker: tracker.clone(),
            host,
            bindings: IndexMap::new(),
        }
    }

    /// Host lifecycle hook: the element was attached. Hydrates every bound
    /// property whose attribute is present on the host.
    pub fn connected(&self) {
        for (&key, binding) in &self.inner.bindings {
            if let Some(raw) = self.inner.host.get_attribute(key) {
                self.inner.assign(key, binding, &raw);
            }
        }
    }

    /// Host lifecycle hook: attribute `name` changed from `old` to `new`.
    ///
    /// Unbound names are ignored. A removal (`new == None`) assigns the
    /// property type's missing value, such as `None` for `Option<T>`, and
    /// leaves other types unchanged.
    pub fn attribute_changed(&self, name: &str, old: Option<&str>, new: Option<&str>) {
        let Some((&key, binding)) = self.inner.bindings.get_key_value(name) else {
            return;
        };
        match new {
            Some(raw) => self.inner.assign(key, binding, raw),
            None => {
                if !(binding.clear)() {
                    trace!(attribute = key, ?old, "attribute removed; property left unchanged");
                }
            }
        }
    }

    /// Attribute names the host should report changes for.
    #[must_use]
    pub fn observed_attributes(&self) -> Vec<PropertyKey> {
        self.inner.bindings.keys().copied().collect()
    }

    /// Tracker of the bridged instance.
    #[must_use]
    pub fn tracker(&self) -> &Tracker {
        &self.inner.tracker
    }

    /// Non-owning handle, for hosts that call back into the bridge.
    #[must_use]
    pub fn downgrade(&self) -> WeakAttributeBridge {
        WeakAttributeBridge {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl fmt::Debug for AttributeBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeBridge")
            .field("class", &self.inner.tracker.class())
            .field("attributes", &self.observed_attributes())
            .finish()
    }
}

/// Weak counterpart of [`AttributeBridge`].
#[derive(Clone, Default)]
pub struct WeakAttributeBridge {
    inner: Weak<BridgeInner>,
}

impl WeakAttributeBridge {
    /// The bridge, if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<AttributeBridge> {
        self.inner.upgrade().map(|inner| AttributeBridge { inner })
    }
}

impl fmt::Debug for WeakAttributeBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakAttributeBridge")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}
