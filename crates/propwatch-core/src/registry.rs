#![forbid(unsafe_code)]

//! Per-class record of observed and attribute-bridged property keys.
//!
//! The registry is assembled once with a [`RegistryBuilder`] while the
//! application starts up, then frozen into an immutable [`PropertyRegistry`]
//! that is shared by reference with every tracker and bridge. Freezing is
//! what makes the "declare at load time, read forever after" rule hold: the
//! frozen type has no mutating methods.
//!
//! # Inheritance
//!
//! A class may name one parent with [`ClassBuilder::extends`]. Reads include
//! keys declared on every ancestor, ancestors first, without duplicates.
//!
//! # Example
//!
//! ```
//! use propwatch_core::{ClassId, PropertyRegistry};
//!
//! struct Base;
//! struct Counter;
//!
//! let mut builder = PropertyRegistry::builder();
//! builder.class::<Base>().observe("label");
//! builder.class::<Counter>().extends::<Base>().attribute("value");
//! let registry = builder.build().unwrap();
//!
//! let counter = ClassId::of::<Counter>();
//! assert_eq!(registry.observed_keys_of(counter), &["label", "value"]);
//! assert_eq!(registry.attribute_keys_of(counter), &["value"]);
//! ```

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ahash::AHashSet;
use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::change::PropertyKey;

/// Identity of a class of observable instances.
///
/// Two ids are equal when they name the same Rust type; the type name is
/// carried along for logs and errors only.
#[derive(Clone, Copy)]
pub struct ClassId {
    type_id: TypeId,
    name: &'static str,
}

impl ClassId {
    /// Class id of `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Full type name of the class.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl PartialEq for ClassId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ClassId {}

impl Hash for ClassId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClassId").field(&self.name).finish()
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Errors detected when freezing a [`RegistryBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A class extends a class that was never declared.
    #[error("class `{class}` extends `{parent}`, which is not declared")]
    UnknownParent {
        /// The declaring class.
        class: ClassId,
        /// The missing parent.
        parent: ClassId,
    },
    /// Following parent links from `class` leads back to `class`.
    #[error("inheritance cycle through class `{class}`")]
    InheritanceCycle {
        /// A class on the cycle.
        class: ClassId,
    },
}

#[derive(Debug, Default)]
struct ClassDecl {
    parent: Option<ClassId>,
    observed: IndexSet<PropertyKey>,
    attributes: IndexSet<PropertyKey>,
}

/// Mutable registry used during startup.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    classes: IndexMap<ClassId, ClassDecl>,
}

impl RegistryBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or reopen) the declaration of class `T`.
    pub fn class<T: ?Sized + 'static>(&mut self) -> ClassBuilder<'_> {
        self.class_id(ClassId::of::<T>())
    }

    /// Open (or reopen) the declaration of `class`.
    pub fn class_id(&mut self, class: ClassId) -> ClassBuilder<'_> {
        ClassBuilder {
            decl: self.classes.entry(class).or_default(),
        }
    }

    /// Mark `key` observed on `class`. Re-registering is a no-op.
    pub fn register(&mut self, class: ClassId, key: PropertyKey) -> &mut Self {
        self.class_id(class).observe(key);
        self
    }

    /// Mark `key` observed and attribute-bridged on `class`.
    pub fn register_attribute(&mut self, class: ClassId, key: PropertyKey) -> &mut Self {
        self.class_id(class).attribute(key);
        self
    }

    /// Validate the class graph and freeze the registry.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnknownParent`] if a parent class was never declared.
    /// - [`RegistryError::InheritanceCycle`] if parent links form a loop.
    pub fn build(self) -> Result<PropertyRegistry, RegistryError> {
        let mut resolved = IndexMap::with_capacity(self.classes.len());
        for &class in self.classes.keys() {
            let chain = self.ancestry(class)?;
            let mut entry = ResolvedClass::default();
            for ancestor in chain.iter().rev() {
                let decl = &self.classes[ancestor];
                for key in &decl.observed {
                    if !entry.observed.contains(key) {
                        entry.observed.push(*key);
                    }
                }
                for key in &decl.attributes {
                    if !entry.attributes.contains(key) {
                        entry.attributes.push(*key);
                    }
                }
            }
            resolved.insert(class, entry);
        }
        Ok(PropertyRegistry {
            classes: Arc::new(resolved),
        })
    }

    /// `class` followed by its ancestors, nearest first.
    fn ancestry(&self, class: ClassId) -> Result<Vec<ClassId>, RegistryError> {
        let mut chain = vec![class];
        let mut seen = AHashSet::new();
        seen.insert(class);
        let mut current = class;
        while let Some(parent) = self.classes.get(&current).and_then(|d| d.parent) {
            if !self.classes.contains_key(&parent) {
                return Err(RegistryError::UnknownParent {
                    class: current,
                    parent,
                });
            }
            if !seen.insert(parent) {
                return Err(RegistryError::InheritanceCycle { class: parent });
            }
            chain.push(parent);
            current = parent;
        }
        Ok(chain)
    }
}

/// Declaration handle for one class, returned by [`RegistryBuilder::class`].
pub struct ClassBuilder<'a> {
    decl: &'a mut ClassDecl,
}

impl ClassBuilder<'_> {
    /// Inherit the declarations of class `P`.
    pub fn extends<P: ?Sized + 'static>(self) -> Self {
        self.decl.parent = Some(ClassId::of::<P>());
        self
    }

    /// Inherit the declarations of `parent`.
    pub fn extends_id(self, parent: ClassId) -> Self {
        self.decl.parent = Some(parent);
        self
    }

    /// Mark `key` observed.
    pub fn observe(self, key: PropertyKey) -> Self {
        self.decl.observed.insert(key);
        self
    }

    /// Mark `key` observed and mirrored to a host attribute of the same name.
    pub fn attribute(self, key: PropertyKey) -> Self {
        self.decl.observed.insert(key);
        self.decl.attributes.insert(key);
        self
    }
}

#[derive(Debug, Default)]
struct ResolvedClass {
    observed: Vec<PropertyKey>,
    attributes: Vec<PropertyKey>,
}

/// Frozen, shareable registry of observed and attribute-bridged keys.
///
/// Cloning shares the underlying table.
#[derive(Clone, Debug, Default)]
pub struct PropertyRegistry {
    classes: Arc<IndexMap<ClassId, ResolvedClass>>,
}

impl PropertyRegistry {
    /// Start declaring classes.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Observed keys of `class`, including inherited ones. Empty for
    /// undeclared classes.
    #[must_use]
    pub fn observed_keys_of(&self, class: ClassId) -> &[PropertyKey] {
        self.classes
            .get(&class)
            .map(|c| c.observed.as_slice())
            .unwrap_or(&[])
    }

    /// Attribute-bridged keys of `class`, including inherited ones.
    #[must_use]
    pub fn attribute_keys_of(&self, class: ClassId) -> &[PropertyKey] {
        self.classes
            .get(&class)
            .map(|c| c.attributes.as_slice())
            .unwrap_or(&[])
    }

    /// Whether `key` is observed on `class`.
    #[must_use]
    pub fn is_observed(&self, class: ClassId, key: &str) -> bool {
        self.observed_keys_of(class).iter().any(|k| *k == key)
    }

    /// Whether `key` is attribute-bridged on `class`.
    #[must_use]
    pub fn is_attribute(&self, class: ClassId, key: &str) -> bool {
        self.attribute_keys_of(class).iter().any(|k| *k == key)
    }

    /// Whether `class` was declared.
    #[must_use]
    pub fn contains_class(&self, class: ClassId) -> bool {
        self.classes.contains_key(&class)
    }

    /// Number of declared classes.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}
