#![forbid(unsafe_code)]

//! Change records delivered to property-changed listeners.
//!
//! A [`Change`] is the net effect of one or more writes to a single property
//! within one turn. [`Changes`] maps each written key to exactly one record.
//!
//! # Invariants
//!
//! 1. A `Changes` map never holds two records for the same key.
//! 2. Merging a later write into an existing record replaces `value` only;
//!    `previous_value` keeps the value from before the first write of the turn.
//! 3. Iteration order is insertion order, so deliveries are deterministic.

use std::any::Any;

use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::value::Value;

/// Name of an observed property.
pub type PropertyKey = &'static str;

/// Net effect of the writes to one property within a batch.
#[derive(Clone, Debug)]
pub struct Change {
    /// Value after the latest write of the batch.
    pub value: Value,
    /// Value before the first write of the batch.
    pub previous_value: Value,
    /// Whether this is the first delivery ever made for this key on its
    /// instance. Filled in at flush time; `false` while the batch is open.
    pub first_change: bool,
}

impl Change {
    /// Create an open record (`first_change` not yet decided).
    #[must_use]
    pub fn new(value: Value, previous_value: Value) -> Self {
        Self {
            value,
            previous_value,
            first_change: false,
        }
    }

    /// Borrow the new value as `T`.
    #[must_use]
    pub fn value_as<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// Borrow the previous value as `T`.
    #[must_use]
    pub fn previous_as<T: Any>(&self) -> Option<&T> {
        self.previous_value.downcast_ref()
    }
}

/// Insertion-ordered map from property key to its pending or delivered change.
#[derive(Clone, Debug, Default)]
pub struct Changes {
    entries: IndexMap<PropertyKey, Change>,
}

impl Changes {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one write into the batch.
    ///
    /// The first write to `key` inserts a record carrying `previous`; later
    /// writes only move `value` forward.
    pub fn record(&mut self, key: PropertyKey, previous: Value, value: Value) {
        match self.entries.entry(key) {
            Entry::Occupied(mut slot) => slot.get_mut().value = value,
            Entry::Vacant(slot) => {
                slot.insert(Change::new(value, previous));
            }
        }
    }

    /// Look up the record for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Change> {
        self.entries.get(key)
    }

    /// Whether `key` changed in this batch.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// New value of `key` as `T`, if present and of that type.
    #[must_use]
    pub fn value_of<T: Any>(&self, key: &str) -> Option<&T> {
        self.get(key).and_then(|c| c.value_as::<T>())
    }

    /// Changed keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = PropertyKey> + '_ {
        self.entries.keys().copied()
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyKey, &Change)> + '_ {
        self.entries.iter().map(|(k, c)| (*k, c))
    }

    /// Mutable records in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PropertyKey, &mut Change)> + '_ {
        self.entries.iter_mut().map(|(k, c)| (*k, c))
    }

    /// Number of changed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
