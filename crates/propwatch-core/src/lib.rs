#![forbid(unsafe_code)]

//! Core data model for propwatch.
//!
//! This crate holds everything that does not schedule work:
//!
//! - [`Change`] / [`Changes`]: the records delivered once per batch.
//! - [`Value`]: the type-erased value carried by a change.
//! - [`PropertyRegistry`]: which keys of which class are observed, and which
//!   of those are mirrored to host attributes.
//! - [`parse_attribute`] / [`AttributeValue`]: attribute text to typed values
//!   and back.
//!
//! The scheduler, trackers, and attribute bridge live in `propwatch-runtime`.

pub mod attribute;
pub mod change;
pub mod registry;
pub mod value;

pub use attribute::{AttrValue, AttributeValue, format_number, parse_attribute};
pub use change::{Change, Changes, PropertyKey};
pub use registry::{ClassBuilder, ClassId, PropertyRegistry, RegistryBuilder, RegistryError};
pub use value::{PropertyValue, Value};
