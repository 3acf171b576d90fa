#![forbid(unsafe_code)]

//! Error types for the runtime layer.

use std::any::Any;
use std::fmt;

use propwatch_core::{ClassId, PropertyKey};
use thiserror::Error;

use crate::effect::EffectId;

/// Failures while binding properties to a tracker or bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// The key is not observed on the tracker's class.
    #[error("property `{key}` is not observed on `{class}`")]
    NotObserved {
        /// Class of the tracker.
        class: ClassId,
        /// Requested key.
        key: PropertyKey,
    },
    /// The key is observed but not attribute-bridged on the class.
    #[error("property `{key}` is not attribute-bridged on `{class}`")]
    NotAttribute {
        /// Class of the tracker.
        class: ClassId,
        /// Requested key.
        key: PropertyKey,
    },
    /// The key already has a slot on this instance.
    #[error("property `{key}` is already bound on this `{class}` instance")]
    AlreadyBound {
        /// Class of the tracker.
        class: ClassId,
        /// Requested key.
        key: PropertyKey,
    },
    /// The property belongs to a different instance than the bridge.
    #[error("property `{key}` belongs to another instance")]
    ForeignProperty {
        /// Requested key.
        key: PropertyKey,
    },
}

/// Scheduler-level failures.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// [`run_until_idle`](crate::Runtime::run_until_idle) gave up with work
    /// still queued, usually because a callback keeps re-triggering itself.
    #[error("task queue still busy after {limit} ticks")]
    TickLimitExceeded {
        /// Configured tick bound.
        limit: usize,
    },
    /// Malformed configuration document.
    #[cfg(feature = "config")]
    #[error("invalid runtime config: {0}")]
    Config(#[from] toml::de::Error),
}

/// What kind of callback failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOrigin {
    /// A property-changed listener of an instance.
    Listener {
        /// Class of the instance.
        class: ClassId,
        /// Registration index of the listener on the instance.
        index: usize,
    },
    /// A registered effect.
    Effect(EffectId),
    /// A task queued with [`queue_microtask`](crate::Runtime::queue_microtask).
    Task,
}

impl fmt::Display for CallbackOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listener { class, index } => {
                write!(f, "property-changed listener #{index} of `{class}`")
            }
            Self::Effect(id) => write!(f, "{id}"),
            Self::Task => f.write_str("queued task"),
        }
    }
}

/// A callback panicked while the runtime was delivering to it.
///
/// Delivery to the remaining callbacks of the same flush or tick continues;
/// the error goes to the runtime's reporter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{origin} panicked: {message}")]
pub struct CallbackError {
    /// The failing callback.
    pub origin: CallbackOrigin,
    /// Panic message, when the payload was a string.
    pub message: String,
}

impl CallbackError {
    pub(crate) fn from_panic(origin: CallbackOrigin, payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self { origin, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;

    #[test]
    fn bind_error_messages_name_class_and_key() {
        let err = BindError::NotObserved {
            class: ClassId::of::<Widget>(),
            key: "size",
        };
        assert_eq!(err.to_string(), "property `size` is not observed on `Widget`");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        let err = CallbackError::from_panic(CallbackOrigin::Task, &*boxed);
        assert_eq!(err.message, "boom");
        assert_eq!(err.to_string(), "queued task panicked: boom");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let err = CallbackError::from_panic(CallbackOrigin::Task, &*boxed);
        assert_eq!(err.message, "owned");

        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        let err = CallbackError::from_panic(CallbackOrigin::Task, &*boxed);
        assert_eq!(err.message, "non-string panic payload");
    }
}
