#![forbid(unsafe_code)]

//! Turn-batched property change delivery for propwatch.
//!
//! - [`Runtime`]: single-threaded deferred-task queue, drained once per turn
//!   with [`Runtime::tick`]. Also owns the effect registry.
//! - [`Tracker`] / [`Prop`]: per-instance change batching. Writes to a `Prop`
//!   are coalesced into one [`Changes`](propwatch_core::Changes) delivery per
//!   turn.
//! - [`Effect`]: callbacks re-run once after any turn containing an observed
//!   write, anywhere on the runtime.
//! - [`AttributeBridge`]: hydrates properties from host attributes and
//!   mirrors changes back.
//!
//! # Architecture
//!
//! Everything is `Rc<RefCell<..>>`-based and confined to one thread. Queued
//! flushes and effect runs hold `Weak` references, so dropping an instance or
//! runtime cancels its pending work. No `RefCell` borrow is held while a
//! user callback runs, which is what allows listeners and effects to write
//! properties, register or dispose effects, and touch the host re-entrantly.
//!
//! # Invariants
//!
//! 1. A write never runs a listener or effect synchronously.
//! 2. All writes to one instance within a turn produce at most one delivery.
//! 3. All writes within a turn, across all instances, produce at most one
//!    effect run.
//! 4. Work triggered from inside a listener or effect is delivered on a later
//!    tick.
//! 5. A write of the current value records nothing and queues nothing.

pub mod bridge;
pub mod config;
pub mod effect;
pub mod error;
pub mod prop;
pub mod runtime;
pub mod tracker;

pub use bridge::{AttributeBridge, AttributeBridgeBuilder, HostElement, WeakAttributeBridge};
pub use config::RuntimeConfig;
pub use effect::{Effect, EffectId};
pub use error::{BindError, CallbackError, CallbackOrigin, RuntimeError};
pub use prop::Prop;
pub use runtime::Runtime;
pub use tracker::{ListenerId, Tracker};
