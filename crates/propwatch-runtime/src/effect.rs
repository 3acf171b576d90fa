#![forbid(unsafe_code)]

//! Process-wide effects re-run once per turn in which any observed property
//! changed.
//!
//! # Invariants
//!
//! 1. However many observed writes happen in one turn, across however many
//!    instances, each registered effect runs at most once for that turn.
//! 2. The set of effects to run is fixed when the run is armed; of that set,
//!    only effects still registered at invocation time run, in registration
//!    order.
//! 3. The arming flag is cleared before the first effect runs, so writes made
//!    by an effect arm a run on the next tick, never the current one.
//! 4. Disposing an effect (including from inside another effect) never
//!    panics and prevents any later invocation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::error::CallbackOrigin;
use crate::runtime::{Runtime, RuntimeInner};

/// Identity of a registered effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect#{}", self.0)
    }
}

type EffectFn = Rc<dyn Fn()>;

/// Ordered effect table plus the per-turn arming flag.
#[derive(Default)]
pub(crate) struct EffectRegistry {
    entries: RefCell<Vec<(EffectId, EffectFn)>>,
    next_id: Cell<u64>,
    armed: Cell<bool>,
}

impl EffectRegistry {
    fn insert(&self, callback: EffectFn) -> EffectId {
        let id = EffectId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.entries.borrow_mut().push((id, callback));
        id
    }

    fn remove(&self, id: EffectId) -> bool {
        // The removed callback may own other effects; drop it after the
        // borrow ends.
        let removed = {
            let mut entries = self.entries.borrow_mut();
            let index = entries.iter().position(|(entry, _)| *entry == id);
            index.map(|index| entries.remove(index))
        };
        removed.is_some()
    }

    fn lookup(&self, id: EffectId) -> Option<EffectFn> {
        self.entries
            .borrow()
            .iter()
            .find(|(entry, _)| *entry == id)
            .map(|(_, callback)| Rc::clone(callback))
    }

    fn snapshot(&self) -> Vec<EffectId> {
        self.entries.borrow().iter().map(|(id, _)| *id).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed.get()
    }
}

impl Runtime {
    /// Register `callback` to run once after every turn containing an
    /// observed write.
    ///
    /// The returned [`Effect`] removes the callback when disposed or dropped.
    #[must_use = "dropping the Effect unregisters the callback immediately"]
    pub fn register_effect(&self, callback: impl Fn() + 'static) -> Effect {
        let id = self.inner.effects.insert(Rc::new(callback));
        trace!(effect = %id, "effect registered");
        Effect {
            id,
            runtime: Some(Rc::downgrade(&self.inner)),
        }
    }

    /// Number of registered effects.
    #[must_use]
    pub fn effect_count(&self) -> usize {
        self.inner.effects.len()
    }

    /// Whether an effect run is queued for the next tick.
    #[must_use]
    pub fn effects_armed(&self) -> bool {
        self.inner.effects.is_armed()
    }

    /// Queue an effect run for the next tick unless one is already queued.
    ///
    /// Called for every observed write that changed a value.
    pub(crate) fn arm_effects(&self) {
        let effects = &self.inner.effects;
        if effects.is_armed() || effects.len() == 0 {
            return;
        }
        effects.armed.set(true);
        let snapshot = effects.snapshot();
        trace!(effects = snapshot.len(), "effect run armed");
        let weak = Rc::downgrade(&self.inner);
        self.queue_microtask(move || {
            if let Some(inner) = weak.upgrade() {
                Runtime { inner }.run_effects(&snapshot);
            }
        });
    }

    fn run_effects(&self, snapshot: &[EffectId]) {
        self.inner.effects.armed.set(false);
        debug!(effects = snapshot.len(), "running effects");
        for &id in snapshot {
            let Some(callback) = self.inner.effects.lookup(id) else {
                trace!(effect = %id, "skipping disposed effect");
                continue;
            };
            self.guarded(CallbackOrigin::Effect(id), || callback());
        }
    }
}

/// Registration handle returned by [`Runtime::register_effect`].
///
/// Dropping the handle unregisters the effect. Use [`forget`](Self::forget)
/// to keep the effect for the lifetime of the runtime.
#[must_use = "dropping the Effect unregisters the callback immediately"]
pub struct Effect {
    id: EffectId,
    runtime: Option<Weak<RuntimeInner>>,
}

impl Effect {
    /// Identity of the registered callback.
    #[must_use]
    pub fn id(&self) -> EffectId {
        self.id
    }

    /// Unregister the callback now.
    pub fn dispose(self) {
        drop(self);
    }

    /// Keep the callback registered for the lifetime of the runtime.
    pub fn forget(mut self) {
        self.runtime = None;
    }

    /// Whether the callback is still registered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.runtime
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|inner| inner.effects.lookup(self.id).is_some())
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        if let Some(inner) = self.runtime.take().and_then(|weak| weak.upgrade()) {
            if inner.effects.remove(self.id) {
                trace!(effect = %self.id, "effect disposed");
            }
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() + 'static) {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        (count, move || c.set(c.get() + 1))
    }

    #[test]
    fn armed_effect_runs_once_per_tick() {
        let rt = Runtime::new();
        let (count, cb) = counter();
        let _effect = rt.register_effect(cb);

        rt.arm_effects();
        rt.arm_effects();
        rt.arm_effects();
        assert_eq!(count.get(), 0, "effects never run synchronously");
        assert_eq!(rt.pending_tasks(), 1);

        rt.tick();
        assert_eq!(count.get(), 1);
        assert!(!rt.effects_armed());

        rt.tick();
        assert_eq!(count.get(), 1, "no write, no run");
    }

    #[test]
    fn effects_run_in_registration_order() {
        let rt = Runtime::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let effects: Vec<Effect> = (0..3)
            .map(|n| {
                let log = Rc::clone(&log);
                rt.register_effect(move || log.borrow_mut().push(n))
            })
            .collect();

        rt.arm_effects();
        rt.tick();
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        drop(effects);
    }

    #[test]
    fn dispose_before_tick_prevents_run() {
        let rt = Runtime::new();
        let (count, cb) = counter();
        let effect = rt.register_effect(cb);

        rt.arm_effects();
        effect.dispose();
        rt.tick();
        assert_eq!(count.get(), 0);
        assert_eq!(rt.effect_count(), 0);
    }

    #[test]
    fn drop_unregisters() {
        let rt = Runtime::new();
        {
            let _effect = rt.register_effect(|| {});
            assert_eq!(rt.effect_count(), 1);
        }
        assert_eq!(rt.effect_count(), 0);
    }

    #[test]
    fn forget_keeps_registration() {
        let rt = Runtime::new();
        let (count, cb) = counter();
        rt.register_effect(cb).forget();
        assert_eq!(rt.effect_count(), 1);

        rt.arm_effects();
        rt.tick();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn effects_registered_after_arming_wait_for_next_run() {
        let rt = Runtime::new();
        let (first, cb1) = counter();
        let _e1 = rt.register_effect(cb1);
        rt.arm_effects();

        let (second, cb2) = counter();
        let _e2 = rt.register_effect(cb2);
        rt.tick();
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 0);

        rt.arm_effects();
        rt.tick();
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn effect_disposing_a_later_effect_skips_it() {
        let rt = Runtime::new();
        let victim: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&victim);
        let _killer = rt.register_effect(move || {
            slot.borrow_mut().take();
        });
        let (count, cb) = counter();
        *victim.borrow_mut() = Some(rt.register_effect(cb));

        rt.arm_effects();
        rt.tick();
        assert_eq!(count.get(), 0);
        assert_eq!(rt.effect_count(), 1);
    }

    #[test]
    fn no_arming_without_effects() {
        let rt = Runtime::new();
        rt.arm_effects();
        assert!(rt.is_idle());
        assert!(!rt.effects_armed());
    }

    #[test]
    fn is_registered_tracks_disposal() {
        let rt = Runtime::new();
        let effect = rt.register_effect(|| {});
        assert!(effect.is_registered());
        assert_eq!(effect.id().to_string(), "effect#0");
        drop(rt);
        assert!(!effect.is_registered());
    }
}
