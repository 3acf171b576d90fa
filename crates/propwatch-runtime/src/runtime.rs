#![forbid(unsafe_code)]

//! Single-threaded deferred-task scheduler.
//!
//! A [`Runtime`] owns a FIFO queue of tasks that run *after* the current
//! synchronous turn. Writes to observed properties never deliver anything
//! themselves; they queue at most one flush per instance and at most one
//! effect run per turn, and the host drives delivery by calling
//! [`Runtime::tick`] at the end of each turn of its event loop.
//!
//! # Turn model
//!
//! - Everything the host does between two ticks is one turn.
//! - `tick()` runs exactly the tasks that were queued when it started.
//!   Tasks queued while it runs (for example, a flush armed by a write made
//!   inside a listener) wait for the next `tick()`.
//! - [`Runtime::run_until_idle`] ticks until the queue is empty, bounded by
//!   [`RuntimeConfig::max_ticks`].
//!
//! # Failure isolation
//!
//! Every listener, effect, and queued task runs under `catch_unwind` (unless
//! [`RuntimeConfig::catch_panics`] is off). A panic becomes a
//! [`CallbackError`] handed to the error reporter and delivery continues with
//! the next callback. The default reporter logs at `error` level.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use propwatch_runtime::Runtime;
//!
//! let rt = Runtime::new();
//! let ran = Rc::new(Cell::new(false));
//! let flag = Rc::clone(&ran);
//! rt.queue_microtask(move || flag.set(true));
//!
//! assert!(!ran.get());
//! assert_eq!(rt.tick(), 1);
//! assert!(ran.get());
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{error, trace};

use crate::config::RuntimeConfig;
use crate::effect::EffectRegistry;
use crate::error::{CallbackError, CallbackOrigin, RuntimeError};

type Task = Box<dyn FnOnce()>;
type Reporter = Rc<dyn Fn(&CallbackError)>;

thread_local! {
    static CURRENT: Runtime = Runtime::with_config(RuntimeConfig::from_env());
}

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    queue: RefCell<VecDeque<Task>>,
    pub(crate) effects: EffectRegistry,
    reporter: RefCell<Option<Reporter>>,
    ticks: Cell<u64>,
}

/// Handle to a deferred-task scheduler and its effect registry.
///
/// Cloning shares the same scheduler.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create an isolated runtime with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create an isolated runtime.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                queue: RefCell::new(VecDeque::new()),
                effects: EffectRegistry::default(),
                reporter: RefCell::new(None),
                ticks: Cell::new(0),
            }),
        }
    }

    /// The thread's shared runtime, configured from the environment on
    /// first use.
    #[must_use]
    pub fn current() -> Self {
        CURRENT.with(Clone::clone)
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether `self` and `other` share one scheduler.
    #[must_use]
    pub fn same_runtime(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Queue `task` to run on the next tick.
    pub fn queue_microtask(&self, task: impl FnOnce() + 'static) {
        self.inner.queue.borrow_mut().push_back(Box::new(task));
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.queue.borrow().is_empty()
    }

    /// Ticks performed so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.inner.ticks.get()
    }

    /// End the current turn: run every task queued before this call, in
    /// order. Returns the number of tasks run.
    pub fn tick(&self) -> usize {
        let due = self.pending_tasks();
        self.inner.ticks.set(self.inner.ticks.get() + 1);
        if due > 0 {
            trace!(tick = self.inner.ticks.get(), tasks = due, "tick");
        }
        for _ in 0..due {
            let task = self.inner.queue.borrow_mut().pop_front();
            let Some(task) = task else { break };
            self.guarded(CallbackOrigin::Task, task);
        }
        due
    }

    /// Tick until the queue is empty. Returns the total number of tasks run.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::TickLimitExceeded`] when work is still queued after
    /// [`RuntimeConfig::max_ticks`] ticks; the remaining tasks stay queued.
    pub fn run_until_idle(&self) -> Result<usize, RuntimeError> {
        let limit = self.inner.config.max_ticks;
        let mut ran = 0;
        for _ in 0..limit {
            if self.is_idle() {
                return Ok(ran);
            }
            ran += self.tick();
        }
        if self.is_idle() {
            Ok(ran)
        } else {
            Err(RuntimeError::TickLimitExceeded { limit })
        }
    }

    /// Route callback failures to `reporter` instead of the log.
    pub fn set_error_reporter(&self, reporter: impl Fn(&CallbackError) + 'static) {
        *self.inner.reporter.borrow_mut() = Some(Rc::new(reporter));
    }

    /// Restore the default logging reporter.
    pub fn clear_error_reporter(&self) {
        self.inner.reporter.borrow_mut().take();
    }

    /// Hand `err` to the installed reporter, or log it.
    pub fn report(&self, err: &CallbackError) {
        let reporter = self.inner.reporter.borrow().clone();
        match reporter {
            Some(reporter) => reporter(err),
            None => error!(origin = %err.origin, message = %err.message, "callback panicked"),
        }
    }

    /// Run `f`, converting a panic into a report.
    pub(crate) fn guarded(&self, origin: CallbackOrigin, f: impl FnOnce()) {
        if !self.inner.config.catch_panics {
            f();
            return;
        }
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
            self.report(&CallbackError::from_panic(origin, &*payload));
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("pending_tasks", &self.pending_tasks())
            .field("effects", &self.effect_count())
            .field("ticks", &self.tick_count())
            .finish()
    }
}
