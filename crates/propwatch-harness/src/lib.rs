#![forbid(unsafe_code)]

//! Test harness for propwatch.
//!
//! - [`TestElement`]: an in-memory [`HostElement`](propwatch_runtime::HostElement)
//!   that fires attribute-changed callbacks the way a DOM element does.
//! - [`ErrorLog`]: collects callback failures routed through a runtime's
//!   error reporter.
//! - [`components`]: reference components built only on the public API.
//! - [`init_test_logging`]: `RUST_LOG`-driven tracing output for tests.

pub mod components;
pub mod element;

use std::cell::RefCell;
use std::rc::Rc;

use propwatch_runtime::{CallbackError, Runtime};
use tracing_subscriber::EnvFilter;

pub use element::{AttributeWrite, TestElement};

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `warn`).
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Shared list of callback failures reported by a runtime.
#[derive(Clone, Debug, Default)]
pub struct ErrorLog {
    errors: Rc<RefCell<Vec<CallbackError>>>,
}

impl ErrorLog {
    /// Route `runtime`'s callback failures into a new log.
    #[must_use]
    pub fn attach(runtime: &Runtime) -> Self {
        let log = Self::default();
        let sink = Rc::clone(&log.errors);
        runtime.set_error_reporter(move |err| sink.borrow_mut().push(err.clone()));
        log
    }

    /// Failures recorded so far.
    #[must_use]
    pub fn errors(&self) -> Vec<CallbackError> {
        self.errors.borrow().clone()
    }

    /// Number of failures recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.borrow().len()
    }

    /// True when nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.borrow().is_empty()
    }

    /// Remove and return every recorded failure.
    pub fn take(&self) -> Vec<CallbackError> {
        std::mem::take(&mut *self.errors.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_log_collects_task_panics() {
        init_test_logging();
        let rt = Runtime::new();
        let log = ErrorLog::attach(&rt);
        rt.queue_microtask(|| panic!("boom"));
        rt.tick();

        assert_eq!(log.len(), 1);
        assert!(log.errors()[0].message.contains("boom"));
        assert_eq!(log.take().len(), 1);
        assert!(log.is_empty());
    }
}
