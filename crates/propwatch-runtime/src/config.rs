#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! Defaults suit tests and interactive hosts. [`RuntimeConfig::from_env`]
//! reads overrides from the environment; with the `config` feature a TOML
//! document can be loaded as well:
//!
//! ```toml
//! max_ticks = 64
//! catch_panics = true
//! ```

use std::env;

use tracing::warn;

/// Environment variable overriding [`RuntimeConfig::max_ticks`].
pub const ENV_MAX_TICKS: &str = "PROPWATCH_MAX_TICKS";
/// Environment variable overriding [`RuntimeConfig::catch_panics`].
pub const ENV_CATCH_PANICS: &str = "PROPWATCH_CATCH_PANICS";

/// Tunables for a [`Runtime`](crate::Runtime).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Deserialize))]
#[cfg_attr(feature = "config", serde(default, deny_unknown_fields))]
pub struct RuntimeConfig {
    /// Upper bound on ticks performed by one
    /// [`run_until_idle`](crate::Runtime::run_until_idle) call.
    pub max_ticks: usize,
    /// Catch panics from listeners, effects, and queued tasks and send them to
    /// the error reporter. When `false` a panic unwinds out of
    /// [`tick`](crate::Runtime::tick).
    pub catch_panics: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_ticks: 1024,
            catch_panics: true,
        }
    }
}

impl RuntimeConfig {
    /// Set [`max_ticks`](Self::max_ticks).
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: usize) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Set [`catch_panics`](Self::catch_panics).
    #[must_use]
    pub fn with_catch_panics(mut self, catch_panics: bool) -> Self {
        self.catch_panics = catch_panics;
        self
    }

    /// Defaults overridden by `PROPWATCH_MAX_TICKS` and
    /// `PROPWATCH_CATCH_PANICS`. Unparsable values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let max_ticks = env::var(ENV_MAX_TICKS).ok();
        let catch_panics = env::var(ENV_CATCH_PANICS).ok();
        Self::from_vars(max_ticks.as_deref(), catch_panics.as_deref())
    }

    fn from_vars(max_ticks: Option<&str>, catch_panics: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = max_ticks {
            match raw.trim().parse() {
                Ok(n) => config.max_ticks = n,
                Err(_) => warn!(var = ENV_MAX_TICKS, value = raw, "ignoring invalid value"),
            }
        }
        if let Some(raw) = catch_panics {
            match parse_flag(raw) {
                Some(flag) => config.catch_panics = flag,
                None => warn!(var = ENV_CATCH_PANICS, value = raw, "ignoring invalid value"),
            }
        }
        config
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`](crate::RuntimeError::Config) on
    /// malformed TOML or unknown keys.
    #[cfg(feature = "config")]
    pub fn from_toml_str(source: &str) -> Result<Self, crate::RuntimeError> {
        Ok(toml::from_str(source)?)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
