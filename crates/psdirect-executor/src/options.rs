//! Runner configuration.

use std::collections::BTreeMap;

/// Keeps staged scripts on disk and implies verbose logging.
pub const DEBUG_ENV: &str = "PSDIRECT_DEBUG";
/// Logs interpreter invocations and captured output.
pub const VERBOSE_ENV: &str = "PSDIRECT_VERBOSE";
/// Explicit interpreter name or path.
pub const INTERPRETER_ENV: &str = "PSDIRECT_POWERSHELL";

/// Options for [`crate::PowerShellRunner`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Leave staged scripts on disk after use.
    pub keep_scripts: bool,
    /// Log invocations and captured output.
    pub verbose: bool,
    /// Interpreter to use instead of searching PATH.
    pub interpreter: Option<String>,
    /// Environment overrides for the interpreter process.
    pub env: BTreeMap<String, String>,
}

impl RunnerOptions {
    /// Read options from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let set = |key: &str| lookup(key).is_some_and(|v| !v.is_empty());
        let keep_scripts = set(DEBUG_ENV);
        Self {
            keep_scripts,
            verbose: keep_scripts || set(VERBOSE_ENV),
            interpreter: lookup(INTERPRETER_ENV).filter(|v| !v.trim().is_empty()),
            env: BTreeMap::new(),
        }
    }

    /// Add an environment override.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}
