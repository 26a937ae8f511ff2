//! Instance settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StateError};

/// Default instance name used in traces.
pub const DEFAULT_NAME: &str = "MyStore";

/// Default limit on nested mutation passes.
pub const DEFAULT_MAX_PASS_DEPTH: usize = 256;

/// How much of each mutation cycle is traced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Nothing.
    #[default]
    None,
    /// Cycle markers, applied deltas, recomputed values, triggered watchers.
    Diff,
    /// Everything in `Diff` plus full state snapshots.
    All,
}

impl LogLevel {
    /// Whether any cycle tracing happens.
    pub fn is_enabled(self) -> bool {
        self != LogLevel::None
    }

    /// Whether previous/new state snapshots are traced.
    pub fn shows_snapshots(self) -> bool {
        self == LogLevel::All
    }
}

impl FromStr for LogLevel {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(LogLevel::None),
            "diff" => Ok(LogLevel::Diff),
            "all" => Ok(LogLevel::All),
            other => Err(StateError::SerializationError(format!(
                "unknown log level `{other}`, expected none, diff or all"
            ))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::None => "none",
            LogLevel::Diff => "diff",
            LogLevel::All => "all",
        })
    }
}

/// Settings of one reactive store instance. Read-only after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Name shown in traces.
    pub name: String,
    /// Cycle tracing verbosity.
    pub log_level: LogLevel,
    /// Fail with [`StateError::PassDepthExceeded`] once passes nest deeper
    /// than this. `None` removes the limit.
    pub max_pass_depth: Option<usize>,
}

impl Settings {
    /// Settings with the given instance name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the tracing level.
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Set the nesting limit for pipeline passes. `None` removes it.
    pub fn with_max_pass_depth(mut self, max_pass_depth: Option<usize>) -> Self {
        self.max_pass_depth = max_pass_depth;
        self
    }

    /// Parse settings from JSON; absent fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Into::into)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            log_level: LogLevel::None,
            max_pass_depth: Some(DEFAULT_MAX_PASS_DEPTH),
        }
    }
}
