//! Sync engine configuration.
//!
//! Provides `EngineConfig`, the timing knobs shared by every front-end: the
//! autosave quiet period, the self-suppression window after a save, and the
//! polling interval used when the file watcher falls back to polling.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::normalize_text_option;

const DEFAULT_QUIET_PERIOD_MS: u64 = 1000;
const DEFAULT_SUPPRESSION_WINDOW_MS: u64 = 2000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Environment variable overriding `quiet_period_ms`.
pub const QUIET_PERIOD_ENV: &str = "TABULA_QUIET_PERIOD_MS";
/// Environment variable overriding `suppression_window_ms`.
pub const SUPPRESSION_WINDOW_ENV: &str = "TABULA_SUPPRESSION_WINDOW_MS";
/// Environment variable overriding `poll_interval_ms`.
pub const POLL_INTERVAL_ENV: &str = "TABULA_POLL_INTERVAL_MS";

/// Timing configuration for the sync engine and file store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    /// Debounce delay between the last local edit and the autosave.
    pub quiet_period_ms: u64,
    /// How long after a save change notifications are treated as our own.
    pub suppression_window_ms: u64,
    /// Poll interval for file watchers without native change events.
    pub poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: DEFAULT_QUIET_PERIOD_MS,
            suppression_window_ms: DEFAULT_SUPPRESSION_WINDOW_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    #[must_use]
    pub const fn suppression_window(&self) -> Duration {
        Duration::from_millis(self.suppression_window_ms)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parse a JSON config payload. Missing fields keep their defaults.
    pub fn from_json(payload: &str) -> Result<Self, String> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| format!("invalid engine config JSON: {error}"))?;
        config.validate()
    }

    /// Load a config file, or the defaults when it does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        Self::from_json(&raw).map_err(|error| format!("{} ({})", error, path.display()))
    }

    /// Apply `TABULA_*_MS` overrides through `lookup` (usually `std::env::var`).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&str, &mut u64); 3] = [
            (QUIET_PERIOD_ENV, &mut self.quiet_period_ms),
            (SUPPRESSION_WINDOW_ENV, &mut self.suppression_window_ms),
            (POLL_INTERVAL_ENV, &mut self.poll_interval_ms),
        ];

        for (key, field) in fields {
            let Some(raw) = normalize_text_option(lookup(key)) else {
                continue;
            };
            *field = raw
                .parse::<u64>()
                .map_err(|_| format!("{key} must be a whole number of milliseconds, got '{raw}'"))?;
        }

        self.validate()
    }

    /// Reject zero durations.
    pub fn validate(self) -> Result<Self, String> {
        let checks = [
            ("quiet_period_ms", self.quiet_period_ms),
            ("suppression_window_ms", self.suppression_window_ms),
            ("poll_interval_ms", self.poll_interval_ms),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(format!("engine config field '{field}' must be greater than 0"));
            }
        }
        Ok(self)
    }
}
