//! Engine configuration for the CLI.

use std::path::{Path, PathBuf};

use tabula_core::EngineConfig;

const CONFIG_DIR_NAME: &str = "tabula";
const CONFIG_FILE_NAME: &str = "config.json";

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load the engine config, then apply `TABULA_*_MS` environment overrides.
///
/// An explicit path must exist; the default path is optional.
pub fn load_engine_config(explicit: Option<&Path>) -> Result<EngineConfig, String> {
    load_engine_config_with(explicit, |key| std::env::var(key).ok())
}

pub fn load_engine_config_with<F>(explicit: Option<&Path>, lookup: F) -> Result<EngineConfig, String>
where
    F: Fn(&str) -> Option<String>,
{
    let base = match explicit {
        Some(path) if !path.exists() => {
            return Err(format!("Config file not found: {}", path.display()));
        }
        Some(path) => EngineConfig::load_from_path(path)?,
        None => match default_config_path() {
            Some(path) => EngineConfig::load_from_path(&path)?,
            None => EngineConfig::default(),
        },
    };

    let config = base.with_overrides(lookup)?;
    tracing::debug!(
        "Engine config: quiet period {}ms, suppression window {}ms, poll interval {}ms",
        config.quiet_period_ms,
        config.suppression_window_ms,
        config.poll_interval_ms
    );
    Ok(config)
}
