//! XDG Base Directory utilities for agent configuration and state.

use crate::error::AgentError;
use std::path::PathBuf;

/// Get XDG config home directory
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise defaults to `$HOME/.config`
pub fn config_home() -> Result<PathBuf, AgentError> {
    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg_config_home.is_empty() {
            return Ok(PathBuf::from(xdg_config_home));
        }
    }

    let home = std::env::var("HOME").map_err(|_| {
        AgentError::ConfigError(
            "Could not determine XDG config home directory (HOME not set)".to_string(),
        )
    })?;

    Ok(PathBuf::from(home).join(".config"))
}

/// Path of the global config file: `$XDG_CONFIG_HOME/mibd/config.toml`
pub fn global_config_path() -> Result<PathBuf, AgentError> {
    Ok(config_home()?.join("mibd").join("config.toml"))
}

/// Default preference file: `$XDG_CONFIG_HOME/mibd/preferences.toml`
pub fn default_preferences_path() -> Result<PathBuf, AgentError> {
    Ok(config_home()?.join("mibd").join("preferences.toml"))
}
