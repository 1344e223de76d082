//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::AgentConfig;
use crate::error::AgentError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the global file and environment.
    pub fn load() -> Result<AgentConfig, AgentError> {
        let config = MergeService::load(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with an explicit file layered over the global one.
    pub fn load_from_file(path: &Path) -> Result<AgentConfig, AgentError> {
        if !path.exists() {
            return Err(AgentError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config = MergeService::load(Some(path))?;
        config.validate()?;
        Ok(config)
    }

    /// Create default configuration.
    pub fn default() -> AgentConfig {
        AgentConfig::default()
    }
}
