//! Agent configuration
//!
//! Layered with the `config` crate: serde defaults, then the global config file, then
//! an explicit file, then `MIBD__*` environment variables.

pub mod facade;
pub mod merge;
pub mod paths;
pub mod preferences;
pub mod sources;

pub use facade::ConfigLoader;
pub use preferences::{MemoryPreferences, PreferenceStore, TomlPreferences};

use crate::error::AgentError;
use crate::logging::LoggingConfig;
use crate::oid::Oid;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Preference key for the writable contact object
pub const KEY_SYSTEM_CONTACT: &str = "system_contact";
/// Preference key for the writable name object
pub const KEY_SYSTEM_NAME: &str = "system_name";
/// Preference key for the writable location object
pub const KEY_SYSTEM_LOCATION: &str = "system_location";

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1161
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_get_community() -> String {
    "blackjack".to_string()
}

fn default_set_community() -> String {
    "blackjack007".to_string()
}

fn default_trap_destination() -> String {
    "10.11.139.83".to_string()
}

fn default_view_root() -> String {
    String::new()
}

fn default_contact() -> String {
    "IT Support (contact@company.com)".to_string()
}

fn default_location() -> String {
    "Location not configured".to_string()
}

/// Listener and lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    /// Address to bind the responder on
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// UDP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Registry context the modules are registered into
    #[serde(default)]
    pub context: String,

    /// Delay between stop and start during a restart, letting the transport release the port
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Register the in-memory sample scalar
    #[serde(default)]
    pub sample_object: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            context: String::new(),
            settle_delay_ms: default_settle_delay_ms(),
            sample_object: false,
        }
    }
}

/// Community strings and the view they grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityConfig {
    #[serde(default = "default_get_community")]
    pub get: String,

    #[serde(default = "default_set_community")]
    pub set: String,

    #[serde(default = "default_get_community")]
    pub trap: String,

    /// Where notifications would be sent. Carried for completeness; the agent emits none.
    #[serde(default = "default_trap_destination")]
    pub trap_destination: String,

    /// Root of the read/write/notify views, dotted. Empty covers the whole tree.
    #[serde(default = "default_view_root")]
    pub view_root: String,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            get: default_get_community(),
            set: default_set_community(),
            trap: default_get_community(),
            trap_destination: default_trap_destination(),
            view_root: default_view_root(),
        }
    }
}

/// Defaults for the writable system objects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_contact")]
    pub contact: String,

    /// None derives a name from the device model and serial
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_location")]
    pub location: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            contact: default_contact(),
            name: None,
            location: default_location(),
        }
    }
}

/// Where writable object values are kept
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferencesConfig {
    /// TOML file; None keeps preferences in memory only
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Complete agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub communities: CommunityConfig,

    #[serde(default)]
    pub system: SystemConfig,

    #[serde(default)]
    pub preferences: PreferencesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AgentConfig {
    /// Socket address the responder binds
    pub fn listen_addr(&self) -> Result<SocketAddr, AgentError> {
        let ip: IpAddr = self.agent.bind_address.trim().parse().map_err(|e| {
            AgentError::ConfigError(format!(
                "Invalid bind address {:?}: {}",
                self.agent.bind_address, e
            ))
        })?;
        Ok(SocketAddr::new(ip, self.agent.port))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.agent.settle_delay_ms)
    }

    /// Subtree every community may see. Empty means the whole tree.
    pub fn view_root(&self) -> Result<Oid, AgentError> {
        let text = self.communities.view_root.trim();
        if text.is_empty() {
            return Ok(Oid::root());
        }
        Oid::parse(text).map_err(|e| {
            AgentError::ConfigError(format!(
                "Invalid view root {:?}: {}",
                self.communities.view_root, e
            ))
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.agent.port == 0 {
            return Err(AgentError::ConfigError(
                "Port must be between 1 and 65535".to_string(),
            ));
        }
        if self.communities.get.trim().is_empty() {
            return Err(AgentError::ConfigError(
                "Get community cannot be empty".to_string(),
            ));
        }
        self.listen_addr()?;
        self.view_root()?;
        Ok(())
    }

    /// Open the preference store this configuration names
    pub fn open_preferences(&self) -> Result<Arc<dyn PreferenceStore>, AgentError> {
        match &self.preferences.file {
            Some(path) => Ok(Arc::new(TomlPreferences::open(path)?)),
            None => Ok(Arc::new(MemoryPreferences::new())),
        }
    }
}
