//! Command-line interface
//!
//! `run` hosts the agent until interrupted. `get`, `next`, `walk` and `set` are a small
//! JSON-over-UDP manager for poking a running agent. `dump` prints the standard tree
//! with live values without binding anything.

use crate::access::AccessPolicy;
use crate::config::paths::xdg_root::default_preferences_path;
use crate::config::{AgentConfig, ConfigLoader, PreferenceStore};
use crate::error::AgentError;
use crate::lifecycle::LifecycleController;
use crate::mib::modules::Modules;
use crate::mib::registry::MibRegistry;
use crate::mib::value::ScalarValue;
use crate::oid::Oid;
use crate::processor::{Query, RequestProcessor, RequestResult};
use crate::telemetry::{DeviceProbe, LinuxProbe};
use crate::transport::{UdpJsonClient, UdpJsonTransport};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// mibd - device telemetry agent
#[derive(Parser)]
#[command(name = "mibd")]
#[command(about = "Device telemetry agent answering get, get-next and set queries")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the agent and serve until Ctrl-C (SIGHUP restarts it)
    Run {
        #[command(flatten)]
        agent: AgentArgs,
    },
    /// Fetch exact objects from a running agent
    Get {
        /// Dotted identifiers
        #[arg(required = true)]
        oids: Vec<String>,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Fetch the successor of each identifier from a running agent
    Next {
        #[arg(required = true)]
        oids: Vec<String>,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Walk a running agent's tree with repeated get-next
    Walk {
        /// Identifier to start after
        #[arg(default_value = "0")]
        from: String,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Write one object on a running agent
    Set {
        oid: String,
        value: String,
        /// Type of `value`
        #[arg(long = "type", value_enum, default_value = "string")]
        kind: ValueType,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Print the local tree with current values, without binding a socket
    Dump {
        #[command(flatten)]
        agent: AgentArgs,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the effective configuration as TOML
    Config,
}

/// Overrides for hosting the agent locally
#[derive(Args, Clone)]
pub struct AgentArgs {
    /// Address to bind
    #[arg(long)]
    pub bind: Option<String>,

    /// Port to bind
    #[arg(long)]
    pub port: Option<u16>,

    /// Register the writable sample object
    #[arg(long)]
    pub sample_object: bool,

    /// Preference file for the writable system objects
    #[arg(long)]
    pub preferences: Option<PathBuf>,

    /// Keep written values in the default preference file when none is configured
    #[arg(long)]
    pub persist: bool,

    /// Alternate procfs root
    #[arg(long, default_value = "/proc")]
    pub proc_root: PathBuf,

    /// Alternate sysfs root
    #[arg(long, default_value = "/sys")]
    pub sys_root: PathBuf,

    /// Filesystem reported as storage
    #[arg(long, default_value = "/")]
    pub data_path: PathBuf,
}

/// Connection settings for the manager commands
#[derive(Args, Clone)]
pub struct ClientArgs {
    /// Agent address
    #[arg(long, default_value = "127.0.0.1:1161")]
    pub target: SocketAddr,

    /// Community string (defaults to the configured get or set community)
    #[arg(long, short = 'c')]
    pub community: Option<String>,

    /// Response timeout in milliseconds
    #[arg(long, default_value = "2000")]
    pub timeout_ms: u64,

    /// Output format (text or json)
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ValueType {
    String,
    Integer,
    Counter64,
    Timeticks,
    Oid,
}

impl ValueType {
    pub fn parse(self, text: &str) -> Result<ScalarValue, AgentError> {
        let invalid = |e: &dyn std::fmt::Display| {
            AgentError::ConfigError(format!("Invalid {:?} value {:?}: {}", self, text, e))
        };
        Ok(match self {
            ValueType::String => ScalarValue::OctetString(text.to_string()),
            ValueType::Integer => ScalarValue::Integer(text.parse().map_err(|e| invalid(&e))?),
            ValueType::Counter64 => {
                ScalarValue::Counter64(text.parse().map_err(|e| invalid(&e))?)
            }
            ValueType::Timeticks => {
                ScalarValue::TimeTicks(text.parse().map_err(|e| invalid(&e))?)
            }
            ValueType::Oid => ScalarValue::ObjectIdentifier(Oid::parse(text)?),
        })
    }
}

/// Loaded configuration plus the command dispatcher
pub struct CliContext {
    config: AgentConfig,
}

impl CliContext {
    /// Load configuration from `config_path`, or the global file and environment
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, AgentError> {
        let config = match &config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };
        Ok(Self { config })
    }

    pub fn with_config(config: AgentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Fold the global logging flags into the loaded configuration
    pub fn apply_log_overrides(&mut self, cli: &Cli) {
        let logging = &mut self.config.logging;
        if let Some(level) = &cli.log_level {
            logging.level = level.clone();
        }
        if let Some(format) = &cli.log_format {
            logging.format = format.clone();
        }
        if let Some(output) = &cli.log_output {
            logging.output = output.clone();
        }
        if let Some(file) = &cli.log_file {
            logging.file = Some(file.clone());
        }
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, AgentError> {
        match command {
            Commands::Run { agent } => self.handle_run(agent),
            Commands::Get { oids, client } => {
                let oids = parse_oids(oids)?;
                let community = self.read_community(client);
                self.request(client, Query::get(community, oids))
            }
            Commands::Next { oids, client } => {
                let oids = parse_oids(oids)?;
                let community = self.read_community(client);
                self.request(client, Query::get_next(community, oids))
            }
            Commands::Walk { from, client } => self.handle_walk(from, client),
            Commands::Set {
                oid,
                value,
                kind,
                client,
            } => {
                let oid = Oid::parse(oid)?;
                let value = kind.parse(value)?;
                let community = client
                    .community
                    .clone()
                    .unwrap_or_else(|| self.config.communities.set.clone());
                self.request(client, Query::set(community, [(oid, value)]))
            }
            Commands::Dump { agent, format } => self.handle_dump(agent, format),
            Commands::Config => toml::to_string_pretty(&self.config)
                .map_err(|e| AgentError::ConfigError(format!("Failed to render config: {}", e))),
        }
    }

    fn read_community(&self, client: &ClientArgs) -> String {
        client
            .community
            .clone()
            .unwrap_or_else(|| self.config.communities.get.clone())
    }

    fn agent_config(&self, agent: &AgentArgs) -> Result<AgentConfig, AgentError> {
        let mut config = self.config.clone();
        if let Some(bind) = &agent.bind {
            config.agent.bind_address = bind.clone();
        }
        if let Some(port) = agent.port {
            config.agent.port = port;
        }
        if agent.sample_object {
            config.agent.sample_object = true;
        }
        if let Some(path) = &agent.preferences {
            config.preferences.file = Some(path.clone());
        }
        if agent.persist && config.preferences.file.is_none() {
            config.preferences.file = Some(default_preferences_path()?);
        }
        config.validate()?;
        Ok(config)
    }

    fn probe(agent: &AgentArgs) -> Arc<dyn DeviceProbe> {
        Arc::new(LinuxProbe::with_roots(
            &agent.proc_root,
            &agent.sys_root,
            &agent.data_path,
        ))
    }

    fn handle_run(&self, agent: &AgentArgs) -> Result<String, AgentError> {
        let config = self.agent_config(agent)?;
        let preferences = config.open_preferences()?;
        let controller = Arc::new(LifecycleController::new(
            config,
            Arc::new(UdpJsonTransport::default()),
            Self::probe(agent),
            preferences,
        ));

        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| AgentError::Worker(format!("Failed to create runtime: {}", e)))?;
        rt.block_on(async {
            join(controller.spawn_start()).await?;
            loop {
                match wait_for_signal().await? {
                    Signal::Interrupt => break,
                    Signal::Hangup => {
                        info!("Restart requested");
                        join(controller.spawn_restart()).await?;
                    }
                }
            }
            controller.stop()
        })?;
        Ok("Agent stopped".to_string())
    }

    fn handle_walk(&self, from: &str, client: &ClientArgs) -> Result<String, AgentError> {
        let community = self.read_community(client);
        let connection = connect(client)?;
        let mut cursor = Oid::parse(from)?;
        let mut results = Vec::new();
        loop {
            let response = connection.request(Query::get_next(community.clone(), [cursor.clone()]))?;
            let Some(result) = response.results.into_iter().next() else {
                break;
            };
            let next = match &result {
                RequestResult::Value { oid, .. } | RequestResult::NoSuchObject { oid } => {
                    Some(oid.clone())
                }
                RequestResult::EndOfTree | RequestResult::AccessDenied => None,
            };
            results.push(result);
            match next {
                // Successors only move forward; anything else would loop forever
                Some(oid) if oid > cursor => cursor = oid,
                _ => break,
            }
        }
        format_results(&results, &client.format)
    }

    fn handle_dump(&self, agent: &AgentArgs, format: &str) -> Result<String, AgentError> {
        let config = self.agent_config(agent)?;
        let preferences: Arc<dyn PreferenceStore> = config.open_preferences()?;
        let context = config.agent.context.as_str();

        let modules = Modules::standard(&config, Self::probe(agent), preferences);
        let mut registry = MibRegistry::new();
        modules.register_all(&mut registry, context)?;

        let view_root = config.view_root()?;
        let policy = AccessPolicy::from_communities(
            &config.communities.get,
            &config.communities.set,
            &config.communities.trap,
            view_root.clone(),
        );
        let processor = RequestProcessor::new(registry.into_shared(), context, Arc::new(policy));
        let start = if view_root.is_empty() {
            Oid::zero()
        } else {
            view_root
        };
        let results = processor.walk(&config.communities.get, &start);
        format_results(&results, format)
    }

    fn request(&self, client: &ClientArgs, query: Query) -> Result<String, AgentError> {
        let response = connect(client)?.request(query)?;
        format_results(&response.results, &client.format)
    }
}

enum Signal {
    Interrupt,
    Hangup,
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<Signal, AgentError> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut hangup = signal(SignalKind::hangup())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            Ok(Signal::Interrupt)
        }
        _ = hangup.recv() => Ok(Signal::Hangup),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<Signal, AgentError> {
    tokio::signal::ctrl_c().await?;
    Ok(Signal::Interrupt)
}

async fn join(
    handle: tokio::task::JoinHandle<Result<(), AgentError>>,
) -> Result<(), AgentError> {
    handle
        .await
        .map_err(|e| AgentError::Worker(e.to_string()))?
}

fn connect(client: &ClientArgs) -> Result<UdpJsonClient, AgentError> {
    UdpJsonClient::connect(client.target, Duration::from_millis(client.timeout_ms))
}

fn parse_oids(texts: &[String]) -> Result<Vec<Oid>, AgentError> {
    texts
        .iter()
        .map(|text| Oid::parse(text).map_err(AgentError::from))
        .collect()
}

/// Render results as `oid = TYPE: value` lines, or as a JSON array
pub fn format_results(results: &[RequestResult], format: &str) -> Result<String, AgentError> {
    match format {
        "json" => serde_json::to_string_pretty(results)
            .map_err(|e| AgentError::ConfigError(format!("Failed to render results: {}", e))),
        "text" => Ok(results
            .iter()
            .map(format_result)
            .collect::<Vec<_>>()
            .join("\n")),
        other => Err(AgentError::ConfigError(format!(
            "Invalid format: {} (must be 'text' or 'json')",
            other
        ))),
    }
}

fn format_result(result: &RequestResult) -> String {
    match result {
        RequestResult::Value { oid, value } => format!("{} = {}", oid, value),
        RequestResult::NoSuchObject { oid } => format!("{} = No Such Object", oid),
        RequestResult::EndOfTree => "End of MIB view".to_string(),
        RequestResult::AccessDenied => "Access denied".to_string(),
    }
}
