//! Agent lifecycle: start, stop and restart of the responder.
//!
//! Every transition runs under one transition lock. A start that finds the lock held,
//! or the agent anywhere but `Stopped`, is rejected rather than queued. Each start
//! builds a fresh registry and processor; each stop tears them down again, so at most
//! one pair is reachable at any time.

use crate::access::AccessPolicy;
use crate::config::{AgentConfig, PreferenceStore};
use crate::error::{AgentError, BindError};
use crate::mib::modules::Modules;
use crate::mib::registry::{MibRegistry, SharedRegistry};
use crate::processor::RequestProcessor;
use crate::telemetry::DeviceProbe;
use crate::transport::{Endpoint, Transport};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

type ModuleFactory = Box<dyn Fn() -> Modules + Send + Sync>;

/// Everything a running agent owns
struct LiveAgent {
    registry: SharedRegistry,
    processor: Arc<RequestProcessor>,
    modules: Modules,
    endpoint: Box<dyn Endpoint>,
}

/// Owns the responder and serializes its transitions
pub struct LifecycleController {
    config: AgentConfig,
    transport: Arc<dyn Transport>,
    modules: ModuleFactory,
    /// Held for the whole of every transition
    transition: Mutex<()>,
    /// Observable state; only ever held briefly
    state: RwLock<LifecycleState>,
    live: Mutex<Option<LiveAgent>>,
}

impl LifecycleController {
    /// Controller serving the standard system and device modules
    pub fn new(
        config: AgentConfig,
        transport: Arc<dyn Transport>,
        probe: Arc<dyn DeviceProbe>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        let module_config = config.clone();
        Self::with_modules(config, transport, move || {
            Modules::standard(&module_config, probe.clone(), preferences.clone())
        })
    }

    /// Controller serving whatever `modules` builds; called once per start
    pub fn with_modules<F>(config: AgentConfig, transport: Arc<dyn Transport>, modules: F) -> Self
    where
        F: Fn() -> Modules + Send + Sync + 'static,
    {
        Self {
            config,
            transport,
            modules: Box::new(modules),
            transition: Mutex::new(()),
            state: RwLock::new(LifecycleState::Stopped),
            live: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Processor of the running agent
    pub fn processor(&self) -> Option<Arc<RequestProcessor>> {
        self.live.lock().as_ref().map(|live| live.processor.clone())
    }

    /// Registry of the running agent
    pub fn registry(&self) -> Option<SharedRegistry> {
        self.live.lock().as_ref().map(|live| live.registry.clone())
    }

    /// Address the running agent is bound to
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.live.lock().as_ref().map(|live| live.endpoint.local_addr())
    }

    fn set_state(&self, state: LifecycleState) {
        *self.state.write() = state;
    }

    fn rejected(&self, operation: &str) -> AgentError {
        let state = self.state();
        warn!(operation, %state, "Lifecycle transition rejected");
        AgentError::TransitionRejected { state }
    }

    /// Start the agent. Rejected unless `Stopped` with no transition in flight.
    pub fn start(&self) -> Result<(), AgentError> {
        let Some(_guard) = self.transition.try_lock() else {
            return Err(self.rejected("start"));
        };
        self.start_locked()
    }

    /// Stop the agent, waiting for any in-flight transition first. Idempotent.
    pub fn stop(&self) -> Result<(), AgentError> {
        let _guard = self.transition.lock();
        self.stop_locked();
        Ok(())
    }

    /// Stop, wait the settle delay, start; all under one hold of the transition lock
    pub fn restart(&self) -> Result<(), AgentError> {
        let _guard = self.transition.lock();
        self.stop_locked();
        let settle = self.config.settle_delay();
        if !settle.is_zero() {
            info!(settle_ms = settle.as_millis() as u64, "Waiting before restart");
            std::thread::sleep(settle);
        }
        self.start_locked()
    }

    /// Run [`start`](Self::start) on a blocking worker. Requires a Tokio runtime.
    pub fn spawn_start(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<(), AgentError>> {
        let controller = self.clone();
        tokio::task::spawn_blocking(move || controller.start())
    }

    /// Run [`restart`](Self::restart) on a blocking worker. Requires a Tokio runtime.
    pub fn spawn_restart(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<(), AgentError>> {
        let controller = self.clone();
        tokio::task::spawn_blocking(move || controller.restart())
    }

    fn start_locked(&self) -> Result<(), AgentError> {
        if self.state() != LifecycleState::Stopped {
            return Err(self.rejected("start"));
        }
        self.set_state(LifecycleState::Starting);

        match self.build() {
            Ok(live) => {
                info!(
                    address = %live.endpoint.local_addr(),
                    transport = self.transport.name(),
                    "Agent running"
                );
                *self.live.lock() = Some(live);
                self.set_state(LifecycleState::Running);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Agent failed to start");
                self.set_state(LifecycleState::Stopped);
                Err(e)
            }
        }
    }

    /// Build registry, processor and endpoint, unwinding whatever was done on failure
    fn build(&self) -> Result<LiveAgent, AgentError> {
        let context = self.config.agent.context.as_str();
        let addr = self.config.listen_addr()?;
        let policy = AccessPolicy::from_communities(
            &self.config.communities.get,
            &self.config.communities.set,
            &self.config.communities.trap,
            self.config.view_root()?,
        );

        let modules = (self.modules)();
        let mut registry = MibRegistry::new();
        let count = modules.register_all(&mut registry, context)?;
        info!(
            objects = count,
            modules = ?modules.names(),
            context,
            "Registered managed objects"
        );

        let registry = registry.into_shared();
        let processor = Arc::new(RequestProcessor::new(
            registry.clone(),
            context,
            Arc::new(policy),
        ));

        let unwind = |registry: &SharedRegistry| {
            modules.unregister_all(&mut registry.write(), context);
        };

        let mut endpoint = match self.transport.bind(addr, processor.clone()) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                unwind(&registry);
                return Err(e.into());
            }
        };
        if !endpoint.is_listening() {
            let bound = endpoint.local_addr();
            endpoint.close();
            unwind(&registry);
            return Err(BindError::NotListening(bound.to_string()).into());
        }

        Ok(LiveAgent {
            registry,
            processor,
            modules,
            endpoint,
        })
    }

    fn stop_locked(&self) {
        let Some(mut live) = self.live.lock().take() else {
            self.set_state(LifecycleState::Stopped);
            return;
        };
        self.set_state(LifecycleState::Stopping);

        live.endpoint.close();
        let removed = live
            .modules
            .unregister_all(&mut live.registry.write(), &self.config.agent.context);
        info!(objects = removed, "Agent stopped");

        self.set_state(LifecycleState::Stopped);
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.stop_locked();
    }
}
