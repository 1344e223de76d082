//! MIB modules: groups of managed objects registered and torn down together.

pub mod device;
pub mod system;

pub use device::{DeviceMib, SampleMib, DEVICE_BASE};
pub use system::{SystemMib, AGENT_OBJECT_ID, SYSTEM_BASE};

use crate::config::{AgentConfig, PreferenceStore};
use crate::error::RegistryError;
use crate::mib::object::ManagedObject;
use crate::mib::registry::MibRegistry;
use crate::oid::Oid;
use crate::telemetry::DeviceProbe;
use std::sync::Arc;
use tracing::{debug, warn};

/// A group of managed objects
///
/// `objects` builds a fresh set on every call; the registry owns what it is given.
pub trait MibModule: Send + Sync {
    fn name(&self) -> &'static str;

    fn objects(&self) -> Vec<ManagedObject>;

    /// Identifiers this module registers
    fn oids(&self) -> Vec<Oid> {
        self.objects().iter().map(|o| o.oid().clone()).collect()
    }

    /// Register every object, or none: a failure removes what this call added.
    fn register(&self, registry: &mut MibRegistry, context: &str) -> Result<usize, RegistryError> {
        let mut added: Vec<Oid> = Vec::new();
        for object in self.objects() {
            let oid = object.oid().clone();
            if let Err(e) = registry.register(context, object) {
                for oid in &added {
                    registry.unregister(context, oid);
                }
                return Err(e);
            }
            added.push(oid);
        }
        Ok(added.len())
    }

    fn unregister(&self, registry: &mut MibRegistry, context: &str) -> usize {
        self.oids()
            .iter()
            .filter(|oid| registry.unregister(context, oid))
            .count()
    }
}

/// Ordered set of modules, registered front to back and unregistered back to front
#[derive(Default)]
pub struct Modules {
    modules: Vec<Box<dyn MibModule>>,
}

impl Modules {
    pub fn new() -> Self {
        Self::default()
    }

    /// System and device modules, plus the sample object when enabled
    pub fn standard(
        config: &AgentConfig,
        probe: Arc<dyn DeviceProbe>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        let mut modules = Self::new()
            .with(SystemMib::new(
                probe.clone(),
                preferences,
                config.system.clone(),
            ))
            .with(DeviceMib::new(probe));
        if config.agent.sample_object {
            modules.push(SampleMib::new(0));
        }
        modules
    }

    pub fn with(mut self, module: impl MibModule + 'static) -> Self {
        self.push(module);
        self
    }

    pub fn push(&mut self, module: impl MibModule + 'static) {
        self.modules.push(Box::new(module));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Register all modules. On failure the modules already registered are removed again.
    pub fn register_all(
        &self,
        registry: &mut MibRegistry,
        context: &str,
    ) -> Result<usize, RegistryError> {
        let mut total = 0;
        for (index, module) in self.modules.iter().enumerate() {
            match module.register(registry, context) {
                Ok(count) => {
                    debug!(module = module.name(), count, context, "Registered MIB module");
                    total += count;
                }
                Err(e) => {
                    warn!(module = module.name(), error = %e, "MIB module registration failed");
                    for earlier in self.modules[..index].iter().rev() {
                        earlier.unregister(registry, context);
                    }
                    return Err(e);
                }
            }
        }
        Ok(total)
    }

    pub fn unregister_all(&self, registry: &mut MibRegistry, context: &str) -> usize {
        self.modules
            .iter()
            .rev()
            .map(|module| {
                let removed = module.unregister(registry, context);
                debug!(module = module.name(), removed, context, "Unregistered MIB module");
                removed
            })
            .sum()
    }
}
