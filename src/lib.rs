//! mibd: Device Telemetry Agent
//!
//! A registry of managed objects keyed by hierarchical identifiers, a stateless
//! get / get-next / set request engine with per-community access rules, and a
//! single-instance lifecycle around the listening endpoint.

pub mod access;
pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod mib;
pub mod oid;
pub mod processor;
pub mod telemetry;
pub mod transport;

pub use access::{AccessPolicy, AccessRule, Permission};
pub use error::{AgentError, BindError, ProviderError, RegistryError, WriteError};
pub use lifecycle::{LifecycleController, LifecycleState};
pub use mib::{Access, ManagedObject, MibRegistry, ScalarValue, SharedRegistry};
pub use oid::Oid;
pub use processor::{Query, RequestProcessor, RequestResult, Response};
