//! Error types for the agent.
//!
//! Identifier-scoped failures (`ProviderError`, `WriteError`) are resolved inside the
//! request processor and never escalate. Lifecycle-scoped failures surface as
//! [`AgentError`] to whoever asked for the transition.

use crate::lifecycle::LifecycleState;
use crate::oid::Oid;
use thiserror::Error;

/// Identifier parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OidError {
    #[error("Identifier text is empty")]
    Empty,

    #[error("Identifier {text:?} has an empty component")]
    EmptyComponent { text: String },

    #[error("Identifier {text:?} has an invalid component {component:?}")]
    InvalidComponent { text: String, component: String },
}

/// Registry mutation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Duplicate identifier {oid} in context {context:?}")]
    DuplicateIdentifier { context: String, oid: Oid },

    #[error("Cannot register an object with an empty identifier")]
    EmptyIdentifier,
}

/// Value provider failures
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Value unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to parse {source_name}: {reason}")]
    Parse { source_name: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Value provider panicked: {0}")]
    Panicked(String),
}

/// Object write failures
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Object is not writable")]
    NotWritable,

    #[error("Wrong value type: expected {expected}, got {actual}")]
    WrongType { expected: String, actual: String },

    #[error("Backing store rejected the write: {0}")]
    Store(String),

    #[error("Write handler panicked: {0}")]
    Panicked(String),
}

/// Transport bind failures
#[derive(Debug, Error)]
pub enum BindError {
    #[error("Failed to bind {address}: {source}")]
    Io {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Endpoint {0} is not listening")]
    NotListening(String),

    #[error("Bind refused: {0}")]
    Refused(String),
}

/// Top-level agent error
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Bind error: {0}")]
    Bind(#[from] BindError),

    #[error("Transition rejected while agent is {state}")]
    TransitionRejected { state: LifecycleState },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Lifecycle worker failed: {0}")]
    Worker(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid identifier: {0}")]
    InvalidOid(#[from] OidError),
}

impl From<config::ConfigError> for AgentError {
    fn from(err: config::ConfigError) -> Self {
        AgentError::ConfigError(err.to_string())
    }
}
