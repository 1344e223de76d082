//! Request processor: turns a query into one result per target.
//!
//! Every target is handled independently. Access is checked before the registry is
//! consulted, provider failures are downgraded to `NoSuchObject` for that target only,
//! and nothing is remembered between requests.

use crate::access::AccessPolicy;
use crate::error::{ProviderError, WriteError};
use crate::mib::object::ManagedObject;
use crate::mib::registry::SharedRegistry;
use crate::mib::value::ScalarValue;
use crate::oid::Oid;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Get,
    GetNext,
    Set,
}

/// One target of a query; `value` is only meaningful for `Set`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Unparsable text decodes to the empty identifier, which only fails this target
    #[serde(deserialize_with = "crate::oid::deserialize_or_empty")]
    pub oid: Oid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ScalarValue>,
}

impl Binding {
    pub fn oid(oid: Oid) -> Self {
        Self { oid, value: None }
    }

    pub fn with_value(oid: Oid, value: ScalarValue) -> Self {
        Self {
            oid,
            value: Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub request_id: i32,
    pub operation: Operation,
    pub community: String,
    pub bindings: Vec<Binding>,
}

impl Query {
    pub fn get(community: impl Into<String>, oids: impl IntoIterator<Item = Oid>) -> Self {
        Self::read(Operation::Get, community, oids)
    }

    pub fn get_next(community: impl Into<String>, oids: impl IntoIterator<Item = Oid>) -> Self {
        Self::read(Operation::GetNext, community, oids)
    }

    pub fn set(
        community: impl Into<String>,
        bindings: impl IntoIterator<Item = (Oid, ScalarValue)>,
    ) -> Self {
        Self {
            request_id: 0,
            operation: Operation::Set,
            community: community.into(),
            bindings: bindings
                .into_iter()
                .map(|(oid, value)| Binding::with_value(oid, value))
                .collect(),
        }
    }

    fn read(
        operation: Operation,
        community: impl Into<String>,
        oids: impl IntoIterator<Item = Oid>,
    ) -> Self {
        Self {
            request_id: 0,
            operation,
            community: community.into(),
            bindings: oids.into_iter().map(Binding::oid).collect(),
        }
    }

    pub fn with_request_id(mut self, request_id: i32) -> Self {
        self.request_id = request_id;
        self
    }
}

/// Outcome for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequestResult {
    Value { oid: Oid, value: ScalarValue },
    EndOfTree,
    NoSuchObject { oid: Oid },
    AccessDenied,
}

impl RequestResult {
    pub fn value(&self) -> Option<&ScalarValue> {
        match self {
            RequestResult::Value { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn oid(&self) -> Option<&Oid> {
        match self {
            RequestResult::Value { oid, .. } | RequestResult::NoSuchObject { oid } => Some(oid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub request_id: i32,
    /// One entry per binding, in binding order
    pub results: Vec<RequestResult>,
}

/// Answers queries against one registry context under one access policy
#[derive(Debug, Clone)]
pub struct RequestProcessor {
    registry: SharedRegistry,
    context: String,
    policy: Arc<AccessPolicy>,
}

impl RequestProcessor {
    pub fn new(registry: SharedRegistry, context: impl Into<String>, policy: Arc<AccessPolicy>) -> Self {
        Self {
            registry,
            context: context.into(),
            policy,
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn process(&self, query: &Query) -> Response {
        let results = query
            .bindings
            .iter()
            .map(|binding| match query.operation {
                Operation::Get => self.get(&query.community, &binding.oid),
                Operation::GetNext => self.get_next(&query.community, &binding.oid),
                Operation::Set => {
                    self.set(&query.community, &binding.oid, binding.value.clone())
                }
            })
            .collect();

        Response {
            request_id: query.request_id,
            results,
        }
    }

    pub fn get(&self, community: &str, oid: &Oid) -> RequestResult {
        debug!(%oid, "get");
        if oid.is_empty() {
            return RequestResult::NoSuchObject { oid: oid.clone() };
        }
        if !self.policy.check_read(community, oid) {
            return RequestResult::AccessDenied;
        }

        let registry = self.registry.read();
        match registry.lookup_exact(&self.context, oid) {
            Some(object) => read_result(object),
            None => RequestResult::NoSuchObject { oid: oid.clone() },
        }
    }

    /// Successor of `oid`. A successor outside the credential's view ends the walk.
    pub fn get_next(&self, community: &str, oid: &Oid) -> RequestResult {
        debug!(%oid, "get-next");
        if oid.is_empty() {
            return RequestResult::NoSuchObject { oid: oid.clone() };
        }
        if !self.policy.check_read(community, oid) {
            return RequestResult::AccessDenied;
        }

        let registry = self.registry.read();
        match registry.lookup_successor(&self.context, oid) {
            Some(object) if self.policy.check_read(community, object.oid()) => read_result(object),
            Some(_) | None => RequestResult::EndOfTree,
        }
    }

    /// Write `value`, then read it back so the response shows the stored value
    ///
    /// If the write lands but the read-back fails, the written value is returned.
    pub fn set(&self, community: &str, oid: &Oid, value: Option<ScalarValue>) -> RequestResult {
        debug!(%oid, "set");
        let no_such = || RequestResult::NoSuchObject { oid: oid.clone() };
        if oid.is_empty() {
            return no_such();
        }
        let Some(value) = value else {
            return no_such();
        };
        if !self.policy.check_write(community, oid) {
            return RequestResult::AccessDenied;
        }

        let registry = self.registry.read();
        let Some(object) = registry.lookup_exact(&self.context, oid) else {
            return no_such();
        };
        if !object.is_writable() {
            return RequestResult::AccessDenied;
        }

        match guarded_write(object, value.clone()) {
            Ok(()) => match guarded_read(object) {
                Ok(stored) => RequestResult::Value {
                    oid: oid.clone(),
                    value: stored,
                },
                Err(e) => {
                    warn!(%oid, error = %e, "Read-back failed after write");
                    RequestResult::Value {
                        oid: oid.clone(),
                        value,
                    }
                }
            },
            Err(e) => {
                warn!(%oid, error = %e, "Write failed");
                no_such()
            }
        }
    }

    /// Walk the tree with repeated get-next starting after `from`
    ///
    /// Targets whose provider fails are included as `NoSuchObject` and the walk goes on
    /// past them. Stops at the end of the tree or the credential's view.
    pub fn walk(&self, community: &str, from: &Oid) -> Vec<RequestResult> {
        let mut results = Vec::new();
        let mut cursor = from.clone();
        loop {
            let result = self.get_next(community, &cursor);
            match result.oid() {
                Some(next) if *next > cursor => {
                    cursor = next.clone();
                    results.push(result);
                }
                _ => break,
            }
        }
        results
    }
}

fn read_result(object: &ManagedObject) -> RequestResult {
    match guarded_read(object) {
        Ok(value) => RequestResult::Value {
            oid: object.oid().clone(),
            value,
        },
        Err(e) => {
            warn!(oid = %object.oid(), error = %e, "Value provider failed");
            RequestResult::NoSuchObject {
                oid: object.oid().clone(),
            }
        }
    }
}

fn guarded_read(object: &ManagedObject) -> Result<ScalarValue, ProviderError> {
    panic::catch_unwind(AssertUnwindSafe(|| object.read()))
        .unwrap_or_else(|payload| Err(ProviderError::Panicked(panic_message(payload.as_ref()))))
}

fn guarded_write(object: &ManagedObject, value: ScalarValue) -> Result<(), WriteError> {
    panic::catch_unwind(AssertUnwindSafe(|| object.write(value)))
        .unwrap_or_else(|payload| Err(WriteError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
