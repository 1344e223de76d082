//! Scalar values carried by managed objects.

use crate::oid::Oid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar type tag of a managed object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    OctetString,
    Integer,
    Counter64,
    TimeTicks,
    ObjectIdentifier,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarKind::OctetString => "OCTET STRING",
            ScalarKind::Integer => "INTEGER",
            ScalarKind::Counter64 => "Counter64",
            ScalarKind::TimeTicks => "TimeTicks",
            ScalarKind::ObjectIdentifier => "OBJECT IDENTIFIER",
        };
        f.write_str(name)
    }
}

/// A typed scalar value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ScalarValue {
    OctetString(String),
    Integer(i32),
    Counter64(u64),
    /// Hundredths of a second
    TimeTicks(u32),
    ObjectIdentifier(Oid),
}

impl ScalarValue {
    pub fn kind(&self) -> ScalarKind {
        match self {
            ScalarValue::OctetString(_) => ScalarKind::OctetString,
            ScalarValue::Integer(_) => ScalarKind::Integer,
            ScalarValue::Counter64(_) => ScalarKind::Counter64,
            ScalarValue::TimeTicks(_) => ScalarKind::TimeTicks,
            ScalarValue::ObjectIdentifier(_) => ScalarKind::ObjectIdentifier,
        }
    }

    /// Build time ticks from milliseconds, wrapping at 2^32 like the protocol counter
    pub fn ticks_from_millis(millis: u64) -> Self {
        ScalarValue::TimeTicks(((millis / 10) & u64::from(u32::MAX)) as u32)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::OctetString(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::OctetString(s) => write!(f, "STRING: \"{}\"", s),
            ScalarValue::Integer(v) => write!(f, "INTEGER: {}", v),
            ScalarValue::Counter64(v) => write!(f, "Counter64: {}", v),
            ScalarValue::TimeTicks(v) => write!(f, "Timeticks: ({})", v),
            ScalarValue::ObjectIdentifier(oid) => write!(f, "OID: {}", oid),
        }
    }
}
