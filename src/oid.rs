//! Object identifiers
//!
//! An [`Oid`] is the hierarchical numeric address of a managed value. Ordering is
//! element-wise with the shorter identifier first when one is a prefix of the other,
//! which is exactly the lexicographic order a tree walk visits.

use crate::error::OidError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Dotted numeric identifier, e.g. `1.3.6.1.2.1.1.5.0`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Oid(Vec<u32>);

impl Oid {
    /// Create an identifier from its components
    pub fn new(components: impl Into<Vec<u32>>) -> Self {
        Oid(components.into())
    }

    /// The empty identifier. Prefix of every identifier, so it names the whole tree
    /// when used as a view root.
    pub fn root() -> Self {
        Oid(Vec::new())
    }

    /// `0`, the conventional starting point of a full walk
    pub fn zero() -> Self {
        Oid(vec![0])
    }

    /// Parse dotted text. A single leading `.` is accepted.
    pub fn parse(text: &str) -> Result<Self, OidError> {
        let trimmed = text.trim();
        let body = trimmed.strip_prefix('.').unwrap_or(trimmed);
        if body.is_empty() {
            return Err(OidError::Empty);
        }

        let mut components = Vec::new();
        for part in body.split('.') {
            if part.is_empty() {
                return Err(OidError::EmptyComponent {
                    text: text.to_string(),
                });
            }
            let value = part.parse::<u32>().map_err(|_| OidError::InvalidComponent {
                text: text.to_string(),
                component: part.to_string(),
            })?;
            components.push(value);
        }
        Ok(Oid(components))
    }

    /// New identifier with `suffix` concatenated
    pub fn append(&self, suffix: &[u32]) -> Self {
        let mut components = Vec::with_capacity(self.0.len() + suffix.len());
        components.extend_from_slice(&self.0);
        components.extend_from_slice(suffix);
        Oid(components)
    }

    /// True when `self` equals `other` or `other` extends it
    pub fn is_prefix_of(&self, other: &Oid) -> bool {
        other.0.starts_with(&self.0)
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for component in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}", component)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Oid {
    type Err = OidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Oid::parse(s)
    }
}

impl From<&[u32]> for Oid {
    fn from(components: &[u32]) -> Self {
        Oid(components.to_vec())
    }
}

impl<const N: usize> From<[u32; N]> for Oid {
    fn from(components: [u32; N]) -> Self {
        Oid(components.to_vec())
    }
}

impl Serialize for Oid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        // An empty string decodes to the empty identifier; request processing
        // treats it as malformed rather than failing the whole message.
        if text.trim().is_empty() {
            return Ok(Oid::root());
        }
        Oid::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Deserialize an identifier, mapping unparsable text to the empty identifier
///
/// For fields where one bad identifier must not reject the enclosing message.
pub fn deserialize_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Oid, D::Error> {
    let text = String::deserialize(deserializer)?;
    Ok(Oid::parse(text.trim()).unwrap_or_else(|_| Oid::root()))
}
