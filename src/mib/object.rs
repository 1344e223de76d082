//! Managed objects and their value sources.
//!
//! A managed object binds one identifier to a [`ValueSource`]. Sources are consulted
//! on every access; nothing is cached between requests.

use crate::config::PreferenceStore;
use crate::error::{ProviderError, WriteError};
use crate::mib::value::{ScalarKind, ScalarValue};
use crate::oid::Oid;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Maximum access of a managed object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Capability producing (and optionally accepting) the value of one object
pub trait ValueSource: Send + Sync {
    /// Produce the current value
    fn read(&self) -> Result<ScalarValue, ProviderError>;

    /// Accept a new value. Sources are read-only unless they override this.
    fn write(&self, _value: ScalarValue) -> Result<(), WriteError> {
        Err(WriteError::NotWritable)
    }
}

/// Fixed value
pub struct StaticSource(pub ScalarValue);

impl ValueSource for StaticSource {
    fn read(&self) -> Result<ScalarValue, ProviderError> {
        Ok(self.0.clone())
    }
}

/// Value recomputed by a closure on every read
pub struct FnSource<F>(pub F);

impl<F> ValueSource for FnSource<F>
where
    F: Fn() -> Result<ScalarValue, ProviderError> + Send + Sync,
{
    fn read(&self) -> Result<ScalarValue, ProviderError> {
        (self.0)()
    }
}

/// In-memory value that accepts writes
pub struct VolatileSource {
    value: RwLock<ScalarValue>,
}

impl VolatileSource {
    pub fn new(initial: ScalarValue) -> Self {
        Self {
            value: RwLock::new(initial),
        }
    }
}

impl ValueSource for VolatileSource {
    fn read(&self) -> Result<ScalarValue, ProviderError> {
        Ok(self.value.read().clone())
    }

    fn write(&self, value: ScalarValue) -> Result<(), WriteError> {
        *self.value.write() = value;
        Ok(())
    }
}

/// String value backed by a preference key
///
/// Reads fall back to `default` when the key has never been set. Writes go straight
/// to the store so the next read observes them.
pub struct PreferenceSource {
    store: Arc<dyn PreferenceStore>,
    key: String,
    default: String,
}

impl PreferenceSource {
    pub fn new(store: Arc<dyn PreferenceStore>, key: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            default: default.into(),
        }
    }
}

impl ValueSource for PreferenceSource {
    fn read(&self) -> Result<ScalarValue, ProviderError> {
        Ok(ScalarValue::OctetString(
            self.store.get_or(&self.key, &self.default),
        ))
    }

    fn write(&self, value: ScalarValue) -> Result<(), WriteError> {
        match value {
            ScalarValue::OctetString(text) => self
                .store
                .set(&self.key, &text)
                .map_err(|e| WriteError::Store(e.to_string())),
            other => Err(WriteError::WrongType {
                expected: ScalarKind::OctetString.to_string(),
                actual: other.kind().to_string(),
            }),
        }
    }
}

/// A named, typed, addressable value
pub struct ManagedObject {
    oid: Oid,
    access: Access,
    kind: ScalarKind,
    source: Box<dyn ValueSource>,
}

impl ManagedObject {
    pub fn new(oid: Oid, access: Access, kind: ScalarKind, source: impl ValueSource + 'static) -> Self {
        Self {
            oid,
            access,
            kind,
            source: Box::new(source),
        }
    }

    /// Read-only object computed by `f` on every read
    pub fn computed<F>(oid: Oid, kind: ScalarKind, f: F) -> Self
    where
        F: Fn() -> Result<ScalarValue, ProviderError> + Send + Sync + 'static,
    {
        Self::new(oid, Access::ReadOnly, kind, FnSource(f))
    }

    /// Read-only object with a fixed value
    pub fn constant(oid: Oid, value: ScalarValue) -> Self {
        let kind = value.kind();
        Self::new(oid, Access::ReadOnly, kind, StaticSource(value))
    }

    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    pub fn is_writable(&self) -> bool {
        self.access == Access::ReadWrite
    }

    /// Read the current value, checking it against the declared kind
    pub fn read(&self) -> Result<ScalarValue, ProviderError> {
        let value = self.source.read()?;
        if value.kind() != self.kind {
            return Err(ProviderError::Unavailable(format!(
                "{} produced {} for a {} object",
                self.oid,
                value.kind(),
                self.kind
            )));
        }
        Ok(value)
    }

    /// Write a new value. Read-only objects and mistyped values are rejected.
    pub fn write(&self, value: ScalarValue) -> Result<(), WriteError> {
        if self.access != Access::ReadWrite {
            return Err(WriteError::NotWritable);
        }
        if value.kind() != self.kind {
            return Err(WriteError::WrongType {
                expected: self.kind.to_string(),
                actual: value.kind().to_string(),
            });
        }
        self.source.write(value)
    }
}

impl fmt::Debug for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedObject")
            .field("oid", &self.oid)
            .field("access", &self.access)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryPreferences;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_computed_object_reads_fresh_each_time() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let object = ManagedObject::computed(Oid::from([1, 1, 0]), ScalarKind::Integer, move || {
            Ok(ScalarValue::Integer(c.fetch_add(1, Ordering::SeqCst) as i32))
        });

        assert_eq!(object.read().unwrap(), ScalarValue::Integer(0));
        assert_eq!(object.read().unwrap(), ScalarValue::Integer(1));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_read_only_rejects_write() {
        let object = ManagedObject::constant(Oid::from([1, 7, 0]), ScalarValue::Integer(64));
        assert!(matches!(
            object.write(ScalarValue::Integer(1)),
            Err(WriteError::NotWritable)
        ));
        assert_eq!(object.read().unwrap(), ScalarValue::Integer(64));
    }

    #[test]
    fn test_read_write_checks_kind() {
        let object = ManagedObject::new(
            Oid::from([1, 1, 0]),
            Access::ReadWrite,
            ScalarKind::Integer,
            VolatileSource::new(ScalarValue::Integer(7)),
        );
        assert!(matches!(
            object.write(ScalarValue::OctetString("seven".into())),
            Err(WriteError::WrongType { .. })
        ));
        object.write(ScalarValue::Integer(8)).unwrap();
        assert_eq!(object.read().unwrap(), ScalarValue::Integer(8));
    }

    #[test]
    fn test_mistyped_provider_is_an_error() {
        let object = ManagedObject::computed(Oid::from([1, 1, 0]), ScalarKind::Integer, || {
            Ok(ScalarValue::OctetString("oops".into()))
        });
        assert!(matches!(object.read(), Err(ProviderError::Unavailable(_))));
    }

    #[test]
    fn test_preference_source_round_trip() {
        let store: Arc<dyn PreferenceStore> = Arc::new(MemoryPreferences::new());
        let object = ManagedObject::new(
            Oid::from([1, 4, 0]),
            Access::ReadWrite,
            ScalarKind::OctetString,
            PreferenceSource::new(store.clone(), "system_contact", "IT Support"),
        );

        assert_eq!(object.read().unwrap(), ScalarValue::OctetString("IT Support".into()));
        object
            .write(ScalarValue::OctetString("ops@example.net".into()))
            .unwrap();
        assert_eq!(
            object.read().unwrap(),
            ScalarValue::OctetString("ops@example.net".into())
        );
        assert_eq!(store.get("system_contact").as_deref(), Some("ops@example.net"));
    }
}
