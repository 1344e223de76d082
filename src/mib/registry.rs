//! Managed object registry.
//!
//! Per-context ordered mapping from identifier to managed object. The ordered index
//! is what answers tree-walk (successor) queries.

use crate::error::RegistryError;
use crate::mib::object::ManagedObject;
use crate::oid::Oid;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

/// The default (unnamed) context
pub const DEFAULT_CONTEXT: &str = "";

/// Registry shared between the lifecycle controller (writer) and the request processor (reader)
pub type SharedRegistry = Arc<RwLock<MibRegistry>>;

/// Ordered registry of managed objects, partitioned by context
#[derive(Debug)]
pub struct MibRegistry {
    contexts: HashMap<String, BTreeMap<Oid, ManagedObject>>,
}

impl MibRegistry {
    /// Create a registry holding only the default context
    pub fn new() -> Self {
        let mut contexts = HashMap::new();
        contexts.insert(DEFAULT_CONTEXT.to_string(), BTreeMap::new());
        Self { contexts }
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Add an empty context. Returns false if it already existed.
    pub fn add_context(&mut self, context: &str) -> bool {
        if self.contexts.contains_key(context) {
            return false;
        }
        self.contexts.insert(context.to_string(), BTreeMap::new());
        true
    }

    /// Drop a context and every object in it
    pub fn remove_context(&mut self, context: &str) -> usize {
        self.contexts
            .remove(context)
            .map(|objects| objects.len())
            .unwrap_or(0)
    }

    /// Context names, sorted
    pub fn contexts(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.contexts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Register an object. Fails without touching state if the identifier is taken.
    pub fn register(&mut self, context: &str, object: ManagedObject) -> Result<(), RegistryError> {
        if object.oid().is_empty() {
            return Err(RegistryError::EmptyIdentifier);
        }

        let objects = self.contexts.entry(context.to_string()).or_default();
        if objects.contains_key(object.oid()) {
            return Err(RegistryError::DuplicateIdentifier {
                context: context.to_string(),
                oid: object.oid().clone(),
            });
        }
        objects.insert(object.oid().clone(), object);
        Ok(())
    }

    /// Remove an object. Idempotent: returns whether anything was removed.
    pub fn unregister(&mut self, context: &str, oid: &Oid) -> bool {
        self.contexts
            .get_mut(context)
            .and_then(|objects| objects.remove(oid))
            .is_some()
    }

    /// Object registered at exactly `oid`
    pub fn lookup_exact(&self, context: &str, oid: &Oid) -> Option<&ManagedObject> {
        self.contexts.get(context)?.get(oid)
    }

    /// Object with the smallest identifier strictly greater than `oid`
    pub fn lookup_successor(&self, context: &str, oid: &Oid) -> Option<&ManagedObject> {
        self.contexts
            .get(context)?
            .range((Bound::Excluded(oid), Bound::Unbounded))
            .next()
            .map(|(_, object)| object)
    }

    pub fn contains(&self, context: &str, oid: &Oid) -> bool {
        self.lookup_exact(context, oid).is_some()
    }

    /// Number of objects in a context
    pub fn len(&self, context: &str) -> usize {
        self.contexts.get(context).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.values().all(BTreeMap::is_empty)
    }

    /// Registered identifiers of a context in ascending order
    pub fn oids(&self, context: &str) -> Vec<Oid> {
        self.contexts
            .get(context)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Objects of a context in ascending identifier order
    pub fn objects<'a>(&'a self, context: &str) -> impl Iterator<Item = &'a ManagedObject> + 'a {
        self.contexts
            .get(context)
            .into_iter()
            .flat_map(|objects| objects.values())
    }
}

impl Default for MibRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mib::value::ScalarValue;

    fn object(components: &[u32], value: i32) -> ManagedObject {
        ManagedObject::constant(Oid::from(components), ScalarValue::Integer(value))
    }

    fn sample_registry() -> MibRegistry {
        let mut registry = MibRegistry::new();
        for (i, oid) in [[1u32, 3, 1], [2, 1, 0], [1, 1, 0], [1, 3, 0]].iter().enumerate() {
            registry
                .register(DEFAULT_CONTEXT, object(oid, i as i32))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let mut registry = MibRegistry::new();
        registry
            .register(DEFAULT_CONTEXT, object(&[1, 4, 0], 1))
            .unwrap();

        let err = registry
            .register(DEFAULT_CONTEXT, object(&[1, 4, 0], 2))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateIdentifier { .. }));

        let kept = registry
            .lookup_exact(DEFAULT_CONTEXT, &Oid::from([1, 4, 0]))
            .unwrap();
        assert_eq!(kept.read().unwrap(), ScalarValue::Integer(1));
        assert_eq!(registry.len(DEFAULT_CONTEXT), 1);
    }

    #[test]
    fn test_same_oid_in_different_contexts() {
        let mut registry = MibRegistry::new();
        registry
            .register(DEFAULT_CONTEXT, object(&[1, 4, 0], 1))
            .unwrap();
        registry.register("bridge", object(&[1, 4, 0], 2)).unwrap();

        assert_eq!(registry.contexts(), vec!["", "bridge"]);
        assert_eq!(registry.len("bridge"), 1);
        assert!(registry.lookup_exact("missing", &Oid::from([1, 4, 0])).is_none());
    }

    #[test]
    fn test_empty_identifier_rejected() {
        let mut registry = MibRegistry::new();
        let err = registry
            .register(DEFAULT_CONTEXT, ManagedObject::constant(Oid::root(), ScalarValue::Integer(0)))
            .unwrap_err();
        assert_eq!(err, RegistryError::EmptyIdentifier);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_successor_lookup() {
        let registry = sample_registry();
        let next = |c: &[u32]| {
            registry
                .lookup_successor(DEFAULT_CONTEXT, &Oid::from(c))
                .map(|o| o.oid().clone())
        };

        assert_eq!(next(&[1, 3, 0]), Some(Oid::from([1, 3, 1])));
        assert_eq!(next(&[2, 1, 0]), None);
        assert_eq!(next(&[0]), Some(Oid::from([1, 1, 0])));
        // Not registered itself: successor is still the next one in order
        assert_eq!(next(&[1, 2]), Some(Oid::from([1, 3, 0])));
        assert_eq!(next(&[1, 3]), Some(Oid::from([1, 3, 0])));
        assert_eq!(next(&[9]), None);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut registry = sample_registry();
        let oid = Oid::from([1, 3, 0]);

        assert!(registry.unregister(DEFAULT_CONTEXT, &oid));
        assert!(!registry.unregister(DEFAULT_CONTEXT, &oid));
        assert!(!registry.unregister("never-created", &oid));

        assert!(!registry.contains(DEFAULT_CONTEXT, &oid));
        assert_eq!(
            registry
                .lookup_successor(DEFAULT_CONTEXT, &Oid::from([1, 1, 0]))
                .map(|o| o.oid().clone()),
            Some(Oid::from([1, 3, 1]))
        );
    }

    #[test]
    fn test_oids_are_sorted() {
        let registry = sample_registry();
        assert_eq!(
            registry.oids(DEFAULT_CONTEXT),
            vec![
                Oid::from([1, 1, 0]),
                Oid::from([1, 3, 0]),
                Oid::from([1, 3, 1]),
                Oid::from([2, 1, 0]),
            ]
        );
        assert_eq!(registry.objects(DEFAULT_CONTEXT).count(), 4);
    }

    #[test]
    fn test_remove_context() {
        let mut registry = sample_registry();
        assert!(registry.add_context("extra"));
        assert!(!registry.add_context("extra"));
        assert_eq!(registry.remove_context(DEFAULT_CONTEXT), 4);
        assert_eq!(registry.len(DEFAULT_CONTEXT), 0);
        assert_eq!(registry.remove_context(DEFAULT_CONTEXT), 0);
    }
}
