//! core::resource
//!
//! The dependency-resource contract every governed entity exposes.
//!
//! # Architecture
//!
//! A mutation locks `dependencies() ∪ {resource()}` before touching the
//! store, and the importer uses the same declaration to reconstruct
//! prerequisites before dependents. Both methods are pure computation over
//! the entity's own fields.

use std::collections::BTreeSet;

use super::types::{PropertyValue, ResourceKey, ResourceKind};

/// An entity with a canonical identity and a set of prerequisites.
pub trait DependencyResource {
    /// This entity's own key.
    fn resource(&self) -> ResourceKey;

    /// Keys this entity must coexist with.
    fn dependencies(&self) -> BTreeSet<ResourceKey>;

    /// The full key set a mutation of this entity locks.
    fn lock_set(&self) -> BTreeSet<ResourceKey> {
        let mut keys = self.dependencies();
        keys.insert(self.resource());
        keys
    }
}

/// Dependencies contributed by a list of values whose property kind is
/// known only from the value itself.
///
/// A reference value depends on its reference property and the referenced
/// Feature; a primitive value depends on its primitive property. Null
/// values depend on the generic property slot.
pub fn value_dependencies<'a>(
    values: impl IntoIterator<Item = &'a PropertyValue>,
) -> BTreeSet<ResourceKey> {
    let mut deps = BTreeSet::new();
    for pv in values {
        match &pv.value {
            Some(value) => match value.as_reference() {
                Some(target) => {
                    deps.insert(ResourceKey::new(ResourceKind::RefProperty, &pv.name));
                    deps.insert(ResourceKey::new(ResourceKind::Feature, target));
                }
                None => {
                    deps.insert(ResourceKey::new(ResourceKind::PrimProperty, &pv.name));
                }
            },
            None => {
                deps.insert(ResourceKey::new(ResourceKind::GenericProperty, &pv.name));
            }
        }
    }
    deps
}
