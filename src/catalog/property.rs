//! catalog::property
//!
//! Primitive and reference property definitions.
//!
//! Both kinds share one namespace: creating `PrimProperty:x` fails while
//! `RefProperty:x` exists and vice versa. Dependents name a property only
//! by its `GenericProperty` slot, which [`PropertyRepository::resolve_generic`]
//! turns into the concrete key.

use std::collections::BTreeSet;

use tracing::{debug, info};
use uuid::Uuid;

use super::{Catalog, CatalogError, CatalogResult};
use crate::core::resource::DependencyResource;
use crate::core::types::{validate_name, NameGuard, ResourceKey, ResourceKind};
use crate::model::{Feature, PrimitiveProperty, PropertyDefinition, ReferenceProperty};
use crate::store::Edge;

/// Name prefix given to deleted property definitions.
pub const DELETED_PREFIX: &str = "__deleted.";

/// Repository for property definitions.
pub struct PropertyRepository<'a> {
    catalog: &'a Catalog,
}

impl<'a> PropertyRepository<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Create a primitive property.
    ///
    /// Every entry of `allowed_values` must have the property's data type.
    pub fn create_primitive(&self, property: PrimitiveProperty) -> CatalogResult<PrimitiveProperty> {
        validate_name(&property.name, NameGuard::Enforce)?;
        if let Some(allowed) = &property.allowed_values {
            if let Some(bad) = allowed
                .iter()
                .find(|v| v.data_type() != Some(property.data_type))
            {
                return Err(CatalogError::integrity(format!(
                    "allowed value {bad} does not have type {:?} of property '{}'",
                    property.data_type, property.name
                )));
            }
            if let Some(bad) = allowed.iter().find(|v| !v.is_finite()) {
                return Err(CatalogError::integrity(format!(
                    "allowed value {bad} of property '{}' is not finite",
                    property.name
                )));
            }
        }

        let _guard = self.catalog.guard(&property)?;
        self.ensure_name_free(&property.name)?;
        self.catalog
            .insert(property.resource(), &property, Vec::new())?;
        self.remember(property.resource());

        info!(property = %property.name, data_type = ?property.data_type, "created primitive property");
        Ok(property)
    }

    /// Create a reference property.
    ///
    /// The target Model must exist. Allow-listed Features must exist and be
    /// of the target Model or one of its subtypes.
    pub fn create_reference(&self, property: ReferenceProperty) -> CatalogResult<ReferenceProperty> {
        validate_name(&property.name, NameGuard::Enforce)?;

        let _guard = self.catalog.guard(&property)?;
        self.ensure_name_free(&property.name)?;

        let target = ResourceKey::new(ResourceKind::Model, &property.target_model_id);
        self.catalog.ensure_present(&target)?;

        let mut edges = vec![Edge::new("target", target)];
        for id in property.allowed_values.iter().flatten() {
            let key = ResourceKey::new(ResourceKind::Feature, id);
            let feature: Feature = self.catalog.fetch_required(&key)?;
            if !self
                .catalog
                .models()
                .is_subtype(&feature.model_id, &property.target_model_id)?
            {
                return Err(CatalogError::integrity(format!(
                    "allowed feature '{id}' is not a '{}'",
                    property.target_model_id
                )));
            }
            edges.push(Edge::new("allowed", key));
        }

        self.catalog.insert(property.resource(), &property, edges)?;
        self.remember(property.resource());

        info!(property = %property.name, target = %property.target_model_id, "created reference property");
        Ok(property)
    }

    pub fn get_primitive(&self, name: &str) -> CatalogResult<Option<PrimitiveProperty>> {
        self.catalog
            .fetch(&ResourceKey::new(ResourceKind::PrimProperty, name))
    }

    pub fn get_reference(&self, name: &str) -> CatalogResult<Option<ReferenceProperty>> {
        self.catalog
            .fetch(&ResourceKey::new(ResourceKind::RefProperty, name))
    }

    /// The definition named `name`, of either kind.
    pub fn get(&self, name: &str) -> CatalogResult<Option<PropertyDefinition>> {
        if let Some(p) = self.get_primitive(name)? {
            return Ok(Some(PropertyDefinition::Primitive(p)));
        }
        Ok(self.get_reference(name)?.map(PropertyDefinition::Reference))
    }

    /// Like [`get`](Self::get), failing with `NotFound` on the generic slot.
    pub fn definition(&self, name: &str) -> CatalogResult<PropertyDefinition> {
        self.get(name)?.ok_or_else(|| {
            CatalogError::NotFound(ResourceKey::new(ResourceKind::GenericProperty, name))
        })
    }

    pub fn list_primitive(&self) -> CatalogResult<Vec<PrimitiveProperty>> {
        self.catalog.fetch_all(ResourceKind::PrimProperty)
    }

    pub fn list_reference(&self) -> CatalogResult<Vec<ReferenceProperty>> {
        self.catalog.fetch_all(ResourceKind::RefProperty)
    }

    /// Every definition, primitives first.
    pub fn list(&self) -> CatalogResult<Vec<PropertyDefinition>> {
        let mut all: Vec<PropertyDefinition> = self
            .list_primitive()?
            .into_iter()
            .map(PropertyDefinition::Primitive)
            .collect();
        all.extend(
            self.list_reference()?
                .into_iter()
                .map(PropertyDefinition::Reference),
        );
        Ok(all)
    }

    /// Resolve a `GenericProperty` key to the concrete property key.
    ///
    /// Checks the in-memory cache for the primitive then the reference
    /// key, then the store in the same order. Other kinds pass through.
    pub fn resolve_generic(&self, key: &ResourceKey) -> CatalogResult<ResourceKey> {
        if key.kind() != ResourceKind::GenericProperty {
            return Ok(key.clone());
        }
        let candidates = [
            key.with_kind(ResourceKind::PrimProperty),
            key.with_kind(ResourceKind::RefProperty),
        ];

        {
            let known = self.catalog.known_properties();
            if let Some(hit) = candidates.iter().find(|c| known.contains(*c)) {
                return Ok(hit.clone());
            }
        }

        for candidate in candidates {
            if self.catalog.store().exists(&candidate)? {
                debug!(key = %key, resolved = %candidate, "resolved generic property from store");
                self.remember(candidate.clone());
                return Ok(candidate);
            }
        }
        Err(CatalogError::NotFound(key.clone()))
    }

    /// Delete a property by renaming it to `__deleted.<uuid>`.
    ///
    /// The name becomes free again and the old definition is no longer
    /// addressable. Values already stored under the name are left as is.
    pub fn delete(&self, name: &str) -> CatalogResult<ResourceKey> {
        let slot = ResourceKey::new(ResourceKind::GenericProperty, name);
        let _guard = self.catalog.guard_keys(BTreeSet::from([
            slot.with_kind(ResourceKind::PrimProperty),
            slot.with_kind(ResourceKind::RefProperty),
            slot,
        ]))?;
        let definition = self.definition(name)?;
        let old_key = definition.resource();

        let new_name = format!("{DELETED_PREFIX}{}", Uuid::new_v4());
        validate_name(&new_name, NameGuard::DangerouslyAllowReserved)?;

        let new_key = match definition {
            PropertyDefinition::Primitive(mut p) => {
                p.name = new_name;
                self.catalog.insert(p.resource(), &p, Vec::new())?;
                p.resource()
            }
            PropertyDefinition::Reference(mut r) => {
                r.name = new_name;
                self.catalog.insert(r.resource(), &r, Vec::new())?;
                r.resource()
            }
        };
        if !self.catalog.store().delete(&old_key)? {
            self.catalog.store().delete(&new_key)?;
            return Err(CatalogError::NotFound(old_key));
        }
        self.catalog.known_properties().remove(&old_key);

        info!(property = %name, renamed = %new_key, "deleted property");
        Ok(new_key)
    }

    fn ensure_name_free(&self, name: &str) -> CatalogResult<()> {
        self.catalog
            .ensure_absent(&ResourceKey::new(ResourceKind::PrimProperty, name))?;
        self.catalog
            .ensure_absent(&ResourceKey::new(ResourceKind::RefProperty, name))
    }

    fn remember(&self, key: ResourceKey) {
        self.catalog.known_properties().insert(key);
    }
}
