//! catalog::schema
//!
//! Standalone Model and View schemas.
//!
//! Feature schemas are never stored on their own; each lives inside its
//! Model. Asking this repository to create one is an integrity error.

use std::collections::BTreeSet;

use tracing::{info, warn};

use super::values::apply_values;
use super::{Catalog, CatalogError, CatalogResult};
use crate::core::resource::DependencyResource;
use crate::core::schema::{filter_to_keys, Schema, SchemaRole};
use crate::core::types::{validate_name, NameGuard, ResourceKey};

/// Repository for Model and View schemas.
pub struct SchemaRepository<'a> {
    catalog: &'a Catalog,
}

impl<'a> SchemaRepository<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Create a schema with a non-reserved id.
    pub fn create(&self, schema: Schema) -> CatalogResult<Schema> {
        self.create_guarded(schema, NameGuard::Enforce)
    }

    /// Create a schema, choosing how reserved ids are treated.
    ///
    /// Every key must name an existing property. Defaults outside the keys
    /// are dropped; the rest are type-checked and applied under their
    /// property's cardinality, so a SINGLE key cannot carry two distinct
    /// defaults.
    pub fn create_guarded(&self, mut schema: Schema, guard: NameGuard) -> CatalogResult<Schema> {
        validate_name(&schema.id, guard)?;
        if schema.role == SchemaRole::Feature {
            return Err(CatalogError::integrity(format!(
                "feature schema '{}' must be created as part of its model",
                schema.id
            )));
        }

        let _guard = self.catalog.guard(&schema)?;
        self.catalog.ensure_absent(&schema.resource_key())?;

        for key in &schema.property_keys {
            self.catalog.properties().definition(key)?;
        }

        let kept = filter_to_keys(&schema.property_keys, &schema.default_properties);
        if kept.len() != schema.default_properties.len() {
            warn!(
                schema = %schema.id,
                dropped = schema.default_properties.len() - kept.len(),
                "dropping defaults for properties outside the schema"
            );
        }
        let applied = apply_values(self.catalog, &kept)?;
        schema.default_properties = applied.values;

        self.catalog
            .insert(schema.resource_key(), &schema, applied.edges)?;
        info!(schema = %schema.id, role = ?schema.role, keys = schema.property_keys.len(), "created schema");
        Ok(schema)
    }

    pub fn get(&self, id: &str, role: SchemaRole) -> CatalogResult<Option<Schema>> {
        self.catalog
            .fetch(&ResourceKey::new(role.resource_kind(), id))
    }

    /// Every stored schema with `role`.
    pub fn list(&self, role: SchemaRole) -> CatalogResult<Vec<Schema>> {
        self.catalog.fetch_all(role.resource_kind())
    }

    /// Delete a schema no Model or View uses.
    pub fn delete(&self, id: &str, role: SchemaRole) -> CatalogResult<()> {
        let key = ResourceKey::new(role.resource_kind(), id);
        let _guard = self.catalog.guard_keys(BTreeSet::from([key.clone()]))?;
        self.catalog.ensure_present(&key)?;
        self.catalog.ensure_unreferenced(&key)?;
        self.catalog.store().delete(&key)?;
        info!(schema = %id, role = ?role, "deleted schema");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EMPTY_MODEL_SCHEMA, EMPTY_VIEW_SCHEMA};
    use crate::core::types::{DataType, PropertyValue, Value};
    use crate::model::{Model, PrimitiveProperty};

    fn catalog_with(props: &[(&str, DataType)]) -> Catalog {
        let catalog = Catalog::in_memory();
        catalog.install().unwrap();
        for (name, dt) in props {
            catalog
                .properties()
                .create_primitive(PrimitiveProperty::new(*name, *dt))
                .unwrap();
        }
        catalog
    }

    #[test]
    fn keys_must_name_existing_properties() {
        let catalog = catalog_with(&[]);
        let err = catalog
            .schemas()
            .create(Schema::new("s", SchemaRole::Model).with_key("missing"))
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(ref k) if k.to_string() == "GenericProperty:missing"));
    }

    #[test]
    fn single_key_rejects_two_distinct_defaults() {
        let catalog = catalog_with(&[("p", DataType::Integer)]);
        let schema = Schema::new("s", SchemaRole::View)
            .with_default(PropertyValue::new("p", Value::Integer(1)))
            .with_default(PropertyValue::new("p", Value::Integer(2)));
        let err = catalog.schemas().create(schema).unwrap_err();
        assert!(matches!(err, CatalogError::Integrity(_)));
    }

    #[test]
    fn defaults_are_type_checked() {
        let catalog = catalog_with(&[("p", DataType::Integer)]);
        let schema = Schema::new("s", SchemaRole::Model)
            .with_default(PropertyValue::new("p", Value::String("x".into())));
        assert!(matches!(
            catalog.schemas().create(schema),
            Err(CatalogError::Integrity(_))
        ));
    }

    #[test]
    fn defaults_outside_keys_are_dropped() {
        let catalog = catalog_with(&[("p", DataType::Integer)]);
        let mut schema = Schema::new("s", SchemaRole::Model).with_key("p");
        schema
            .default_properties
            .push(PropertyValue::new("stray", Value::Integer(1)));

        let stored = catalog.schemas().create(schema).unwrap();
        assert!(stored.default_properties.is_empty());
    }

    #[test]
    fn standalone_feature_schema_rejected() {
        let catalog = catalog_with(&[]);
        let err = catalog
            .schemas()
            .create(Schema::new("f", SchemaRole::Feature))
            .unwrap_err();
        assert!(matches!(err, CatalogError::Integrity(_)));
    }

    #[test]
    fn delete_refuses_while_in_use() {
        let catalog = catalog_with(&[]);
        catalog
            .models()
            .create(Model::new("m", EMPTY_MODEL_SCHEMA))
            .unwrap();

        let err = catalog
            .schemas()
            .delete(EMPTY_MODEL_SCHEMA, SchemaRole::Model)
            .unwrap_err();
        assert!(err.to_string().contains("Model:m"));

        catalog
            .schemas()
            .delete(EMPTY_VIEW_SCHEMA, SchemaRole::View)
            .unwrap();
        assert!(catalog
            .schemas()
            .get(EMPTY_VIEW_SCHEMA, SchemaRole::View)
            .unwrap()
            .is_none());
    }
}
