//! catalog::feature
//!
//! Features: instances typed by one Model and all of its ancestors.
//!
//! Values are reconciled with the merged feature schema of the whole
//! ancestry, then each reference value is checked against its property's
//! target Model with a subtype test before it becomes an edge.

use std::collections::BTreeSet;

use tracing::info;

use super::values::apply_values;
use super::{Catalog, CatalogResult};
use crate::core::resource::{value_dependencies, DependencyResource};
use crate::core::schema::calc_props_to_use;
use crate::core::types::{validate_name, NameGuard, PropertyValue, ResourceKey, ResourceKind};
use crate::model::{Feature, NewFeature};
use crate::store::Edge;

/// Repository for Features.
pub struct FeatureRepository<'a> {
    catalog: &'a Catalog,
}

impl<'a> FeatureRepository<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Create a Feature of `new.model_id`.
    pub fn create(&self, new: NewFeature) -> CatalogResult<Feature> {
        validate_name(&new.id, NameGuard::Enforce)?;

        let _guard = self.catalog.guard(&new)?;
        let key = new.resource();
        self.catalog.ensure_absent(&key)?;

        let (properties, edges) = self.reconcile(&new.model_id, &new.properties)?;
        let mut inherits_from = vec![new.model_id.clone()];
        inherits_from.extend(self.catalog.models().ancestors(&new.model_id)?);

        let feature = Feature {
            id: new.id,
            model_id: new.model_id,
            inherits_from,
            properties,
        };
        self.catalog.insert(key, &feature, edges)?;
        info!(feature = %feature.id, model = %feature.model_id, values = feature.properties.len(), "created feature");
        Ok(feature)
    }

    /// Replace a Feature's values, re-validating them from scratch.
    ///
    /// Cardinality tracking starts empty, so the stored values do not
    /// count against the new ones.
    pub fn update_properties(&self, id: &str, values: Vec<PropertyValue>) -> CatalogResult<Feature> {
        let key = ResourceKey::new(ResourceKind::Feature, id);
        let mut model_id = self.catalog.fetch_required::<Feature>(&key)?.model_id;

        // Re-read under the guard: the feature may have been recreated
        // under another model in between.
        let (_guard, mut feature) = loop {
            let mut keys: BTreeSet<ResourceKey> = value_dependencies(&values);
            keys.insert(key.clone());
            keys.insert(ResourceKey::new(ResourceKind::Model, &model_id));
            let guard = self.catalog.guard_keys(keys)?;

            let current: Feature = self.catalog.fetch_required(&key)?;
            if current.model_id == model_id {
                break (guard, current);
            }
            model_id = current.model_id;
        };

        let (properties, edges) = self.reconcile(&feature.model_id, &values)?;
        feature.properties = properties;
        self.catalog.overwrite(key, &feature, edges)?;
        info!(feature = %id, values = feature.properties.len(), "updated feature");
        Ok(feature)
    }

    pub fn get(&self, id: &str) -> CatalogResult<Option<Feature>> {
        self.catalog
            .fetch(&ResourceKey::new(ResourceKind::Feature, id))
    }

    pub fn list(&self) -> CatalogResult<Vec<Feature>> {
        self.catalog.fetch_all(ResourceKind::Feature)
    }

    /// Delete a Feature no value or allow-list points at.
    pub fn delete(&self, id: &str) -> CatalogResult<()> {
        let key = ResourceKey::new(ResourceKind::Feature, id);
        let _guard = self.catalog.guard_keys(BTreeSet::from([key.clone()]))?;
        self.catalog.ensure_present(&key)?;
        self.catalog.ensure_unreferenced(&key)?;
        self.catalog.store().delete(&key)?;
        info!(feature = %id, "deleted feature");
        Ok(())
    }

    fn reconcile(
        &self,
        model_id: &str,
        values: &[PropertyValue],
    ) -> CatalogResult<(Vec<PropertyValue>, Vec<Edge>)> {
        let model_key = ResourceKey::new(ResourceKind::Model, model_id);
        let merged = self.catalog.models().resolve_feature_schema(model_id)?;
        let used = calc_props_to_use(&merged, values)?;
        let applied = apply_values(self.catalog, &used)?;

        let mut edges = vec![Edge::new("model", model_key)];
        edges.extend(applied.edges);
        Ok((applied.values, edges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogError, EMPTY_MODEL_SCHEMA};
    use crate::core::schema::{Schema, SchemaRole};
    use crate::core::types::{Cardinality, DataType, Value};
    use crate::model::{Model, PrimitiveProperty, ReferenceProperty};

    fn catalog() -> Catalog {
        let catalog = Catalog::in_memory();
        catalog.install().unwrap();
        catalog
            .models()
            .create(Model::new("person", EMPTY_MODEL_SCHEMA))
            .unwrap();
        catalog
            .features()
            .create(NewFeature::new("alice", "person"))
            .unwrap();
        catalog
            .features()
            .create(NewFeature::new("bob", "person"))
            .unwrap();
        catalog
    }

    fn with_owner(catalog: &Catalog, cardinality: Cardinality) {
        catalog
            .properties()
            .create_reference(ReferenceProperty::new("owner", "person").with_cardinality(cardinality))
            .unwrap();
        catalog
            .models()
            .create(
                Model::new("car", EMPTY_MODEL_SCHEMA)
                    .with_feature_schema(Schema::new("car", SchemaRole::Feature).with_key("owner")),
            )
            .unwrap();
    }

    fn ref_edges(catalog: &Catalog, id: &str) -> usize {
        let key = ResourceKey::new(ResourceKind::Feature, id);
        let record = catalog.store().read(&key).unwrap().unwrap();
        record.edges_labeled("ref:owner").count()
    }

    #[test]
    fn inherits_from_lists_model_then_ancestors() {
        let catalog = catalog();
        catalog
            .models()
            .create(Model::new("employee", EMPTY_MODEL_SCHEMA).inheriting(["person"]))
            .unwrap();
        let f = catalog
            .features()
            .create(NewFeature::new("carol", "employee"))
            .unwrap();
        assert_eq!(f.inherits_from, vec!["employee", "person"]);
    }

    #[test]
    fn set_stores_one_edge_for_repeated_reference() {
        let catalog = catalog();
        with_owner(&catalog, Cardinality::Set);
        let f = catalog
            .features()
            .create(
                NewFeature::new("c1", "car")
                    .with_property(PropertyValue::reference("owner", "alice"))
                    .with_property(PropertyValue::reference("owner", "alice")),
            )
            .unwrap();
        assert_eq!(f.values("owner").count(), 1);
        assert_eq!(ref_edges(&catalog, "c1"), 1);
    }

    #[test]
    fn list_stores_every_repeat() {
        let catalog = catalog();
        with_owner(&catalog, Cardinality::List);
        catalog
            .features()
            .create(
                NewFeature::new("c1", "car")
                    .with_property(PropertyValue::reference("owner", "alice"))
                    .with_property(PropertyValue::reference("owner", "alice")),
            )
            .unwrap();
        assert_eq!(ref_edges(&catalog, "c1"), 2);
    }

    #[test]
    fn single_rejects_second_distinct_reference() {
        let catalog = catalog();
        with_owner(&catalog, Cardinality::Single);
        let err = catalog
            .features()
            .create(
                NewFeature::new("c1", "car")
                    .with_property(PropertyValue::reference("owner", "alice"))
                    .with_property(PropertyValue::reference("owner", "bob")),
            )
            .unwrap_err();
        assert!(matches!(err, CatalogError::Integrity(_)));
        assert!(catalog.features().get("c1").unwrap().is_none());
    }

    #[test]
    fn reference_must_be_subtype_of_target() {
        let catalog = catalog();
        with_owner(&catalog, Cardinality::Single);
        catalog
            .features()
            .create(
                NewFeature::new("c1", "car").with_property(PropertyValue::reference("owner", "alice")),
            )
            .unwrap();

        let err = catalog
            .features()
            .create(NewFeature::new("c2", "car").with_property(PropertyValue::reference("owner", "c1")))
            .unwrap_err();
        assert!(err.to_string().contains("not a subtype"));
    }

    #[test]
    fn primitive_type_mismatch_rejected() {
        let catalog = catalog();
        catalog
            .properties()
            .create_primitive(PrimitiveProperty::new("age", DataType::Integer))
            .unwrap();
        catalog
            .models()
            .create(
                Model::new("aged", EMPTY_MODEL_SCHEMA)
                    .with_feature_schema(Schema::new("aged", SchemaRole::Feature).with_key("age")),
            )
            .unwrap();

        let err = catalog
            .features()
            .create(NewFeature::new("x", "aged").with_property(PropertyValue::new("age", Value::Long(3))))
            .unwrap_err();
        assert!(matches!(err, CatalogError::Integrity(_)));
    }

    #[test]
    fn non_finite_numbers_rejected() {
        let catalog = catalog();
        catalog
            .properties()
            .create_primitive(PrimitiveProperty::new("speed", DataType::Double))
            .unwrap();
        catalog
            .models()
            .create(
                Model::new("moving", EMPTY_MODEL_SCHEMA)
                    .with_feature_schema(Schema::new("moving", SchemaRole::Feature).with_key("speed")),
            )
            .unwrap();

        for bad in [f64::NAN, f64::INFINITY] {
            let err = catalog
                .features()
                .create(
                    NewFeature::new("f", "moving")
                        .with_property(PropertyValue::new("speed", Value::Double(bad))),
                )
                .unwrap_err();
            assert!(matches!(err, CatalogError::Integrity(_)));
        }
        assert!(catalog.features().get("f").unwrap().is_none());

        catalog
            .features()
            .create(
                NewFeature::new("f", "moving")
                    .with_property(PropertyValue::new("speed", Value::Double(2.5))),
            )
            .unwrap();
        assert!(catalog.features().get("f").unwrap().is_some());
    }

    #[test]
    fn update_revalidates_with_fresh_tracking() {
        let catalog = catalog();
        with_owner(&catalog, Cardinality::Single);
        catalog
            .features()
            .create(
                NewFeature::new("c1", "car").with_property(PropertyValue::reference("owner", "alice")),
            )
            .unwrap();

        let updated = catalog
            .features()
            .update_properties("c1", vec![PropertyValue::reference("owner", "bob")])
            .unwrap();
        assert_eq!(
            updated.properties,
            vec![PropertyValue::reference("owner", "bob")]
        );

        let err = catalog
            .features()
            .update_properties("c1", vec![])
            .unwrap_err();
        assert!(matches!(err, CatalogError::Integrity(_)));
    }

    #[test]
    fn referenced_feature_cannot_be_deleted() {
        let catalog = catalog();
        with_owner(&catalog, Cardinality::Single);
        catalog
            .features()
            .create(
                NewFeature::new("c1", "car").with_property(PropertyValue::reference("owner", "alice")),
            )
            .unwrap();

        assert!(matches!(
            catalog.features().delete("alice"),
            Err(CatalogError::Integrity(_))
        ));
        catalog.features().delete("c1").unwrap();
        catalog.features().delete("alice").unwrap();
    }
}
