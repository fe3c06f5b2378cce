//! model::entity
//!
//! Models, Features and Views.
//!
//! # Invariants
//!
//! - A Model's `feature_schema` is its own contribution to the shape of
//!   its Features and never changes after creation
//! - A Feature's `inherits_from` is derived (its Model plus all transitive
//!   ancestors, nearest first) and cached at creation
//! - Neither the Model inheritance graph nor the View graph is checked
//!   for cycles

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::resource::{value_dependencies, DependencyResource};
use crate::core::schema::{Schema, SchemaRole};
use crate::core::types::{PropertyValue, ResourceKey, ResourceKind};

/// A typed, multiply-inheriting entity that owns a feature-shape contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Model {
    pub id: String,
    #[serde(default)]
    pub inherits_from: BTreeSet<String>,
    pub model_schema_id: String,
    pub feature_schema: Schema,
    #[serde(default)]
    pub properties: Vec<PropertyValue>,
}

impl Model {
    /// A Model with no parents, an empty feature schema and no properties.
    pub fn new(id: impl Into<String>, model_schema_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            feature_schema: Schema::new(id.clone(), SchemaRole::Feature),
            id,
            inherits_from: BTreeSet::new(),
            model_schema_id: model_schema_id.into(),
            properties: Vec::new(),
        }
    }

    pub fn inheriting<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inherits_from.extend(parents.into_iter().map(Into::into));
        self
    }

    /// Replace the feature schema, keeping its id and role tied to this Model.
    pub fn with_feature_schema(mut self, mut schema: Schema) -> Self {
        schema.id = self.id.clone();
        schema.role = SchemaRole::Feature;
        self.feature_schema = schema;
        self
    }

    pub fn with_property(mut self, value: PropertyValue) -> Self {
        self.properties.push(value);
        self
    }
}

impl DependencyResource for Model {
    fn resource(&self) -> ResourceKey {
        ResourceKey::new(ResourceKind::Model, &self.id)
    }

    fn dependencies(&self) -> BTreeSet<ResourceKey> {
        let mut deps: BTreeSet<ResourceKey> = self
            .inherits_from
            .iter()
            .map(|p| ResourceKey::new(ResourceKind::Model, p))
            .collect();
        deps.insert(ResourceKey::new(
            ResourceKind::ModelSchema,
            &self.model_schema_id,
        ));
        deps.insert(ResourceKey::new(ResourceKind::FeatureSchema, &self.id));
        for key in &self.feature_schema.property_keys {
            deps.insert(ResourceKey::new(ResourceKind::GenericProperty, key));
        }
        deps.extend(value_dependencies(&self.feature_schema.default_properties));
        deps.extend(value_dependencies(&self.properties));
        deps
    }
}

/// Input for creating a Feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFeature {
    pub id: String,
    pub model_id: String,
    #[serde(default)]
    pub properties: Vec<PropertyValue>,
}

impl NewFeature {
    pub fn new(id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model_id: model_id.into(),
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, value: PropertyValue) -> Self {
        self.properties.push(value);
        self
    }
}

impl DependencyResource for NewFeature {
    fn resource(&self) -> ResourceKey {
        ResourceKey::new(ResourceKind::Feature, &self.id)
    }

    fn dependencies(&self) -> BTreeSet<ResourceKey> {
        let mut deps = BTreeSet::from([ResourceKey::new(ResourceKind::Model, &self.model_id)]);
        deps.extend(value_dependencies(&self.properties));
        deps
    }
}

/// An instance typed by exactly one Model plus its transitive ancestors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Feature {
    pub id: String,
    pub model_id: String,
    /// The Model followed by its ancestors, nearest first.
    #[serde(default)]
    pub inherits_from: Vec<String>,
    #[serde(default)]
    pub properties: Vec<PropertyValue>,
}

impl Feature {
    /// The creation input that reproduces this Feature.
    pub fn to_new(&self) -> NewFeature {
        NewFeature {
            id: self.id.clone(),
            model_id: self.model_id.clone(),
            properties: self.properties.clone(),
        }
    }

    /// Values stored under `name`.
    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a PropertyValue> {
        self.properties.iter().filter(move |pv| pv.name == name)
    }
}

impl DependencyResource for Feature {
    fn resource(&self) -> ResourceKey {
        ResourceKey::new(ResourceKind::Feature, &self.id)
    }

    fn dependencies(&self) -> BTreeSet<ResourceKey> {
        let mut deps = BTreeSet::from([ResourceKey::new(ResourceKind::Model, &self.model_id)]);
        deps.extend(value_dependencies(&self.properties));
        deps
    }
}

/// A named node organizing Models and child Views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct View {
    pub id: String,
    pub view_schema_id: String,
    #[serde(default)]
    pub model_ids: BTreeSet<String>,
    #[serde(default)]
    pub view_ids: BTreeSet<String>,
    #[serde(default)]
    pub properties: Vec<PropertyValue>,
}

impl View {
    pub fn new(id: impl Into<String>, view_schema_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            view_schema_id: view_schema_id.into(),
            model_ids: BTreeSet::new(),
            view_ids: BTreeSet::new(),
            properties: Vec::new(),
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_ids.insert(model_id.into());
        self
    }

    pub fn with_view(mut self, view_id: impl Into<String>) -> Self {
        self.view_ids.insert(view_id.into());
        self
    }

    pub fn with_property(mut self, value: PropertyValue) -> Self {
        self.properties.push(value);
        self
    }
}

impl DependencyResource for View {
    fn resource(&self) -> ResourceKey {
        ResourceKey::new(ResourceKind::View, &self.id)
    }

    fn dependencies(&self) -> BTreeSet<ResourceKey> {
        let mut deps = BTreeSet::from([ResourceKey::new(
            ResourceKind::ViewSchema,
            &self.view_schema_id,
        )]);
        deps.extend(
            self.model_ids
                .iter()
                .map(|m| ResourceKey::new(ResourceKind::Model, m)),
        );
        deps.extend(
            self.view_ids
                .iter()
                .map(|v| ResourceKey::new(ResourceKind::View, v)),
        );
        deps.extend(value_dependencies(&self.properties));
        deps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Value;

    #[test]
    fn model_dependencies_cover_parents_schemas_and_keys() {
        let model = Model::new("car", "vehicle-schema")
            .inheriting(["vehicle"])
            .with_feature_schema(
                Schema::new("ignored", SchemaRole::Model).with_key("wheels"),
            );
        let deps: BTreeSet<String> = model.dependencies().iter().map(ToString::to_string).collect();

        assert!(deps.contains("Model:vehicle"));
        assert!(deps.contains("ModelSchema:vehicle-schema"));
        assert!(deps.contains("FeatureSchema:car"));
        assert!(deps.contains("GenericProperty:wheels"));
        assert_eq!(model.feature_schema.id, "car");
        assert_eq!(model.feature_schema.role, SchemaRole::Feature);
    }

    #[test]
    fn feature_depends_on_model_and_references() {
        let new = NewFeature::new("f1", "car")
            .with_property(PropertyValue::reference("owner", "alice"))
            .with_property(PropertyValue::new("wheels", Value::Integer(4)));
        let deps: Vec<String> = new.dependencies().iter().map(ToString::to_string).collect();
        assert_eq!(
            deps,
            vec![
                "Feature:alice",
                "Model:car",
                "RefProperty:owner",
                "PrimProperty:wheels"
            ]
        );
    }

    #[test]
    fn self_referencing_view_lists_itself() {
        let view = View::new("root", "vs").with_view("root");
        assert!(view.dependencies().contains(&view.resource()));
        assert_eq!(view.lock_set().len(), 2);
    }

    #[test]
    fn feature_to_new_drops_derived_ancestry() {
        let feature = Feature {
            id: "f".into(),
            model_id: "m".into(),
            inherits_from: vec!["m".into(), "base".into()],
            properties: vec![],
        };
        let new = feature.to_new();
        assert_eq!(new.id, "f");
        assert_eq!(new.model_id, "m");
    }
}
