//! model::property
//!
//! Property definitions.
//!
//! Primitive and reference properties share one namespace: a name is
//! either a [`PrimitiveProperty`] or a [`ReferenceProperty`], never both.
//! The `GenericProperty` resource kind stands for that shared slot.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::resource::DependencyResource;
use crate::core::types::{Cardinality, DataType, ResourceKey, ResourceKind, Value};

/// A scalar-valued property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrimitiveProperty {
    pub name: String,
    #[serde(default)]
    pub cardinality: Cardinality,
    pub data_type: DataType,
    /// Closed set of accepted values, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
}

impl PrimitiveProperty {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::Single,
            data_type,
            allowed_values: None,
        }
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn with_allowed_values(mut self, values: Vec<Value>) -> Self {
        self.allowed_values = Some(values);
        self
    }
}

impl DependencyResource for PrimitiveProperty {
    fn resource(&self) -> ResourceKey {
        ResourceKey::new(ResourceKind::PrimProperty, &self.name)
    }

    fn dependencies(&self) -> BTreeSet<ResourceKey> {
        [ResourceKey::new(ResourceKind::GenericProperty, &self.name)].into()
    }
}

/// A property whose values are Features of a given Model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceProperty {
    pub name: String,
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Referenced Features must be of this Model or a subtype of it.
    pub target_model_id: String,
    /// Closed set of accepted Feature ids, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<BTreeSet<String>>,
}

impl ReferenceProperty {
    pub fn new(name: impl Into<String>, target_model_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::Single,
            target_model_id: target_model_id.into(),
            allowed_values: None,
        }
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn with_allowed_features<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = Some(ids.into_iter().map(Into::into).collect());
        self
    }
}

impl DependencyResource for ReferenceProperty {
    fn resource(&self) -> ResourceKey {
        ResourceKey::new(ResourceKind::RefProperty, &self.name)
    }

    fn dependencies(&self) -> BTreeSet<ResourceKey> {
        let mut deps = BTreeSet::from([
            ResourceKey::new(ResourceKind::GenericProperty, &self.name),
            ResourceKey::new(ResourceKind::Model, &self.target_model_id),
        ]);
        for id in self.allowed_values.iter().flatten() {
            deps.insert(ResourceKey::new(ResourceKind::Feature, id));
        }
        deps
    }
}

/// Either kind of property definition.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyDefinition {
    Primitive(PrimitiveProperty),
    Reference(ReferenceProperty),
}

impl PropertyDefinition {
    pub fn name(&self) -> &str {
        match self {
            PropertyDefinition::Primitive(p) => &p.name,
            PropertyDefinition::Reference(r) => &r.name,
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        match self {
            PropertyDefinition::Primitive(p) => p.cardinality,
            PropertyDefinition::Reference(r) => r.cardinality,
        }
    }
}

impl DependencyResource for PropertyDefinition {
    fn resource(&self) -> ResourceKey {
        match self {
            PropertyDefinition::Primitive(p) => p.resource(),
            PropertyDefinition::Reference(r) => r.resource(),
        }
    }

    fn dependencies(&self) -> BTreeSet<ResourceKey> {
        match self {
            PropertyDefinition::Primitive(p) => p.dependencies(),
            PropertyDefinition::Reference(r) => r.dependencies(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_property_depends_on_target_and_slot() {
        let prop = ReferenceProperty::new("owner", "person").with_allowed_features(["alice"]);
        let deps: Vec<String> = prop.dependencies().iter().map(ToString::to_string).collect();
        assert_eq!(
            deps,
            vec!["Feature:alice", "Model:person", "GenericProperty:owner"]
        );
        assert_eq!(prop.resource().to_string(), "RefProperty:owner");
    }

    #[test]
    fn primitive_property_depends_on_slot() {
        let prop = PrimitiveProperty::new("speed", DataType::Double);
        assert_eq!(
            prop.lock_set().len(),
            2,
            "own key plus generic slot"
        );
    }

    #[test]
    fn primitive_wire_format() {
        let prop = PrimitiveProperty::new("color", DataType::String)
            .with_cardinality(Cardinality::Set)
            .with_allowed_values(vec![Value::String("red".into())]);
        let json = serde_json::to_string(&prop).unwrap();
        assert!(json.contains("\"cardinality\":\"SET\""));
        let back: PrimitiveProperty = serde_json::from_str(&json).unwrap();
        assert_eq!(back, prop);
    }

    #[test]
    fn definition_accessors() {
        let def = PropertyDefinition::Reference(
            ReferenceProperty::new("owner", "person").with_cardinality(Cardinality::List),
        );
        assert_eq!(def.name(), "owner");
        assert_eq!(def.cardinality(), Cardinality::List);
    }
}
