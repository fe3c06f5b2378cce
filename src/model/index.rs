//! model::index
//!
//! Index definitions over primitive properties.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::resource::DependencyResource;
use crate::core::types::{ResourceKey, ResourceKind};

/// What an index is built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    Vertex,
    Edge,
}

/// How the backing store builds the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexType {
    Composite,
    Mixed,
}

/// Registration state of one indexed property, as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexStatus {
    Installed,
    Registered,
    Enabled,
    Disabled,
}

/// A named index.
///
/// `property_index_status` is derived from the store on creation and on
/// read; it is ignored when an Index is supplied for creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Index {
    pub name: String,
    pub field_type: FieldType,
    pub index_type: IndexType,
    #[serde(default)]
    pub unique: bool,
    pub properties: Vec<String>,
    #[serde(default)]
    pub property_index_status: BTreeMap<String, IndexStatus>,
}

impl Index {
    pub fn new(name: impl Into<String>, field_type: FieldType, index_type: IndexType) -> Self {
        Self {
            name: name.into(),
            field_type,
            index_type,
            unique: false,
            properties: Vec::new(),
            property_index_status: BTreeMap::new(),
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn on(mut self, property: impl Into<String>) -> Self {
        self.properties.push(property.into());
        self
    }
}

impl DependencyResource for Index {
    fn resource(&self) -> ResourceKey {
        ResourceKey::new(ResourceKind::Index, &self.name)
    }

    fn dependencies(&self) -> BTreeSet<ResourceKey> {
        self.properties
            .iter()
            .map(|p| ResourceKey::new(ResourceKind::GenericProperty, p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_depends_on_each_property_slot() {
        let index = Index::new("by_name", FieldType::Vertex, IndexType::Composite)
            .unique()
            .on("name")
            .on("code");
        assert_eq!(index.dependencies().len(), 2);
        assert_eq!(index.resource().to_string(), "Index:by_name");
        assert!(index.unique);
    }

    #[test]
    fn wire_format_uses_uppercase_enums() {
        let index = Index::new("i", FieldType::Edge, IndexType::Mixed).on("p");
        let json = serde_json::to_string(&index).unwrap();
        assert!(json.contains("\"EDGE\""));
        assert!(json.contains("\"MIXED\""));
    }
}
