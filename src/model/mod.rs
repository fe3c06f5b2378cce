//! model
//!
//! Catalog entity types.
//!
//! # Modules
//!
//! - [`property`] - Primitive and reference property definitions
//! - [`entity`] - Models, Features and Views
//! - [`index`] - Index definitions
//!
//! Every entity implements
//! [`DependencyResource`](crate::core::resource::DependencyResource) and
//! round-trips through serde. [`CatalogObject`] is the self-describing
//! wrapper used in exported state files.
//!
//! # Example
//!
//! ```
//! use schemagraph::model::{CatalogObject, Model};
//! use schemagraph::core::resource::DependencyResource;
//!
//! let object = CatalogObject::Model(Model::new("car", "vehicle-schema"));
//! let json = serde_json::to_string(&object).unwrap();
//! let back: CatalogObject = serde_json::from_str(&json).unwrap();
//! assert_eq!(back.resource().to_string(), "Model:car");
//! ```

pub mod entity;
pub mod index;
pub mod property;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub use entity::{Feature, Model, NewFeature, View};
pub use index::{FieldType, Index, IndexStatus, IndexType};
pub use property::{PrimitiveProperty, PropertyDefinition, ReferenceProperty};

use crate::core::resource::DependencyResource;
use crate::core::schema::Schema;
use crate::core::types::ResourceKey;

/// Any catalog entity, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "object", rename_all = "snake_case")]
pub enum CatalogObject {
    PrimProperty(PrimitiveProperty),
    RefProperty(ReferenceProperty),
    Schema(Schema),
    Model(Model),
    Feature(Feature),
    View(View),
    Index(Index),
}

impl DependencyResource for CatalogObject {
    fn resource(&self) -> ResourceKey {
        match self {
            CatalogObject::PrimProperty(p) => p.resource(),
            CatalogObject::RefProperty(r) => r.resource(),
            CatalogObject::Schema(s) => s.resource(),
            CatalogObject::Model(m) => m.resource(),
            CatalogObject::Feature(f) => f.resource(),
            CatalogObject::View(v) => v.resource(),
            CatalogObject::Index(i) => i.resource(),
        }
    }

    fn dependencies(&self) -> BTreeSet<ResourceKey> {
        match self {
            CatalogObject::PrimProperty(p) => p.dependencies(),
            CatalogObject::RefProperty(r) => r.dependencies(),
            CatalogObject::Schema(s) => s.dependencies(),
            CatalogObject::Model(m) => m.dependencies(),
            CatalogObject::Feature(f) => f.dependencies(),
            CatalogObject::View(v) => v.dependencies(),
            CatalogObject::Index(i) => i.dependencies(),
        }
    }
}
