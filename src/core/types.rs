//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`ResourceKind`] / [`ResourceKey`] - Canonical identity of every governed entity
//! - [`Cardinality`] - How many values a property may hold
//! - [`DataType`] / [`Value`] - Closed sum type over supported scalars
//! - [`PropertyValue`] - A named value carried by a Feature, Model, View or Schema
//!
//! # Validation
//!
//! Names are validated at the catalog boundary. Names beginning with
//! [`RESERVED_PREFIX`] belong to the catalog itself and are only accepted
//! under [`NameGuard::DangerouslyAllowReserved`].
//!
//! # Examples
//!
//! ```
//! use schemagraph::core::types::{ResourceKey, ResourceKind};
//!
//! let key = ResourceKey::new(ResourceKind::Model, "vehicle");
//! assert_eq!(key.to_string(), "Model:vehicle");
//!
//! let parsed: ResourceKey = "Model:vehicle".parse().unwrap();
//! assert_eq!(parsed, key);
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Prefix of names owned by the catalog itself.
pub const RESERVED_PREFIX: &str = "__";

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("name '{0}' uses the reserved prefix '{RESERVED_PREFIX}'")]
    ReservedName(String),

    #[error("invalid resource key: {0}")]
    InvalidResourceKey(String),

    #[error("unknown resource kind: {0}")]
    UnknownKind(String),
}

/// Whether reserved names are accepted.
///
/// Only the install routine and property deletion use the override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameGuard {
    #[default]
    Enforce,
    DangerouslyAllowReserved,
}

/// Validate an entity name.
///
/// Names cannot be empty, cannot contain `:` (the resource-key separator)
/// or control characters, and cannot start with [`RESERVED_PREFIX`] unless
/// the guard allows it.
///
/// # Example
///
/// ```
/// use schemagraph::core::types::{validate_name, NameGuard, TypeError};
///
/// assert!(validate_name("color", NameGuard::Enforce).is_ok());
/// assert!(matches!(
///     validate_name("__internal", NameGuard::Enforce),
///     Err(TypeError::ReservedName(_))
/// ));
/// assert!(validate_name("__internal", NameGuard::DangerouslyAllowReserved).is_ok());
/// ```
pub fn validate_name(name: &str, guard: NameGuard) -> Result<(), TypeError> {
    if name.trim().is_empty() {
        return Err(TypeError::InvalidName("name cannot be empty".into()));
    }
    if name.contains(':') {
        return Err(TypeError::InvalidName(format!(
            "'{name}' cannot contain ':'"
        )));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(TypeError::InvalidName(format!(
            "'{}' cannot contain control characters",
            name.escape_debug()
        )));
    }
    if guard == NameGuard::Enforce && name.starts_with(RESERVED_PREFIX) {
        return Err(TypeError::ReservedName(name.to_string()));
    }
    Ok(())
}

/// Kind of a governed entity.
///
/// `GenericProperty` is a placeholder used only in dependency declarations.
/// It names the shared primitive/reference property namespace and must be
/// resolved to `PrimProperty` or `RefProperty` before a record is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Index,
    Feature,
    Model,
    ModelSchema,
    ViewSchema,
    FeatureSchema,
    View,
    RefProperty,
    PrimProperty,
    GenericProperty,
}

impl ResourceKind {
    /// All kinds, in declaration order.
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Index,
        ResourceKind::Feature,
        ResourceKind::Model,
        ResourceKind::ModelSchema,
        ResourceKind::ViewSchema,
        ResourceKind::FeatureSchema,
        ResourceKind::View,
        ResourceKind::RefProperty,
        ResourceKind::PrimProperty,
        ResourceKind::GenericProperty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Index => "Index",
            ResourceKind::Feature => "Feature",
            ResourceKind::Model => "Model",
            ResourceKind::ModelSchema => "ModelSchema",
            ResourceKind::ViewSchema => "ViewSchema",
            ResourceKind::FeatureSchema => "FeatureSchema",
            ResourceKind::View => "View",
            ResourceKind::RefProperty => "RefProperty",
            ResourceKind::PrimProperty => "PrimProperty",
            ResourceKind::GenericProperty => "GenericProperty",
        }
    }

    /// Whether this kind names a property definition (concrete or generic).
    pub fn is_property(&self) -> bool {
        matches!(
            self,
            ResourceKind::RefProperty | ResourceKind::PrimProperty | ResourceKind::GenericProperty
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TypeError::UnknownKind(s.to_string()))
    }
}

/// Canonical `(kind, name)` key of a governed entity.
///
/// Renders to the stable string `Kind:name`, which is also its serialized
/// form. Keys are totally ordered so dependency sets are deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceKey {
    kind: ResourceKind,
    name: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The same name under a different kind.
    ///
    /// Used to resolve a `GenericProperty` slot to a concrete property kind.
    pub fn with_kind(&self, kind: ResourceKind) -> Self {
        Self::new(kind, self.name.clone())
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

impl FromStr for ResourceKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once(':')
            .ok_or_else(|| TypeError::InvalidResourceKey(s.to_string()))?;
        if name.is_empty() {
            return Err(TypeError::InvalidResourceKey(s.to_string()));
        }
        Ok(Self::new(kind.parse()?, name))
    }
}

impl TryFrom<String> for ResourceKey {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ResourceKey> for String {
    fn from(key: ResourceKey) -> Self {
        key.to_string()
    }
}

/// How many values a property may hold and how duplicates are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Cardinality {
    #[default]
    Single,
    Set,
    List,
}

impl Cardinality {
    /// Whether more than one value may be stored under one name.
    pub fn is_multi_valued(&self) -> bool {
        !matches!(self, Cardinality::Single)
    }
}

/// Scalar type of a primitive property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Boolean,
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    Character,
    Date,
    GeoShape,
    Uuid,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Byte => "byte",
            DataType::Short => "short",
            DataType::Integer => "integer",
            DataType::Long => "long",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::Character => "character",
            DataType::Date => "date",
            DataType::GeoShape => "geo_shape",
            DataType::Uuid => "uuid",
        };
        f.write_str(name)
    }
}

/// A geographic shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum GeoShape {
    Point { lat: f64, lon: f64 },
    Circle { lat: f64, lon: f64, radius: f64 },
    Box {
        south_west: (f64, f64),
        north_east: (f64, f64),
    },
}

impl GeoShape {
    fn is_finite(&self) -> bool {
        match *self {
            GeoShape::Point { lat, lon } => lat.is_finite() && lon.is_finite(),
            GeoShape::Circle { lat, lon, radius } => {
                lat.is_finite() && lon.is_finite() && radius.is_finite()
            }
            GeoShape::Box {
                south_west,
                north_east,
            } => [south_west.0, south_west.1, north_east.0, north_east.1]
                .iter()
                .all(|c| c.is_finite()),
        }
    }
}

/// A property value.
///
/// Scalars are tagged explicitly in the wire format so a value always
/// carries its runtime type. `Reference` holds the id of a Feature.
///
/// # Example
///
/// ```
/// use schemagraph::core::types::{DataType, Value};
///
/// let v = Value::Integer(7);
/// assert_eq!(v.data_type(), Some(DataType::Integer));
/// assert_eq!(serde_json::to_string(&v).unwrap(), r#"{"type":"integer","value":7}"#);
///
/// let r = Value::Reference("car-1".into());
/// assert_eq!(r.data_type(), None);
/// assert_eq!(r.as_reference(), Some("car-1"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    String(String),
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Character(char),
    Date(DateTime<Utc>),
    GeoShape(GeoShape),
    Uuid(Uuid),
    Reference(String),
}

impl Value {
    /// Scalar type of this value, or `None` for references.
    pub fn data_type(&self) -> Option<DataType> {
        let dt = match self {
            Value::String(_) => DataType::String,
            Value::Boolean(_) => DataType::Boolean,
            Value::Byte(_) => DataType::Byte,
            Value::Short(_) => DataType::Short,
            Value::Integer(_) => DataType::Integer,
            Value::Long(_) => DataType::Long,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::Character(_) => DataType::Character,
            Value::Date(_) => DataType::Date,
            Value::GeoShape(_) => DataType::GeoShape,
            Value::Uuid(_) => DataType::Uuid,
            Value::Reference(_) => return None,
        };
        Some(dt)
    }

    /// False for NaN or infinite floats and shape coordinates, which JSON
    /// cannot represent.
    pub fn is_finite(&self) -> bool {
        match self {
            Value::Float(n) => n.is_finite(),
            Value::Double(n) => n.is_finite(),
            Value::GeoShape(shape) => shape.is_finite(),
            _ => true,
        }
    }

    /// The referenced Feature id, if this is a reference.
    pub fn as_reference(&self) -> Option<&str> {
        match self {
            Value::Reference(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Byte(n) => write!(f, "{n}"),
            Value::Short(n) => write!(f, "{n}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Long(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Double(n) => write!(f, "{n}"),
            Value::Character(c) => write!(f, "{c:?}"),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Value::GeoShape(g) => write!(f, "{g:?}"),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Reference(id) => write!(f, "-> {id}"),
        }
    }
}

/// A named property value.
///
/// A missing `value` is a null; nulls never satisfy a required key and
/// null defaults are never applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PropertyValue {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
        }
    }

    pub fn null(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Shorthand for a reference to a Feature.
    pub fn reference(name: impl Into<String>, feature_id: impl Into<String>) -> Self {
        Self::new(name, Value::Reference(feature_id.into()))
    }

    /// The referenced Feature id, if this value is a reference.
    pub fn reference_target(&self) -> Option<&str> {
        self.value.as_ref().and_then(Value::as_reference)
    }
}
