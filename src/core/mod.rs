//! core
//!
//! Domain building blocks shared by the catalog and state layers.
//!
//! # Modules
//!
//! - [`types`] - Strong types: ResourceKey, ResourceKind, DataType, names
//! - [`resource`] - The dependency contract every entity implements
//! - [`lock`] - Leased locking over resource key sets
//! - [`graph`] - Model inheritance graphs and subtype checks
//! - [`schema`] - Schema resolution across inheritance levels
//! - [`cardinality`] - Applying values under SINGLE, SET and LIST rules
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - Resolution is deterministic for a given graph

pub mod cardinality;
pub mod config;
pub mod graph;
pub mod lock;
pub mod resource;
pub mod schema;
pub mod types;
