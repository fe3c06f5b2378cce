//! schemagraph - A schema-governed catalog over a graph store
//!
//! schemagraph keeps Properties, Schemas, Models, Features, Views and
//! Indices as typed vertices in a graph store. Every write is checked
//! against the schemas in force, serialized against conflicting writers
//! through leased resource locks, and linked into the graph with edges to
//! everything it depends on.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture:
//!
//! - [`core`] - Resource keys, locking, inheritance graphs, schema
//!   resolution, cardinality rules and configuration
//! - [`model`] - Serializable catalog entities and their dependencies
//! - [`store`] - The graph store interface and an in-memory backend
//! - [`catalog`] - Validated create, read and delete for every entity kind
//! - [`state`] - Export to and import from a directory of state files
//!
//! # Correctness Invariants
//!
//! schemagraph maintains the following invariants:
//!
//! 1. An entity is only written while its resource and every dependency
//!    are locked
//! 2. Stored values always satisfy the owning schema's type and
//!    cardinality rules
//! 3. A referenced entity cannot be deleted
//! 4. A Feature reference always points to a Feature of a subtype of the
//!    declared target Model

pub mod catalog;
pub mod core;
pub mod model;
pub mod state;
pub mod store;
