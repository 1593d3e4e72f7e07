//! Schema Registry - declared entity shapes and their physical tables
//!
//! Every entity declares its fields (type, nullability, primary key, index,
//! foreign key with an on-delete policy) and its navigable relationships.
//! The registry validates cross references, orders entities so principals
//! precede dependents, and creates missing tables and indexes.

pub mod ddl;
pub mod registry;
pub mod shape;

pub use registry::{Dependent, JoinPath, SchemaRegistry};
pub use shape::{EntityShape, FieldDef, ForeignKey, OnDelete, RelationshipDef, RelationshipKind, SqlType};
