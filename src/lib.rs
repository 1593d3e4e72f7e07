//! # Rowkeeper - a small unit-of-work ORM over SQLite
//!
//! Rowkeeper maps typed records onto a single-file SQLite store.
//!
//! Rowkeeper provides:
//! - A schema registry that declares entity shapes and materializes tables
//! - A thin SQLite store adapter with explicit transaction boundaries
//! - A session with an identity map, change tracking and ordered flushes
//! - A query builder with filters, joins and one/first/all terminals
//! - Lazy, bidirectional relationship navigation with delete policies

pub mod value;
pub mod entity;
pub mod schema;
pub mod storage;
pub mod query;
pub mod session;
pub mod engine;
pub mod models;
pub mod demo;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use value::{Value, FromValue};
pub use entity::{Entity, Record};
pub use schema::{EntityShape, FieldDef, ForeignKey, OnDelete, RelationshipDef, SchemaRegistry, SqlType};
pub use storage::{Descriptor, SqliteStore};
pub use query::{Column, Expr, Results, Select, select, select_pair, and_, or_};
pub use session::{Key, ManyToOne, ObjectState, OneToMany, Session, SessionState};
pub use engine::{Engine, EngineConfig};
pub use models::{Hero, ModelOptions, Team};

/// Result type alias for Rowkeeper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Rowkeeper operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot connect to {descriptor}: {reason}")]
    Connection { descriptor: String, reason: String },

    #[error("Invalid connection descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Integrity error: {detail}")]
    Integrity { detail: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("No row was found for {0}")]
    NotFound(String),

    #[error("Multiple rows were found for {entity} when exactly one was required ({count} rows)")]
    MultipleResults { entity: String, count: usize },

    #[error("Instance {0} is not bound to this session")]
    Detached(String),

    #[error("Instance {0} is not persistent within this session")]
    NotPersistent(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Identity {entity}#{id} is already present in this session")]
    IdentityConflict { entity: String, id: i64 },

    #[error("No foreign key relationship between {from} and {to}")]
    NoRelationship { from: String, to: String },

    #[error("More than one foreign key relationship between {from} and {to}; use an explicit join condition")]
    AmbiguousRelationship { from: String, to: String },

    #[error("Entity {0} is already declared")]
    DuplicateEntity(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Cannot convert {field}: {reason}")]
    Conversion { field: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
