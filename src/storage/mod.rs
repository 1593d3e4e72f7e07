//! Storage Layer - SQLite-backed persistence
//!
//! The store is a black box reached through a connection descriptor:
//! statements go in, rows come out, and writes become durable on commit.

pub mod descriptor;
pub mod sqlite;

pub use descriptor::Descriptor;
pub use sqlite::{RowSet, SqliteStore, Statement, SQL_TARGET};
