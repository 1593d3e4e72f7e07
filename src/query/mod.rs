//! Query Builder - filters, joins and result terminals
//!
//! Queries are built against declared columns, translated to SQL by the
//! schema registry and executed by a session, which materializes every row
//! through its identity map.

pub mod expr;
pub mod select;

pub use expr::{BinaryOp, Column, Expr, UnaryOp, and_, or_};
pub use select::{Select, select, select_pair};

use crate::{Error, Result};

/// Materialized rows of an executed query.
#[derive(Debug, Clone)]
pub struct Results<T> {
    entity: &'static str,
    rows: Vec<T>,
}

impl<T> Results<T> {
    pub(crate) fn new(entity: &'static str, rows: Vec<T>) -> Self {
        Self { entity, rows }
    }

    /// Every row, in store order unless the query asked for one
    pub fn all(self) -> Vec<T> {
        self.rows
    }

    /// Exactly one row
    pub fn one(self) -> Result<T> {
        let mut rows = self.rows;
        match rows.len() {
            0 => Err(Error::NotFound(self.entity.to_string())),
            1 => Ok(rows.remove(0)),
            count => Err(Error::MultipleResults {
                entity: self.entity.to_string(),
                count,
            }),
        }
    }

    /// The first row, if any
    pub fn first(self) -> Option<T> {
        self.rows.into_iter().next()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }
}

impl<T> IntoIterator for Results<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
