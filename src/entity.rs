//! Entity trait and the untyped record it maps to

use std::collections::BTreeMap;
use std::fmt;
use crate::schema::EntityShape;
use crate::value::{FromValue, Value};
use crate::Result;

/// Column values of one row, keyed by field name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    values: BTreeMap<&'static str, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &'static str, value: impl Into<Value>) {
        self.values.insert(field, value.into());
    }

    /// Raw value of a field; missing fields read as NULL
    pub fn value(&self, field: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(field).unwrap_or(&NULL)
    }

    /// Typed read of a field
    pub fn get<T: FromValue>(&self, field: &str) -> Result<T> {
        T::from_value(field, self.value(field))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// Fields whose value differs from `other`
    pub fn diff(&self, other: &Record) -> Vec<&'static str> {
        let mut changed: Vec<&'static str> = self
            .values
            .iter()
            .filter(|(k, v)| other.value(k) != *v)
            .map(|(k, _)| *k)
            .collect();
        for k in other.values.keys() {
            if !self.values.contains_key(k) && !other.value(k).is_null() {
                changed.push(*k);
            }
        }
        changed
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.values.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// A typed row mapped to one table.
///
/// Implementors are plain values; the session keeps the authoritative copy
/// and hands out snapshots through [`crate::Session::entity`].
pub trait Entity: Sized + 'static {
    /// Table (and entity) name
    const TABLE: &'static str;

    /// Default declared shape of this entity
    fn shape() -> EntityShape;

    /// Current field values, including the primary key (NULL when unassigned)
    fn to_record(&self) -> Record;

    /// Rebuild a value from a stored or in-memory record
    fn from_record(record: &Record) -> Result<Self>;
}
