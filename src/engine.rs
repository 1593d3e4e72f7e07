//! Engine - descriptor, frozen schema and session factory

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::schema::SchemaRegistry;
use crate::session::Session;
use crate::storage::{Descriptor, SqliteStore};
use crate::{Error, Result};

/// Engine-wide settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log every statement at info level
    pub echo: bool,
    /// Expire persistent instances after each commit
    pub expire_on_commit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            echo: false,
            expire_on_commit: true,
        }
    }
}

/// Entry point: owns the connection descriptor and the declared schema.
///
/// Sessions opened by one engine share its schema. For in-memory
/// descriptors the engine keeps a connection open so the database lives as
/// long as the engine does.
pub struct Engine {
    descriptor: Descriptor,
    schema: Arc<SchemaRegistry>,
    config: EngineConfig,
    keepalive: Option<SqliteStore>,
}

impl Engine {
    /// Create an engine from a `sqlite://` descriptor
    pub fn new(descriptor: &str, schema: SchemaRegistry, config: EngineConfig) -> Result<Self> {
        Self::from_descriptor(Descriptor::parse(descriptor)?, schema, config)
    }

    pub fn from_descriptor(descriptor: Descriptor, schema: SchemaRegistry, config: EngineConfig) -> Result<Self> {
        schema.validate()?;
        let keepalive = if descriptor.is_memory() {
            Some(SqliteStore::connect(&descriptor, false)?)
        } else {
            None
        };
        tracing::debug!("Engine created for {} ({} entities)", descriptor, schema.len());
        Ok(Self {
            descriptor,
            schema: Arc::new(schema),
            config,
            keepalive,
        })
    }

    /// Open a raw store connection
    pub fn connect(&self) -> Result<SqliteStore> {
        SqliteStore::connect(&self.descriptor, self.config.echo)
    }

    /// Create every declared table and index that does not exist yet
    pub fn create_all(&self) -> Result<()> {
        match &self.keepalive {
            Some(store) => self.schema.materialize(store),
            None => self.schema.materialize(&self.connect()?),
        }
    }

    /// Open a new session with its own connection
    pub fn session(&self) -> Result<Session> {
        let store = self.connect()?;
        Ok(Session::new(Arc::clone(&self.schema), store, self.config.expire_on_commit))
    }

    /// Run `f` in a fresh session, closing it on every exit path
    pub fn with_session<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut Session) -> std::result::Result<T, E>,
    {
        let mut session = self.session()?;
        let result = f(&mut session);
        let closed = session.close();
        let value = result?;
        closed?;
        Ok(value)
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Hero, ModelOptions};
    use tempfile::TempDir;

    #[test]
    fn test_memory_engine_shares_data_between_sessions() {
        let engine = Engine::new("sqlite://", ModelOptions::default().registry().unwrap(), EngineConfig::default()).unwrap();
        engine.create_all().unwrap();

        engine
            .with_session(|s| {
                s.add(Hero::new("Deadpond", "Dive Wilson"))?;
                s.commit()
            })
            .unwrap();

        let count = engine
            .with_session(|s| Ok::<_, Error>(s.exec(&crate::select::<Hero>())?.len()))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_create_all_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.db");
        let engine = Engine::from_descriptor(
            Descriptor::file(&path),
            ModelOptions::default().registry().unwrap(),
            EngineConfig::default(),
        )
        .unwrap();
        engine.create_all().unwrap();
        engine.create_all().unwrap();

        let tables = engine.connect().unwrap().table_names().unwrap();
        assert_eq!(tables, vec!["hero".to_string(), "team".to_string()]);
    }

    #[test]
    fn test_with_session_closes_on_error() {
        let engine = Engine::new("sqlite://", ModelOptions::default().registry().unwrap(), EngineConfig::default()).unwrap();
        engine.create_all().unwrap();
        let result: Result<()> = engine.with_session(|_| Err(Error::NotFound("hero".into())));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
