//! Configuration for database files, their engines and their sessions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::component::{ComponentBuilder, DatabaseComponent};
use crate::database::DatabaseFile;
use crate::schema::{Schema, TableDefinition, TableRegistry};

/// SQLite journal mode applied to the engine's primary connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    #[default]
    Delete,
    Truncate,
    Persist,
    Memory,
    Wal,
    Off,
}

impl JournalMode {
    pub fn as_str(self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Persist => "PERSIST",
            JournalMode::Memory => "MEMORY",
            JournalMode::Wal => "WAL",
            JournalMode::Off => "OFF",
        }
    }
}

/// Options every connection of an engine is opened with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
    pub foreign_keys: bool,
    pub read_only: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            journal_mode: JournalMode::Delete,
            foreign_keys: true,
            read_only: false,
        }
    }
}

impl EngineOptions {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Per-session overrides of the engine options. Unset fields fall back to
/// the engine's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub read_only: Option<bool>,
    pub busy_timeout_ms: Option<u64>,
    pub foreign_keys: Option<bool>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    pub fn busy_timeout_ms(mut self, millis: u64) -> Self {
        self.busy_timeout_ms = Some(millis);
        self
    }

    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = Some(enabled);
        self
    }
}

/// Database file configuration
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: Option<PathBuf>,
    /// Schema bootstrapped by `create_file`
    pub schema: Schema,
    /// Registry entries added on top of the schema's own tables
    pub tables: TableRegistry,
    /// Create the file (then close it) during construction
    pub create: bool,
    /// Open the file during construction
    pub open: bool,
    pub engine: EngineOptions,
    pub session: SessionOptions,
    pub async_session: SessionOptions,
    /// Components built and attached during construction, in order
    pub components: Vec<ComponentBuilder>,
}

impl DatabaseConfig {
    /// Create a new config with path and schema
    pub fn new(path: impl Into<PathBuf>, schema: Schema) -> Self {
        Self {
            path: Some(path.into()),
            schema,
            ..Self::default()
        }
    }

    /// Registers a table under an additional name.
    pub fn with_table(mut self, name: impl Into<String>, table: TableDefinition) -> Self {
        self.tables.insert(name.into(), Arc::new(table));
        self
    }

    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn with_open(mut self, open: bool) -> Self {
        self.open = open;
        self
    }

    pub fn with_engine(mut self, engine: EngineOptions) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }

    pub fn with_async_session(mut self, session: SessionOptions) -> Self {
        self.async_session = session;
        self
    }

    /// Attaches a component under `name`, built from the new handle.
    pub fn with_component<C, F>(mut self, name: impl Into<String>, build: F) -> Self
    where
        C: DatabaseComponent + 'static,
        F: Fn(&Arc<DatabaseFile>) -> C + Send + Sync + 'static,
    {
        self.components.push(ComponentBuilder::new(name, build));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_options_builder() {
        let options = SessionOptions::new().read_only(true).busy_timeout_ms(10);
        assert_eq!(options.read_only, Some(true));
        assert_eq!(options.busy_timeout_ms, Some(10));
        assert_eq!(options.foreign_keys, None);
        assert_eq!(SessionOptions::new(), SessionOptions::default());
    }

    #[test]
    fn test_engine_options_deserialize_with_defaults() {
        let options: EngineOptions = serde_json::from_str(r#"{"journal_mode": "wal"}"#).unwrap();
        assert_eq!(options.journal_mode, JournalMode::Wal);
        assert_eq!(options.busy_timeout(), Duration::from_secs(5));
        assert!(options.foreign_keys);
    }
}
