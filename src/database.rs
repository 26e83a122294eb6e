//! The database file handle: owns the path, the schema, the table registry,
//! and the paired blocking/cooperative engines with their session factories.
//!
//! # Lifecycle
//!
//! A handle starts closed. [`DatabaseFile::create_file`] bootstraps the
//! schema without leaving the handle open; [`DatabaseFile::open`] builds both
//! engines and both session factories; [`DatabaseFile::close`] (or
//! [`DatabaseFile::close_async`]) disposes them. Opening an open handle
//! rebuilds its engines.
//!
//! Components attached to a handle live in its component registry. They
//! point back at the handle weakly, so the handle owns them and not the
//! other way round.
//!
//! The engine and factory slots are shared mutable state. Callers must not
//! open or close a handle while other threads are creating sessions from it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::component::DatabaseComponent;
use crate::config::{DatabaseConfig, EngineOptions, SessionOptions};
use crate::engine::{AsyncEngine, AsyncSessionFactory, Engine, SessionFactory};
use crate::error::{DatabaseError, Result};
use crate::schema::{Schema, TableDefinition, TableRegistry};
use crate::session::{AsyncSession, AsyncUnitOfWork, Session};

#[derive(Debug, Default)]
struct FileState {
    path: Option<PathBuf>,
    schema: Schema,
    tables: TableRegistry,
    engine_options: EngineOptions,
    session_options: SessionOptions,
    async_session_options: SessionOptions,
    engine: Option<Engine>,
    async_engine: Option<AsyncEngine>,
    session_factory: Option<SessionFactory>,
    async_session_factory: Option<AsyncSessionFactory>,
}

impl FileState {
    fn is_open(&self) -> bool {
        self.engine.is_some() && self.async_engine.is_some()
    }

    fn require_path(&self) -> Result<PathBuf> {
        self.path.clone().ok_or(DatabaseError::NoPath)
    }
}

/// Serializable snapshot of a handle. Live engines are never captured;
/// restoring re-opens the handle if it was open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseState {
    pub path: Option<PathBuf>,
    pub schema: Schema,
    pub tables: BTreeMap<String, TableDefinition>,
    pub engine: EngineOptions,
    pub session: SessionOptions,
    pub async_session: SessionOptions,
    pub is_open: bool,
}

/// Components attached to a handle, by name.
pub type ComponentRegistry = BTreeMap<String, Arc<dyn DatabaseComponent>>;

/// A SQLite database file, its engines and its components.
#[derive(Debug)]
pub struct DatabaseFile {
    state: RwLock<FileState>,
    components: RwLock<ComponentRegistry>,
}

impl DatabaseFile {
    /// Builds a handle from `config`, creating and/or opening the file as
    /// requested, then attaches the configured components.
    ///
    /// Each component's `build` runs as it is attached. Once all are
    /// attached and the handle is open, `build_tables` runs on every
    /// component if the file was just created, then `load`.
    pub fn new(config: DatabaseConfig) -> Result<Arc<Self>> {
        let mut tables = config.schema.registry();
        tables.extend(config.tables);

        let file = Arc::new(Self {
            state: RwLock::new(FileState {
                path: config.path,
                schema: config.schema,
                tables,
                engine_options: config.engine,
                session_options: config.session,
                async_session_options: config.async_session,
                ..FileState::default()
            }),
            components: RwLock::default(),
        });

        if config.create {
            file.create_file(None, None)?;
        }
        if config.open {
            file.open(None)?;
        }

        for builder in &config.components {
            let component = builder.instantiate(&file);
            component.build()?;
            file.add_component(builder.name(), component);
        }
        if !config.components.is_empty() && file.is_open() {
            if config.create {
                file.build_component_tables()?;
            }
            file.load_components()?;
        }
        Ok(file)
    }

    /// Restores a handle from a snapshot, re-opening it if it was open.
    pub fn from_state(state: DatabaseState) -> Result<Arc<Self>> {
        let file = Arc::new(Self {
            state: RwLock::new(FileState {
                path: state.path,
                schema: state.schema,
                tables: state
                    .tables
                    .into_iter()
                    .map(|(name, table)| (name, Arc::new(table)))
                    .collect(),
                engine_options: state.engine,
                session_options: state.session,
                async_session_options: state.async_session,
                ..FileState::default()
            }),
            components: RwLock::default(),
        });
        if state.is_open {
            file.open(None)?;
        }
        Ok(file)
    }

    /// Snapshot of everything needed to rebuild this handle. Components are
    /// not part of it.
    pub fn state(&self) -> DatabaseState {
        let s = self.read();
        DatabaseState {
            path: s.path.clone(),
            schema: s.schema.clone(),
            tables: s
                .tables
                .iter()
                .map(|(name, table)| (name.clone(), table.as_ref().clone()))
                .collect(),
            engine: s.engine_options.clone(),
            session: s.session_options.clone(),
            async_session: s.async_session_options.clone(),
            is_open: s.is_open(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, FileState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FileState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.read().path.clone()
    }

    /// Sets the file path. Takes effect the next time engines are built.
    pub fn set_path(&self, path: impl AsRef<Path>) {
        self.write().path = Some(path.as_ref().to_path_buf());
    }

    pub fn schema(&self) -> Schema {
        self.read().schema.clone()
    }

    pub fn set_schema(&self, schema: Schema) {
        self.write().schema = schema;
    }

    pub fn engine_options(&self) -> EngineOptions {
        self.read().engine_options.clone()
    }

    /// Adds a table to the schema and registers it under its own name.
    pub fn add_table(&self, table: TableDefinition) {
        let mut s = self.write();
        s.tables.insert(table.name.clone(), Arc::new(table.clone()));
        s.schema.tables.push(table);
    }

    /// Registers `table` under `name` without touching the schema.
    pub fn register_table(&self, name: impl Into<String>, table: Arc<TableDefinition>) {
        self.write().tables.insert(name.into(), table);
    }

    pub fn tables(&self) -> TableRegistry {
        self.read().tables.clone()
    }

    /// Looks up a registered table by name.
    pub fn table(&self, name: &str) -> Result<Arc<TableDefinition>> {
        self.read()
            .tables
            .get(name)
            .cloned()
            .ok_or_else(|| DatabaseError::TableNotFound(name.to_string()))
    }

    pub fn is_open(&self) -> bool {
        self.read().is_open()
    }

    fn read_components(&self) -> RwLockReadGuard<'_, ComponentRegistry> {
        self.components.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attaches `component` under `name`, returning any component it
    /// replaces.
    pub fn add_component(
        &self,
        name: impl Into<String>,
        component: Arc<dyn DatabaseComponent>,
    ) -> Option<Arc<dyn DatabaseComponent>> {
        self.components
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), component)
    }

    pub fn remove_component(&self, name: &str) -> Option<Arc<dyn DatabaseComponent>> {
        self.components
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Looks up an attached component by name.
    pub fn component(&self, name: &str) -> Result<Arc<dyn DatabaseComponent>> {
        self.read_components()
            .get(name)
            .cloned()
            .ok_or_else(|| DatabaseError::ComponentNotFound(name.to_string()))
    }

    pub fn components(&self) -> ComponentRegistry {
        self.read_components().clone()
    }

    /// Runs `load` on every attached component, in name order.
    pub fn load_components(&self) -> Result<()> {
        for component in self.components().values() {
            component.load()?;
        }
        Ok(())
    }

    /// Runs `build_tables` on every attached component, in name order.
    pub fn build_component_tables(&self) -> Result<()> {
        for component in self.components().values() {
            component.build_tables()?;
        }
        Ok(())
    }

    /// Points the handle at `path`. Returns `true` when the handle is still
    /// open on the previous file and must be closed.
    fn retarget(&self, path: PathBuf) -> bool {
        let mut s = self.write();
        if s.path.as_deref() == Some(path.as_path()) {
            return false;
        }
        s.path = Some(path);
        s.is_open()
    }

    /// Creates the file and every table in the schema.
    ///
    /// Reuses the open engine when the path is unchanged; otherwise a
    /// temporary engine is built and disposed again, leaving the handle
    /// closed.
    pub fn create_file(&self, path: Option<PathBuf>, options: Option<EngineOptions>) -> Result<()> {
        if let Some(path) = path {
            if self.retarget(path) {
                self.close();
            }
        }
        if let Some(options) = options {
            self.write().engine_options = options;
        }

        let (sql, engine, path, engine_options) = {
            let s = self.read();
            (
                s.schema.create_all_sql()?,
                s.engine.clone(),
                s.require_path()?,
                s.engine_options.clone(),
            )
        };

        match engine {
            Some(engine) => engine.execute(|conn| Ok(conn.execute_batch(&sql)?))?,
            None => {
                let engine = Engine::new(&path, engine_options)?;
                let created = engine.execute(|conn| Ok(conn.execute_batch(&sql)?));
                engine.dispose()?;
                created?;
            }
        }
        info!(path = %path.display(), "created database file");
        Ok(())
    }

    /// Cooperative counterpart of [`create_file`](Self::create_file).
    pub async fn create_file_async(
        &self,
        path: Option<PathBuf>,
        options: Option<EngineOptions>,
    ) -> Result<()> {
        if let Some(path) = path {
            if self.retarget(path) {
                self.close_async().await;
            }
        }
        if let Some(options) = options {
            self.write().engine_options = options;
        }

        let (sql, engine, path, engine_options) = {
            let s = self.read();
            (
                s.schema.create_all_sql()?,
                s.async_engine.clone(),
                s.require_path()?,
                s.engine_options.clone(),
            )
        };

        match engine {
            Some(engine) => {
                engine
                    .begin(move |conn| Ok(conn.execute_batch(&sql)?))
                    .await?
            }
            None => {
                let engine = AsyncEngine::new(&path, engine_options)?;
                let created = engine
                    .begin(move |conn| Ok(conn.execute_batch(&sql)?))
                    .await;
                engine.dispose().await?;
                created?;
            }
        }
        info!(path = %path.display(), "created database file");
        Ok(())
    }

    /// Builds both engines on the current path, replacing any existing ones.
    pub fn create_engine(&self, options: Option<EngineOptions>) -> Result<()> {
        let mut s = self.write();
        if let Some(options) = options {
            s.engine_options = options;
        }
        let path = s.require_path()?;
        let engine = Engine::new(&path, s.engine_options.clone())?;
        let async_engine = AsyncEngine::new(&path, s.engine_options.clone())?;
        if s.is_open() {
            debug!(path = %path.display(), "replacing open engines");
        }
        s.engine = Some(engine);
        s.async_engine = Some(async_engine);
        Ok(())
    }

    /// Opens the file: builds both engines and both session factories.
    ///
    /// Safe to call again to rebuild the engines with new options.
    pub fn open(&self, options: Option<EngineOptions>) -> Result<&Self> {
        self.create_engine(options)?;
        self.build_session_factory(None)?;
        self.build_async_session_factory(None)?;
        info!(path = ?self.path(), "opened database file");
        Ok(self)
    }

    /// Closes the file. Returns `true` once the blocking engine is gone,
    /// which includes closing an already closed handle.
    ///
    /// Blocks until async work already running on the async engine's
    /// connection finishes. Prefer [`close_async`](Self::close_async) from
    /// async code so the runtime thread is not held meanwhile.
    pub fn close(&self) -> bool {
        let (engine, async_engine) = self.take_engines();
        let was_open = engine.is_some() || async_engine.is_some();
        if let Some(engine) = engine {
            if let Err(e) = engine.dispose() {
                warn!(error = %e, "failed to dispose engine");
            }
        }
        if let Some(engine) = async_engine {
            if let Err(e) = engine.dispose_blocking() {
                warn!(error = %e, "failed to dispose async engine");
            }
        }
        if was_open {
            info!(path = ?self.path(), "closed database file");
        }
        self.read().engine.is_none()
    }

    /// Cooperative counterpart of [`close`](Self::close).
    pub async fn close_async(&self) -> bool {
        let (engine, async_engine) = self.take_engines();
        let was_open = engine.is_some() || async_engine.is_some();
        if let Some(engine) = engine {
            if let Err(e) = engine.dispose() {
                warn!(error = %e, "failed to dispose engine");
            }
        }
        if let Some(engine) = async_engine {
            if let Err(e) = engine.dispose().await {
                warn!(error = %e, "failed to dispose async engine");
            }
        }
        if was_open {
            info!(path = ?self.path(), "closed database file");
        }
        self.read().engine.is_none()
    }

    fn take_engines(&self) -> (Option<Engine>, Option<AsyncEngine>) {
        let mut s = self.write();
        s.session_factory = None;
        s.async_session_factory = None;
        (s.engine.take(), s.async_engine.take())
    }

    /// Rebuilds the blocking session factory, optionally with new defaults.
    pub fn build_session_factory(&self, options: Option<SessionOptions>) -> Result<SessionFactory> {
        let mut s = self.write();
        if let Some(options) = options {
            s.session_options = options;
        }
        let engine = s.engine.clone().ok_or(DatabaseError::NotOpen)?;
        let factory = SessionFactory::new(engine, s.session_options.clone());
        s.session_factory = Some(factory.clone());
        Ok(factory)
    }

    /// Rebuilds the cooperative session factory, optionally with new defaults.
    pub fn build_async_session_factory(
        &self,
        options: Option<SessionOptions>,
    ) -> Result<AsyncSessionFactory> {
        let mut s = self.write();
        if let Some(options) = options {
            s.async_session_options = options;
        }
        let engine = s.async_engine.clone().ok_or(DatabaseError::NotOpen)?;
        let factory = AsyncSessionFactory::new(engine, s.async_session_options.clone());
        s.async_session_factory = Some(factory.clone());
        Ok(factory)
    }

    /// Creates a blocking session.
    ///
    /// Without overrides the session comes from the session factory; with
    /// overrides a one-off session is opened on the engine using exactly
    /// those overrides.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NotOpen`] if the handle is closed.
    pub fn create_session(&self, overrides: Option<SessionOptions>) -> Result<Session> {
        let (factory, engine) = {
            let s = self.read();
            if !s.is_open() {
                return Err(DatabaseError::NotOpen);
            }
            (s.session_factory.clone(), s.engine.clone())
        };
        match overrides {
            None => factory.ok_or(DatabaseError::NotOpen)?.create(),
            Some(overrides) => engine.ok_or(DatabaseError::NotOpen)?.session(&overrides),
        }
    }

    /// Creates a cooperative session with the same override rules as
    /// [`create_session`](Self::create_session).
    pub fn create_async_session(&self, overrides: Option<SessionOptions>) -> Result<AsyncSession> {
        let (factory, engine) = {
            let s = self.read();
            if !s.is_open() {
                return Err(DatabaseError::NotOpen);
            }
            (s.async_session_factory.clone(), s.async_engine.clone())
        };
        match overrides {
            None => factory.ok_or(DatabaseError::NotOpen)?.create(),
            Some(overrides) => engine.ok_or(DatabaseError::NotOpen)?.session(&overrides),
        }
    }
}
