//! Blocking and cooperative engines over one SQLite file, and the session
//! factories bound to them.
//!
//! An engine keeps a primary connection open for its lifetime and opens a
//! fresh connection for every session. Disposing an engine closes the
//! primary connection; sessions already handed out keep working until they
//! are dropped, new ones are refused.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use crate::config::{EngineOptions, SessionOptions};
use crate::error::{DatabaseError, Result};
use crate::session::{AsyncSession, AsyncUnitOfWork, ConnectSpec, Session, SharedConnection};

/// Opens a connection to `path` configured from engine options with session
/// overrides applied on top.
pub(crate) fn open_connection(
    path: &Path,
    engine: &EngineOptions,
    session: &SessionOptions,
) -> Result<Connection> {
    let read_only = session.read_only.unwrap_or(engine.read_only);
    let flags = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
    } else {
        OpenFlags::default()
    };
    let conn = Connection::open_with_flags(path, flags)?;
    let busy_timeout = session
        .busy_timeout_ms
        .map(std::time::Duration::from_millis)
        .unwrap_or_else(|| engine.busy_timeout());
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(
        None,
        "foreign_keys",
        session.foreign_keys.unwrap_or(engine.foreign_keys),
    )?;
    Ok(conn)
}

/// Opens the engine-lifetime connection and applies the journal mode, which
/// SQLite persists in the file.
fn open_primary(path: &Path, options: &EngineOptions) -> Result<Connection> {
    let conn = open_connection(path, options, &SessionOptions::default())?;
    if !options.read_only {
        let mode: String = conn.pragma_update_and_check(
            None,
            "journal_mode",
            options.journal_mode.as_str(),
            |row| row.get(0),
        )?;
        debug!(path = %path.display(), journal_mode = %mode, "opened primary connection");
    }
    Ok(conn)
}

/// Blocking engine.
#[derive(Debug, Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

#[derive(Debug)]
struct EngineInner {
    path: PathBuf,
    options: EngineOptions,
    primary: Mutex<Option<Connection>>,
    disposed: AtomicBool,
}

impl Engine {
    pub fn new(path: impl Into<PathBuf>, options: EngineOptions) -> Result<Self> {
        let path = path.into();
        let primary = open_primary(&path, &options)?;
        Ok(Self {
            inner: Arc::new(EngineInner {
                path,
                options,
                primary: Mutex::new(Some(primary)),
                disposed: AtomicBool::new(false),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Opens a new connection with `overrides` applied.
    pub fn connect(&self, overrides: &SessionOptions) -> Result<Connection> {
        if self.is_disposed() {
            return Err(DatabaseError::NotOpen);
        }
        open_connection(&self.inner.path, &self.inner.options, overrides)
    }

    pub fn session(&self, overrides: &SessionOptions) -> Result<Session> {
        Ok(Session::new(self.connect(overrides)?, overrides.clone()))
    }

    /// Runs `work` on the primary connection.
    pub fn execute<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let primary = self.inner.primary.lock().unwrap_or_else(PoisonError::into_inner);
        match primary.as_ref() {
            Some(conn) => work(conn),
            None => Err(DatabaseError::NotOpen),
        }
    }

    /// Closes the primary connection and refuses further sessions.
    pub fn dispose(&self) -> Result<()> {
        self.inner.disposed.store(true, Ordering::Release);
        let primary = self
            .inner
            .primary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(conn) = primary {
            conn.close().map_err(|(_, e)| DatabaseError::from(e))?;
            debug!(path = %self.inner.path.display(), "disposed engine");
        }
        Ok(())
    }
}

/// Cooperative engine.
#[derive(Debug, Clone)]
pub struct AsyncEngine {
    inner: Arc<AsyncEngineInner>,
}

#[derive(Debug)]
struct AsyncEngineInner {
    path: PathBuf,
    options: EngineOptions,
    primary: SharedConnection,
    disposed: AtomicBool,
}

impl AsyncEngine {
    pub fn new(path: impl Into<PathBuf>, options: EngineOptions) -> Result<Self> {
        let path = path.into();
        let primary = open_primary(&path, &options)?;
        Ok(Self {
            inner: Arc::new(AsyncEngineInner {
                path,
                options,
                primary: SharedConnection::ready(primary),
                disposed: AtomicBool::new(false),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Creates a session whose connection opens on first use.
    pub fn session(&self, overrides: &SessionOptions) -> Result<AsyncSession> {
        if self.is_disposed() {
            return Err(DatabaseError::NotOpen);
        }
        Ok(AsyncSession::new(ConnectSpec {
            path: self.inner.path.clone(),
            engine: self.inner.options.clone(),
            session: overrides.clone(),
        }))
    }

    pub async fn dispose(&self) -> Result<()> {
        self.inner.disposed.store(true, Ordering::Release);
        self.inner.primary.close().await?;
        debug!(path = %self.inner.path.display(), "disposed async engine");
        Ok(())
    }

    /// Disposes without an async context.
    pub fn dispose_blocking(&self) -> Result<()> {
        self.inner.disposed.store(true, Ordering::Release);
        self.inner.primary.close_blocking()?;
        debug!(path = %self.inner.path.display(), "disposed async engine");
        Ok(())
    }
}

#[async_trait]
impl AsyncUnitOfWork for AsyncEngine {
    /// Runs `work` on the primary connection.
    async fn execute<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        self.inner.primary.run(work).await.map_err(|e| match e {
            DatabaseError::SessionClosed => DatabaseError::NotOpen,
            other => other,
        })
    }
}

/// Builds blocking sessions with fixed default options.
#[derive(Debug, Clone)]
pub struct SessionFactory {
    engine: Engine,
    options: SessionOptions,
}

impl SessionFactory {
    pub fn new(engine: Engine, options: SessionOptions) -> Self {
        Self { engine, options }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn create(&self) -> Result<Session> {
        self.engine.session(&self.options)
    }
}

/// Builds cooperative sessions with fixed default options.
#[derive(Debug, Clone)]
pub struct AsyncSessionFactory {
    engine: AsyncEngine,
    options: SessionOptions,
}

impl AsyncSessionFactory {
    pub fn new(engine: AsyncEngine, options: SessionOptions) -> Self {
        Self { engine, options }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn create(&self) -> Result<AsyncSession> {
        self.engine.session(&self.options)
    }
}
