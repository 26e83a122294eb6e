//! Sessions: the units of work table operations run against.
//!
//! Table logic is written once over `&Connection`. A blocking [`Session`]
//! dereferences to its connection; an [`AsyncSession`] ships the same
//! closures to a blocking worker through [`AsyncUnitOfWork::execute`] and
//! suspends until it finishes.

use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::{EngineOptions, SessionOptions};
use crate::engine::open_connection;
use crate::error::{DatabaseError, Result};

/// Runs `work` inside a transaction when `begin` is set, otherwise directly
/// in whatever mode the connection is already in.
///
/// The transaction commits when `work` returns `Ok` and rolls back otherwise.
pub fn with_transaction<T, F>(conn: &Connection, begin: bool, work: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T>,
{
    if !begin {
        return work(conn);
    }
    let tx = conn.unchecked_transaction()?;
    let out = work(&tx)?;
    tx.commit()?;
    Ok(out)
}

/// A cooperative unit of work.
#[async_trait]
pub trait AsyncUnitOfWork: Send + Sync {
    /// Runs `work` against the underlying connection on a blocking worker.
    async fn execute<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static;

    /// Runs `work` inside a single transaction.
    async fn begin<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        self.execute(move |conn| with_transaction(conn, true, work))
            .await
    }
}

/// A blocking session bound to one connection.
#[derive(Debug)]
pub struct Session {
    conn: Connection,
    options: SessionOptions,
}

impl Session {
    pub(crate) fn new(conn: Connection, options: SessionOptions) -> Self {
        Self { conn, options }
    }

    /// The options this session's connection was opened with.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs `work` inside a single transaction.
    pub fn begin<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        with_transaction(&self.conn, true, work)
    }

    /// Closes the connection, reporting any error SQLite returns.
    ///
    /// Dropping a session also closes it, silently.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| DatabaseError::from(e))
    }
}

impl Deref for Session {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

/// Everything needed to open a connection later, on a blocking worker.
#[derive(Debug, Clone)]
pub(crate) struct ConnectSpec {
    pub path: PathBuf,
    pub engine: EngineOptions,
    pub session: SessionOptions,
}

#[derive(Debug)]
enum Slot {
    Pending(ConnectSpec),
    Ready(Connection),
    Closed,
}

/// A connection owned behind a cooperative lock.
///
/// Each unit of work takes the lock and carries the guard onto a blocking
/// worker, so the connection stays with the worker until the work is done
/// even if the caller stops waiting. The lock is never held by a task that
/// is suspended.
#[derive(Debug, Clone)]
pub(crate) struct SharedConnection {
    slot: Arc<AsyncMutex<Slot>>,
}

impl SharedConnection {
    pub(crate) fn ready(conn: Connection) -> Self {
        Self {
            slot: Arc::new(AsyncMutex::new(Slot::Ready(conn))),
        }
    }

    /// Defers opening the connection until the first unit of work.
    pub(crate) fn pending(spec: ConnectSpec) -> Self {
        Self {
            slot: Arc::new(AsyncMutex::new(Slot::Pending(spec))),
        }
    }

    pub(crate) async fn run<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let mut slot = Arc::clone(&self.slot).lock_owned().await;
        tokio::task::spawn_blocking(move || {
            let opened = match &*slot {
                Slot::Pending(spec) => Some(open_connection(&spec.path, &spec.engine, &spec.session)?),
                _ => None,
            };
            if let Some(conn) = opened {
                *slot = Slot::Ready(conn);
            }
            match &*slot {
                Slot::Ready(conn) => work(conn),
                _ => Err(DatabaseError::SessionClosed),
            }
        })
        .await?
    }

    pub(crate) async fn close(&self) -> Result<()> {
        let mut slot = Arc::clone(&self.slot).lock_owned().await;
        tokio::task::spawn_blocking(move || close_slot(&mut slot)).await?
    }

    /// Closes from a blocking context, e.g. a synchronous `close()`.
    ///
    /// Waits for any unit of work still running on a worker.
    pub(crate) fn close_blocking(&self) -> Result<()> {
        let mut slot = futures::executor::block_on(self.slot.lock());
        close_slot(&mut slot)
    }
}

fn close_slot(slot: &mut Slot) -> Result<()> {
    if let Slot::Ready(conn) = std::mem::replace(slot, Slot::Closed) {
        conn.close().map_err(|(_, e)| DatabaseError::from(e))?;
    }
    Ok(())
}

/// A cooperative session bound to one connection.
///
/// The connection is opened lazily by the first unit of work.
#[derive(Debug)]
pub struct AsyncSession {
    conn: SharedConnection,
    options: SessionOptions,
}

impl AsyncSession {
    pub(crate) fn new(spec: ConnectSpec) -> Self {
        let options = spec.session.clone();
        Self {
            conn: SharedConnection::pending(spec),
            options,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await
    }
}

#[async_trait]
impl AsyncUnitOfWork for AsyncSession {
    async fn execute<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        self.conn.run(work).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn scratch(conn: &Connection) -> Result<()> {
        conn.execute_batch("CREATE TABLE IF NOT EXISTS t (v INTEGER)")?;
        Ok(())
    }

    fn count(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))?)
    }

    #[test]
    fn test_with_transaction_rolls_back_on_error() {
        let conn = Connection::open_in_memory().unwrap();
        scratch(&conn).unwrap();

        let result: Result<()> = with_transaction(&conn, true, |tx| {
            tx.execute("INSERT INTO t (v) VALUES (1)", [])?;
            Err(DatabaseError::RowNotFound { table: "t".into() })
        });
        assert!(result.is_err());
        assert_eq!(count(&conn).unwrap(), 0);

        with_transaction(&conn, true, |tx| {
            tx.execute("INSERT INTO t (v) VALUES (1)", [])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_without_begin_writes_immediately() {
        let conn = Connection::open_in_memory().unwrap();
        scratch(&conn).unwrap();
        let _: Result<()> = with_transaction(&conn, false, |c| {
            c.execute("INSERT INTO t (v) VALUES (1)", [])?;
            Err(DatabaseError::SessionClosed)
        });
        assert_eq!(count(&conn).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_shared_connection_runs_and_closes() {
        let shared = SharedConnection::ready(Connection::open_in_memory().unwrap());
        shared.run(scratch).await.unwrap();
        shared
            .run(|c| Ok(c.execute("INSERT INTO t (v) VALUES (7)", [])?))
            .await
            .unwrap();
        assert_eq!(shared.run(count).await.unwrap(), 1);

        shared.close().await.unwrap();
        assert!(matches!(
            shared.run(count).await,
            Err(DatabaseError::SessionClosed)
        ));
    }

    fn slow_sum(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row(
            "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 5000000) \
             SELECT SUM(x) FROM n",
            [],
            |row| row.get(0),
        )?)
    }

    #[tokio::test]
    async fn test_abandoned_work_keeps_connection() {
        let shared = SharedConnection::ready(Connection::open_in_memory().unwrap());
        let abandoned = tokio::time::timeout(Duration::from_millis(5), shared.run(slow_sum)).await;
        assert!(abandoned.is_err());

        let one: i64 = shared
            .run(|c| Ok(c.query_row("SELECT 1", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(one, 1);
    }

    #[tokio::test]
    async fn test_close_blocking_waits_for_running_work() {
        let shared = SharedConnection::ready(Connection::open_in_memory().unwrap());
        let worker = shared.clone();
        let running = tokio::spawn(async move { worker.run(slow_sum).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        shared.close_blocking().unwrap();
        assert_eq!(running.await.unwrap().unwrap(), 12_500_002_500_000);
        assert!(matches!(
            shared.run(count).await,
            Err(DatabaseError::SessionClosed)
        ));
    }
}
