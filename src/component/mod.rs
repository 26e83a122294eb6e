//! Components: units of application logic bound to a database file.
//!
//! A component holds a non-owning back-pointer to its [`DatabaseFile`] and
//! resolves its table by name on every call, so it can be built before the
//! table is registered and degrades to an error once the owner is gone.

mod meta;
mod singleton;
mod update;

pub use meta::MetaInformationComponent;
pub use singleton::SingletonTableComponent;
pub use update::UpdateTableComponent;

use std::fmt;
use std::sync::{Arc, Weak};

use rusqlite::Connection;

use crate::config::SessionOptions;
use crate::database::DatabaseFile;
use crate::error::{DatabaseError, Result};
use crate::schema::{TableDefinition, TableRegistry};
use crate::session::{AsyncSession, AsyncUnitOfWork, Session};

/// Behaviour shared by everything attached to a [`DatabaseFile`].
pub trait DatabaseComponent: fmt::Debug + Send + Sync {
    /// The owning database file, or `None` once it has been dropped.
    fn owner(&self) -> Option<Arc<DatabaseFile>>;

    fn require_owner(&self) -> Result<Arc<DatabaseFile>> {
        self.owner().ok_or(DatabaseError::OwnerDropped)
    }

    /// The owner's table registry, or `None` once the owner is gone.
    fn tables(&self) -> Option<TableRegistry> {
        self.owner().map(|owner| owner.tables())
    }

    fn create_session(&self, overrides: Option<SessionOptions>) -> Result<Session> {
        self.require_owner()?.create_session(overrides)
    }

    fn create_async_session(&self, overrides: Option<SessionOptions>) -> Result<AsyncSession> {
        self.require_owner()?.create_async_session(overrides)
    }

    /// Component specific construction.
    fn build(&self) -> Result<()> {
        Ok(())
    }

    /// Component specific loading of persisted data.
    fn load(&self) -> Result<()> {
        Ok(())
    }

    /// Component specific table setup.
    fn build_tables(&self) -> Result<()> {
        Ok(())
    }
}

type BuildFn = dyn Fn(&Arc<DatabaseFile>) -> Arc<dyn DatabaseComponent> + Send + Sync;

/// Builds a named component for a database file while it is constructed.
#[derive(Clone)]
pub struct ComponentBuilder {
    name: String,
    build: Arc<BuildFn>,
}

impl ComponentBuilder {
    pub fn new<C, F>(name: impl Into<String>, build: F) -> Self
    where
        C: DatabaseComponent + 'static,
        F: Fn(&Arc<DatabaseFile>) -> C + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            build: Arc::new(move |owner: &Arc<DatabaseFile>| {
                Arc::new(build(owner)) as Arc<dyn DatabaseComponent>
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn instantiate(&self, owner: &Arc<DatabaseFile>) -> Arc<dyn DatabaseComponent> {
        (self.build)(owner)
    }
}

impl fmt::Debug for ComponentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentBuilder")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A component bound to one table of its owner, by name.
#[derive(Debug, Clone)]
pub struct TableComponent {
    owner: Weak<DatabaseFile>,
    table_name: String,
}

impl TableComponent {
    pub fn new(owner: &Arc<DatabaseFile>, table_name: impl Into<String>) -> Self {
        Self {
            owner: Arc::downgrade(owner),
            table_name: table_name.into(),
        }
    }

    /// A component with no owner yet; see [`set_owner`](Self::set_owner).
    pub fn detached(table_name: impl Into<String>) -> Self {
        Self {
            owner: Weak::new(),
            table_name: table_name.into(),
        }
    }

    pub fn set_owner(&mut self, owner: &Arc<DatabaseFile>) {
        self.owner = Arc::downgrade(owner);
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Resolves the bound table through the owner's registry.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::OwnerDropped`] without an owner,
    /// [`DatabaseError::TableNotFound`] if the name is not registered.
    pub fn table(&self) -> Result<Arc<TableDefinition>> {
        self.require_owner()?.table(&self.table_name)
    }

    /// Runs `work` on the caller's session, or on a session scoped to this
    /// call.
    pub(crate) fn with_session<T, F>(&self, session: Option<&Session>, work: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        if let Some(session) = session {
            return work(session);
        }
        let scoped = self.create_session(None)?;
        let out = work(&scoped)?;
        scoped.close()?;
        Ok(out)
    }

    /// Cooperative counterpart of [`with_session`](Self::with_session).
    pub(crate) async fn with_async_session<T, F>(
        &self,
        session: Option<&AsyncSession>,
        work: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        if let Some(session) = session {
            return session.execute(work).await;
        }
        let scoped = self.create_async_session(None)?;
        let out = scoped.execute(work).await?;
        scoped.close().await?;
        Ok(out)
    }
}

impl DatabaseComponent for TableComponent {
    fn owner(&self) -> Option<Arc<DatabaseFile>> {
        self.owner.upgrade()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::schema::Schema;
    use tempfile::TempDir;

    #[test]
    fn test_detached_component() {
        let component = TableComponent::detached("items");
        assert!(component.owner().is_none());
        assert!(component.tables().is_none());
        assert!(matches!(component.table(), Err(DatabaseError::OwnerDropped)));
        assert!(matches!(
            component.create_session(None),
            Err(DatabaseError::OwnerDropped)
        ));
        component.build().unwrap();
        component.load().unwrap();
        component.build_tables().unwrap();
    }

    #[test]
    fn test_resolves_table_at_call_time() {
        let dir = TempDir::new().unwrap();
        let file = DatabaseFile::new(DatabaseConfig::new(dir.path().join("db.sqlite"), Schema::new())).unwrap();
        let mut component = TableComponent::detached("late");
        component.set_owner(&file);

        assert!(matches!(
            component.table(),
            Err(DatabaseError::TableNotFound(name)) if name == "late"
        ));
        file.add_table(TableDefinition::new("late"));
        assert_eq!(component.table().unwrap().name, "late");
        assert!(component.tables().unwrap().contains_key("late"));

        drop(file);
        assert!(component.tables().is_none());
        assert!(matches!(component.table(), Err(DatabaseError::OwnerDropped)));
    }

    #[test]
    fn test_sessions_forward_to_owner() {
        let dir = TempDir::new().unwrap();
        let file = DatabaseFile::new(DatabaseConfig::new(dir.path().join("db.sqlite"), Schema::new())).unwrap();
        let component = TableComponent::new(&file, "items");
        assert!(matches!(
            component.create_session(None),
            Err(DatabaseError::NotOpen)
        ));

        file.open(None).unwrap();
        let value: i64 = component
            .with_session(None, |conn| Ok(conn.query_row("SELECT 41 + 1", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(value, 42);
        assert!(component.create_async_session(None).is_ok());
    }
}
