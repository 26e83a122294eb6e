use std::ops::Deref;
use std::sync::Arc;

use super::{DatabaseComponent, TableComponent};
use crate::database::DatabaseFile;
use crate::error::Result;
use crate::session::{AsyncSession, Session};
use crate::table::{SingleRow, SingletonTable};
use crate::value::{merge_fields, Entry};

/// A component backed by a singleton table.
#[derive(Debug, Clone)]
pub struct SingletonTableComponent {
    base: TableComponent,
}

impl SingletonTableComponent {
    pub fn new(owner: &Arc<DatabaseFile>, table_name: impl Into<String>) -> Self {
        Self {
            base: TableComponent::new(owner, table_name),
        }
    }

    pub fn singleton_table(&self) -> Result<SingletonTable> {
        SingletonTable::new(self.base.table()?)
    }

    pub fn create_entry(
        &self,
        session: Option<&Session>,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<()> {
        let table = self.singleton_table()?;
        self.base
            .with_session(session, |conn| table.create_entry(conn, entry, begin, overrides))
    }

    pub fn get_entry(&self, session: Option<&Session>, as_entry: bool) -> Result<SingleRow> {
        let table = self.singleton_table()?;
        self.base
            .with_session(session, |conn| table.get_entry(conn, as_entry))
    }

    pub fn set_entry(
        &self,
        session: Option<&Session>,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<()> {
        let table = self.singleton_table()?;
        self.base
            .with_session(session, |conn| table.set_entry(conn, entry, begin, overrides))
    }

    pub async fn create_entry_async(
        &self,
        session: Option<&AsyncSession>,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<()> {
        let table = self.singleton_table()?;
        let fields = merge_fields(entry, overrides);
        self.base
            .with_async_session(session, move |conn| {
                table.create_entry(conn, Some(&fields), begin, Entry::new())
            })
            .await
    }

    pub async fn get_entry_async(
        &self,
        session: Option<&AsyncSession>,
        as_entry: bool,
    ) -> Result<SingleRow> {
        let table = self.singleton_table()?;
        self.base
            .with_async_session(session, move |conn| table.get_entry(conn, as_entry))
            .await
    }

    pub async fn set_entry_async(
        &self,
        session: Option<&AsyncSession>,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<()> {
        let table = self.singleton_table()?;
        let fields = merge_fields(entry, overrides);
        self.base
            .with_async_session(session, move |conn| {
                table.set_entry(conn, Some(&fields), begin, Entry::new())
            })
            .await
    }
}

impl DatabaseComponent for SingletonTableComponent {
    fn owner(&self) -> Option<Arc<DatabaseFile>> {
        self.base.owner()
    }
}

impl Deref for SingletonTableComponent {
    type Target = TableComponent;

    fn deref(&self) -> &TableComponent {
        &self.base
    }
}
