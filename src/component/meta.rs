use std::ops::Deref;
use std::sync::Arc;

use super::{DatabaseComponent, TableComponent};
use crate::database::DatabaseFile;
use crate::error::Result;
use crate::schema::META_INFORMATION_TABLE;
use crate::session::{AsyncSession, Session};
use crate::table::{MetaInformationTable, SingleRow};
use crate::value::{merge_fields, Entry};

/// A component over the database's meta-information row.
#[derive(Debug, Clone)]
pub struct MetaInformationComponent {
    base: TableComponent,
}

impl MetaInformationComponent {
    /// Binds to the table registered as `metainformation`.
    pub fn new(owner: &Arc<DatabaseFile>) -> Self {
        Self::with_table_name(owner, META_INFORMATION_TABLE)
    }

    pub fn with_table_name(owner: &Arc<DatabaseFile>, table_name: impl Into<String>) -> Self {
        Self {
            base: TableComponent::new(owner, table_name),
        }
    }

    pub fn meta_table(&self) -> Result<MetaInformationTable> {
        MetaInformationTable::new(self.base.table()?)
    }

    pub fn create_information(
        &self,
        session: Option<&Session>,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<()> {
        let table = self.meta_table()?;
        self.base.with_session(session, |conn| {
            table.create_information(conn, entry, begin, overrides)
        })
    }

    pub fn get_information(&self, session: Option<&Session>, as_entry: bool) -> Result<SingleRow> {
        let table = self.meta_table()?;
        self.base
            .with_session(session, |conn| table.get_information(conn, as_entry))
    }

    pub fn set_information(
        &self,
        session: Option<&Session>,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<()> {
        let table = self.meta_table()?;
        self.base.with_session(session, |conn| {
            table.set_information(conn, entry, begin, overrides)
        })
    }

    pub async fn create_information_async(
        &self,
        session: Option<&AsyncSession>,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<()> {
        let table = self.meta_table()?;
        let fields = merge_fields(entry, overrides);
        self.base
            .with_async_session(session, move |conn| {
                table.create_information(conn, Some(&fields), begin, Entry::new())
            })
            .await
    }

    pub async fn get_information_async(
        &self,
        session: Option<&AsyncSession>,
        as_entry: bool,
    ) -> Result<SingleRow> {
        let table = self.meta_table()?;
        self.base
            .with_async_session(session, move |conn| table.get_information(conn, as_entry))
            .await
    }

    pub async fn set_information_async(
        &self,
        session: Option<&AsyncSession>,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<()> {
        let table = self.meta_table()?;
        let fields = merge_fields(entry, overrides);
        self.base
            .with_async_session(session, move |conn| {
                table.set_information(conn, Some(&fields), begin, Entry::new())
            })
            .await
    }
}

impl DatabaseComponent for MetaInformationComponent {
    fn owner(&self) -> Option<Arc<DatabaseFile>> {
        self.base.owner()
    }
}

impl Deref for MetaInformationComponent {
    type Target = TableComponent;

    fn deref(&self) -> &TableComponent {
        &self.base
    }
}
