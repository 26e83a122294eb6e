use std::ops::Deref;
use std::sync::Arc;

use super::{DatabaseComponent, TableComponent};
use crate::database::DatabaseFile;
use crate::error::Result;
use crate::session::{AsyncSession, Session};
use crate::table::{RowSet, UpdateTable};

/// A component backed by an update-tracked table.
///
/// Every read takes an optional session; without one, a session is created
/// through the owner for the duration of the call.
#[derive(Debug, Clone)]
pub struct UpdateTableComponent {
    base: TableComponent,
}

impl UpdateTableComponent {
    pub fn new(owner: &Arc<DatabaseFile>, table_name: impl Into<String>) -> Self {
        Self {
            base: TableComponent::new(owner, table_name),
        }
    }

    pub fn update_table(&self) -> Result<UpdateTable> {
        UpdateTable::new(self.base.table()?)
    }

    pub fn get_last_update_id(&self, session: Option<&Session>) -> Result<Option<i64>> {
        let table = self.update_table()?;
        self.base
            .with_session(session, |conn| table.get_last_update_id(conn))
    }

    pub fn get_from_update(
        &self,
        session: Option<&Session>,
        update_id: i64,
        inclusive: bool,
        as_entries: bool,
    ) -> Result<RowSet> {
        let table = self.update_table()?;
        self.base.with_session(session, |conn| {
            table.get_from_update(conn, update_id, inclusive, as_entries)
        })
    }

    pub async fn get_last_update_id_async(
        &self,
        session: Option<&AsyncSession>,
    ) -> Result<Option<i64>> {
        let table = self.update_table()?;
        self.base
            .with_async_session(session, move |conn| table.get_last_update_id(conn))
            .await
    }

    pub async fn get_from_update_async(
        &self,
        session: Option<&AsyncSession>,
        update_id: i64,
        inclusive: bool,
        as_entries: bool,
    ) -> Result<RowSet> {
        let table = self.update_table()?;
        self.base
            .with_async_session(session, move |conn| {
                table.get_from_update(conn, update_id, inclusive, as_entries)
            })
            .await
    }
}

impl DatabaseComponent for UpdateTableComponent {
    fn owner(&self) -> Option<Arc<DatabaseFile>> {
        self.base.owner()
    }
}

impl Deref for UpdateTableComponent {
    type Target = TableComponent;

    fn deref(&self) -> &TableComponent {
        &self.base
    }
}
