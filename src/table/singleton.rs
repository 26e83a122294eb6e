use std::sync::Arc;

use rusqlite::Connection;
use tracing::debug;

use super::{Record, SingleRow, Table};
use crate::error::{DatabaseError, Result};
use crate::schema::{TableDefinition, TableKind};
use crate::session::{with_transaction, AsyncUnitOfWork};
use crate::value::{merge_fields, Entry};

/// A table holding at most one row.
///
/// Without `begin`, the existence check and the following insert or update
/// are separate statements in the caller's transaction mode, so concurrent
/// writers can race and insert twice. Pass `begin = true` for an atomic
/// check-then-act.
#[derive(Debug, Clone)]
pub struct SingletonTable {
    table: Table,
}

impl SingletonTable {
    pub fn new(def: Arc<TableDefinition>) -> Result<Self> {
        if !def.kind.is_singleton() {
            return Err(DatabaseError::WrongTableKind {
                table: def.name.clone(),
                expected: TableKind::Singleton,
            });
        }
        Ok(Self {
            table: Table::new(def),
        })
    }

    pub fn definition(&self) -> &Arc<TableDefinition> {
        self.table.definition()
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }

    /// Every row; at most one.
    pub fn get_all(&self, conn: &Connection) -> Result<Vec<Record>> {
        self.table.get_all(conn)
    }

    /// Inserts the row if the table is empty, otherwise updates it in place.
    pub fn create_entry(
        &self,
        conn: &Connection,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<()> {
        let fields = merge_fields(entry, overrides);
        with_transaction(conn, begin, |conn| match self.table.first(conn)? {
            None => {
                debug!(table = self.table.name(), "inserting singleton row");
                self.table.insert(conn, Some(&fields), false, Entry::new())?;
                Ok(())
            }
            Some(mut record) => {
                debug!(table = self.table.name(), "updating singleton row");
                record.update(Some(&fields), Entry::new())?;
                self.table.save(conn, &record)
            }
        })
    }

    /// Returns the row's entry (empty when there is no row), or the row
    /// itself when `as_entry` is false.
    pub fn get_entry(&self, conn: &Connection, as_entry: bool) -> Result<SingleRow> {
        let record = self.table.first(conn)?;
        Ok(if as_entry {
            SingleRow::Entry(record.map(|r| r.as_entry()).unwrap_or_default())
        } else {
            SingleRow::Record(record)
        })
    }

    /// Updates the existing row.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::RowNotFound`] if the table is empty.
    pub fn set_entry(
        &self,
        conn: &Connection,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<()> {
        let fields = merge_fields(entry, overrides);
        with_transaction(conn, begin, |conn| {
            let mut record = self
                .table
                .first(conn)?
                .ok_or_else(|| DatabaseError::RowNotFound {
                    table: self.table.name().to_string(),
                })?;
            record.update(Some(&fields), Entry::new())?;
            self.table.save(conn, &record)
        })
    }

    pub async fn create_entry_async<S: AsyncUnitOfWork>(
        &self,
        session: &S,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<()> {
        let this = self.clone();
        let fields = merge_fields(entry, overrides);
        session
            .execute(move |conn| this.create_entry(conn, Some(&fields), begin, Entry::new()))
            .await
    }

    pub async fn get_entry_async<S: AsyncUnitOfWork>(
        &self,
        session: &S,
        as_entry: bool,
    ) -> Result<SingleRow> {
        let this = self.clone();
        session
            .execute(move |conn| this.get_entry(conn, as_entry))
            .await
    }

    pub async fn set_entry_async<S: AsyncUnitOfWork>(
        &self,
        session: &S,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<()> {
        let this = self.clone();
        let fields = merge_fields(entry, overrides);
        session
            .execute(move |conn| this.set_entry(conn, Some(&fields), begin, Entry::new()))
            .await
    }
}
