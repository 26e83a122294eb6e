use std::ops::Deref;
use std::sync::Arc;

use rusqlite::Connection;

use super::{RowSet, Table};
use crate::error::{DatabaseError, Result};
use crate::schema::{TableDefinition, TableKind, UPDATE_ID_COLUMN};
use crate::session::AsyncUnitOfWork;

/// A table whose rows carry an `update_id` watermark, for "everything since
/// X" retrieval.
///
/// Results come back in the engine's natural order; only the filter is
/// guaranteed.
#[derive(Debug, Clone)]
pub struct UpdateTable {
    table: Table,
}

impl UpdateTable {
    pub fn new(def: Arc<TableDefinition>) -> Result<Self> {
        if !def.kind.is_update_tracked() {
            return Err(DatabaseError::WrongTableKind {
                table: def.name.clone(),
                expected: TableKind::Update,
            });
        }
        Ok(Self {
            table: Table::new(def),
        })
    }

    /// The highest `update_id` in the table, or `None` when it is empty.
    pub fn get_last_update_id(&self, conn: &Connection) -> Result<Option<i64>> {
        let sql = format!("SELECT MAX({UPDATE_ID_COLUMN}) FROM {}", self.table.name());
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// Rows with `update_id >= update_id` (`inclusive`) or `> update_id`.
    pub fn get_from_update(
        &self,
        conn: &Connection,
        update_id: i64,
        inclusive: bool,
        as_entries: bool,
    ) -> Result<RowSet> {
        let op = if inclusive { ">=" } else { ">" };
        let clause = format!("WHERE {UPDATE_ID_COLUMN} {op} ?1");
        let records = self.table.select(conn, &clause, [update_id])?;
        Ok(RowSet::new(records, as_entries))
    }

    pub async fn get_last_update_id_async<S: AsyncUnitOfWork>(
        &self,
        session: &S,
    ) -> Result<Option<i64>> {
        let this = self.clone();
        session
            .execute(move |conn| this.get_last_update_id(conn))
            .await
    }

    pub async fn get_from_update_async<S: AsyncUnitOfWork>(
        &self,
        session: &S,
        update_id: i64,
        inclusive: bool,
        as_entries: bool,
    ) -> Result<RowSet> {
        let this = self.clone();
        session
            .execute(move |conn| this.get_from_update(conn, update_id, inclusive, as_entries))
            .await
    }
}

impl Deref for UpdateTable {
    type Target = Table;

    fn deref(&self) -> &Table {
        &self.table
    }
}
