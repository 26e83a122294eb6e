//! Rows and the table idioms built on them.
//!
//! - [`Table`]: insert, read, save and delete rows of any table
//! - [`SingletonTable`]: get-or-create of the one row a table may hold
//! - [`UpdateTable`]: watermark queries over `update_id`
//! - [`MetaInformationTable`]: a singleton holding metadata
//!
//! Every operation takes the unit of work it runs in. Blocking variants
//! take a `&Connection` (a [`Session`](crate::Session) dereferences to
//! one); `_async` variants take any [`AsyncUnitOfWork`] and run the same
//! blocking logic through it.

mod meta;
mod singleton;
mod update;

pub use meta::MetaInformationTable;
pub use singleton::SingletonTable;
pub use update::UpdateTable;

use std::sync::Arc;

use rusqlite::{params_from_iter, Connection};
use uuid::Uuid;

use crate::error::{DatabaseError, Result};
use crate::schema::{TableDefinition, ID_COLUMN, UPDATE_ID_COLUMN};
use crate::session::{with_transaction, AsyncUnitOfWork};
use crate::value::{merge_fields, Entry, Value};

/// One row of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    table: Arc<TableDefinition>,
    id: String,
    values: Entry,
}

impl Record {
    pub fn table(&self) -> &Arc<TableDefinition> {
        &self.table
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Column values, without `id`.
    pub fn values(&self) -> &Entry {
        &self.values
    }

    /// The watermark, on update-tracked tables.
    pub fn update_id(&self) -> Option<i64> {
        self.values.get(UPDATE_ID_COLUMN).and_then(Value::as_integer)
    }

    /// Every column of the row, including `id`.
    pub fn as_dict(&self) -> Entry {
        let mut dict = self.values.clone();
        dict.insert(ID_COLUMN.to_string(), Value::Text(self.id.clone()));
        dict
    }

    /// The external projection of the row: columns marked for entries, and
    /// `update_id` on update-tracked tables. Never includes `id`.
    pub fn as_entry(&self) -> Entry {
        let tracked = self.table.kind.is_update_tracked();
        self.table
            .columns
            .iter()
            .filter(|c| c.in_entry || (tracked && c.name == UPDATE_ID_COLUMN))
            .filter_map(|c| self.values.get(&c.name).map(|v| (c.name.clone(), v.clone())))
            .collect()
    }

    /// Applies `partial` merged with `overrides` (overrides win) to the row.
    ///
    /// `id` is immutable and skipped. The row is left untouched if any field
    /// names a column the table does not declare.
    pub fn update(&mut self, partial: Option<&Entry>, overrides: Entry) -> Result<()> {
        let mut fields = merge_fields(partial, overrides);
        fields.remove(ID_COLUMN);
        check_columns(&self.table, &fields)?;
        self.values.extend(fields);
        Ok(())
    }

    fn from_row(table: &Arc<TableDefinition>, row: &rusqlite::Row<'_>) -> Result<Self> {
        let id: String = row.get(0)?;
        let mut values = Entry::new();
        for (i, column) in table.columns.iter().enumerate() {
            let value = Value::from_column(row.get_ref(i + 1)?, column.data_type)?;
            values.insert(column.name.clone(), value);
        }
        Ok(Self {
            table: Arc::clone(table),
            id,
            values,
        })
    }
}

fn check_columns(table: &TableDefinition, fields: &Entry) -> Result<()> {
    match fields.keys().find(|name| table.column(name).is_none()) {
        Some(name) => Err(DatabaseError::UnknownColumn {
            table: table.name.clone(),
            column: name.clone(),
        }),
        None => Ok(()),
    }
}

/// Result of a single-row read: the external entry (empty when there is no
/// row) or the row itself.
#[derive(Debug, Clone, PartialEq)]
pub enum SingleRow {
    Entry(Entry),
    Record(Option<Record>),
}

impl SingleRow {
    pub fn into_entry(self) -> Entry {
        match self {
            SingleRow::Entry(entry) => entry,
            SingleRow::Record(record) => record.map(|r| r.as_entry()).unwrap_or_default(),
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            SingleRow::Record(record) => record,
            SingleRow::Entry(_) => None,
        }
    }
}

/// Result of a multi-row read: rows, or their external entries.
#[derive(Debug, Clone, PartialEq)]
pub enum RowSet {
    Records(Vec<Record>),
    Entries(Vec<Entry>),
}

impl RowSet {
    fn new(records: Vec<Record>, as_entries: bool) -> Self {
        if as_entries {
            RowSet::Entries(records.iter().map(Record::as_entry).collect())
        } else {
            RowSet::Records(records)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RowSet::Records(r) => r.len(),
            RowSet::Entries(e) => e.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_entries(self) -> Vec<Entry> {
        match self {
            RowSet::Entries(entries) => entries,
            RowSet::Records(records) => records.iter().map(Record::as_entry).collect(),
        }
    }

    pub fn into_records(self) -> Option<Vec<Record>> {
        match self {
            RowSet::Records(records) => Some(records),
            RowSet::Entries(_) => None,
        }
    }
}

/// Row operations shared by every table idiom.
#[derive(Debug, Clone)]
pub struct Table {
    def: Arc<TableDefinition>,
}

impl From<TableDefinition> for Table {
    fn from(def: TableDefinition) -> Self {
        Self::new(Arc::new(def))
    }
}

impl Table {
    pub fn new(def: Arc<TableDefinition>) -> Self {
        Self { def }
    }

    pub fn definition(&self) -> &Arc<TableDefinition> {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Inserts a row built from `entry` merged with `overrides`.
    ///
    /// A new UUID is assigned unless the fields carry a text `id`; any other
    /// non-null `id` is a conversion error. Singleton tables refuse a second
    /// row. Columns left out take their declared defaults; the returned
    /// record is read back so it reflects them.
    pub fn insert(
        &self,
        conn: &Connection,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<Record> {
        let mut fields = merge_fields(entry, overrides);
        let id = match fields.remove(ID_COLUMN) {
            Some(Value::Text(id)) => id,
            None | Some(Value::Null) => Uuid::new_v4().to_string(),
            Some(other) => {
                return Err(DatabaseError::Conversion(format!(
                    "row id must be text, got {other:?}"
                )))
            }
        };
        check_columns(&self.def, &fields)?;

        let names: Vec<&str> = std::iter::once(ID_COLUMN)
            .chain(fields.keys().map(String::as_str))
            .collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.def.name,
            names.join(", "),
            placeholders.join(", ")
        );
        let values: Vec<Value> = std::iter::once(Value::Text(id.clone()))
            .chain(fields.into_values())
            .collect();

        with_transaction(conn, begin, |conn| {
            if self.def.kind.is_singleton() && self.first(conn)?.is_some() {
                return Err(DatabaseError::SingletonOccupied {
                    table: self.def.name.clone(),
                });
            }
            conn.execute(&sql, params_from_iter(values.iter()))?;
            self.get_by_id(conn, &id)?
                .ok_or_else(|| DatabaseError::RowNotFound {
                    table: self.def.name.clone(),
                })
        })
    }

    pub fn get_all(&self, conn: &Connection) -> Result<Vec<Record>> {
        self.select(conn, "", [])
    }

    pub fn get_by_id(&self, conn: &Connection, id: &str) -> Result<Option<Record>> {
        let sql = format!("WHERE {ID_COLUMN} = ?1");
        Ok(self.select(conn, &sql, [id])?.into_iter().next())
    }

    /// The first row in natural order, if any.
    pub fn first(&self, conn: &Connection) -> Result<Option<Record>> {
        Ok(self.select(conn, "LIMIT 1", [])?.into_iter().next())
    }

    /// Writes every column of `record` back to its row.
    pub fn save(&self, conn: &Connection, record: &Record) -> Result<()> {
        if self.def.columns.is_empty() {
            return Ok(());
        }
        let assignments: Vec<String> = self
            .def
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", c.name, i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {ID_COLUMN} = ?{}",
            self.def.name,
            assignments.join(", "),
            self.def.columns.len() + 1
        );
        let values: Vec<Value> = self
            .def
            .columns
            .iter()
            .map(|c| record.get(&c.name).cloned().unwrap_or(Value::Null))
            .chain(std::iter::once(Value::Text(record.id.clone())))
            .collect();

        let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
        if changed == 0 {
            return Err(DatabaseError::RowNotFound {
                table: self.def.name.clone(),
            });
        }
        Ok(())
    }

    /// Deletes the row with `id`; returns whether a row was removed.
    pub fn delete(&self, conn: &Connection, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE {ID_COLUMN} = ?1", self.def.name);
        Ok(conn.execute(&sql, [id])? > 0)
    }

    pub(crate) fn select<P: rusqlite::Params>(
        &self,
        conn: &Connection,
        clause: &str,
        params: P,
    ) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {} FROM {} {clause}",
            self.def.select_list(),
            self.def.name
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(Record::from_row(&self.def, row)?);
        }
        Ok(records)
    }

    pub async fn insert_async<S: AsyncUnitOfWork>(
        &self,
        session: &S,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<Record> {
        let table = self.clone();
        let fields = merge_fields(entry, overrides);
        session
            .execute(move |conn| table.insert(conn, Some(&fields), begin, Entry::new()))
            .await
    }

    pub async fn get_all_async<S: AsyncUnitOfWork>(&self, session: &S) -> Result<Vec<Record>> {
        let table = self.clone();
        session.execute(move |conn| table.get_all(conn)).await
    }

    pub async fn get_by_id_async<S: AsyncUnitOfWork>(
        &self,
        session: &S,
        id: &str,
    ) -> Result<Option<Record>> {
        let table = self.clone();
        let id = id.to_string();
        session.execute(move |conn| table.get_by_id(conn, &id)).await
    }

    pub async fn save_async<S: AsyncUnitOfWork>(&self, session: &S, record: &Record) -> Result<()> {
        let table = self.clone();
        let record = record.clone();
        session.execute(move |conn| table.save(conn, &record)).await
    }

    pub async fn delete_async<S: AsyncUnitOfWork>(&self, session: &S, id: &str) -> Result<bool> {
        let table = self.clone();
        let id = id.to_string();
        session.execute(move |conn| table.delete(conn, &id)).await
    }
}
