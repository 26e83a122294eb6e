use std::ops::Deref;
use std::sync::Arc;

use rusqlite::Connection;

use super::{SingleRow, SingletonTable};
use crate::error::{DatabaseError, Result};
use crate::schema::{TableDefinition, TableKind};
use crate::session::AsyncUnitOfWork;
use crate::value::Entry;

/// The singleton table holding a database's meta-information.
#[derive(Debug, Clone)]
pub struct MetaInformationTable {
    singleton: SingletonTable,
}

impl MetaInformationTable {
    pub fn new(def: Arc<TableDefinition>) -> Result<Self> {
        if def.kind != TableKind::MetaInformation {
            return Err(DatabaseError::WrongTableKind {
                table: def.name.clone(),
                expected: TableKind::MetaInformation,
            });
        }
        Ok(Self {
            singleton: SingletonTable::new(def)?,
        })
    }

    pub fn create_information(
        &self,
        conn: &Connection,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<()> {
        self.singleton.create_entry(conn, entry, begin, overrides)
    }

    pub fn get_information(&self, conn: &Connection, as_entry: bool) -> Result<SingleRow> {
        self.singleton.get_entry(conn, as_entry)
    }

    pub fn set_information(
        &self,
        conn: &Connection,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<()> {
        self.singleton.set_entry(conn, entry, begin, overrides)
    }

    pub async fn create_information_async<S: AsyncUnitOfWork>(
        &self,
        session: &S,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<()> {
        self.singleton
            .create_entry_async(session, entry, begin, overrides)
            .await
    }

    pub async fn get_information_async<S: AsyncUnitOfWork>(
        &self,
        session: &S,
        as_entry: bool,
    ) -> Result<SingleRow> {
        self.singleton.get_entry_async(session, as_entry).await
    }

    pub async fn set_information_async<S: AsyncUnitOfWork>(
        &self,
        session: &S,
        entry: Option<&Entry>,
        begin: bool,
        overrides: Entry,
    ) -> Result<()> {
        self.singleton
            .set_entry_async(session, entry, begin, overrides)
            .await
    }
}

impl Deref for MetaInformationTable {
    type Target = SingletonTable;

    fn deref(&self) -> &SingletonTable {
        &self.singleton
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDefinition, DataType};
    use crate::value::{entry, Value};

    #[test]
    fn test_information_round() {
        let table = MetaInformationTable::new(Arc::new(
            TableDefinition::meta_information()
                .with_column(ColumnDefinition::new("name", DataType::Text))
                .with_column(ColumnDefinition::new("version", DataType::Integer)),
        ))
        .unwrap();
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&table.definition().create_sql().unwrap())
            .unwrap();

        assert!(table.set_information(&conn, None, false, entry([("version", 1)])).is_err());

        table
            .create_information(&conn, Some(&entry([("name", "db")])), true, Entry::new())
            .unwrap();
        table
            .set_information(&conn, None, true, entry([("version", 2)]))
            .unwrap();

        let info = table.get_information(&conn, true).unwrap().into_entry();
        assert_eq!(info["name"], Value::Text("db".into()));
        assert_eq!(info["version"], Value::Integer(2));
    }

    #[test]
    fn test_requires_meta_information_kind() {
        assert!(MetaInformationTable::new(Arc::new(TableDefinition::singleton("s"))).is_err());
    }
}
