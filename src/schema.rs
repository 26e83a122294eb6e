//! Table and schema definitions, and the "create all" DDL built from them.
//!
//! Every table carries an implicit `id TEXT PRIMARY KEY` column holding a
//! UUID. Update-tracked tables also carry `update_id`, the watermark used
//! for incremental retrieval.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, Result};

/// Name of the implicit primary key column.
pub const ID_COLUMN: &str = "id";
/// Name of the watermark column on update-tracked tables.
pub const UPDATE_ID_COLUMN: &str = "update_id";
/// Fixed table name of the meta-information table.
pub const META_INFORMATION_TABLE: &str = "metainformation";

/// Tables by the name components look them up with.
pub type TableRegistry = HashMap<String, Arc<TableDefinition>>;

/// Schema definition for the SQLite database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<TableDefinition>,
}

impl Schema {
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }

    pub fn add_table(mut self, table: TableDefinition) -> Self {
        self.tables.push(table);
        self
    }

    /// Registry of every table in the schema keyed by its table name.
    pub fn registry(&self) -> TableRegistry {
        self.tables
            .iter()
            .map(|t| (t.name.clone(), Arc::new(t.clone())))
            .collect()
    }

    /// Generates `CREATE TABLE IF NOT EXISTS` and `CREATE INDEX IF NOT EXISTS`
    /// statements for every table. Safe to run repeatedly.
    pub fn create_all_sql(&self) -> Result<String> {
        let mut sql = String::new();
        for table in &self.tables {
            sql.push_str(&table.create_sql()?);
        }
        Ok(sql)
    }
}

/// Which table idiom a definition follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableKind {
    Plain,
    /// Holds at most one row.
    Singleton,
    /// Rows carry an `update_id` watermark.
    Update,
    /// A singleton holding free-form metadata.
    MetaInformation,
}

impl TableKind {
    pub fn is_singleton(self) -> bool {
        matches!(self, TableKind::Singleton | TableKind::MetaInformation)
    }

    pub fn is_update_tracked(self) -> bool {
        matches!(self, TableKind::Update)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub kind: TableKind,
    /// Declared columns, including `update_id` on update tables but not `id`.
    pub columns: Vec<ColumnDefinition>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexDefinition>,
}

impl TableDefinition {
    /// A plain table with only the implicit `id` column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TableKind::Plain,
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn singleton(name: impl Into<String>) -> Self {
        Self {
            kind: TableKind::Singleton,
            ..Self::new(name)
        }
    }

    /// An update-tracked table; adds `update_id INTEGER NOT NULL DEFAULT 0`.
    pub fn update(name: impl Into<String>) -> Self {
        Self {
            kind: TableKind::Update,
            ..Self::new(name)
        }
        .with_column(
            ColumnDefinition::new(UPDATE_ID_COLUMN, DataType::Integer)
                .not_null()
                .with_default(DefaultValue::Integer(0)),
        )
    }

    /// The `metainformation` singleton table.
    pub fn meta_information() -> Self {
        Self {
            kind: TableKind::MetaInformation,
            ..Self::new(META_INFORMATION_TABLE)
        }
    }

    pub fn with_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    pub fn with_index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Comma separated `id` plus every declared column, in declaration order.
    pub(crate) fn select_list(&self) -> String {
        std::iter::once(ID_COLUMN)
            .chain(self.columns.iter().map(|c| c.name.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Generates the DDL for this table and its indexes.
    pub fn create_sql(&self) -> Result<String> {
        validate_identifier(&self.name)?;

        let mut parts = vec![format!("{ID_COLUMN} TEXT PRIMARY KEY NOT NULL")];
        for column in &self.columns {
            validate_identifier(&column.name)?;
            if column.name == ID_COLUMN {
                return Err(DatabaseError::InvalidIdentifier(column.name.clone()));
            }
            parts.push(column.sql());
        }
        for fk in &self.foreign_keys {
            validate_identifier(&fk.column)?;
            validate_identifier(&fk.foreign_table)?;
            validate_identifier(&fk.foreign_column)?;
            parts.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE {} ON UPDATE {}",
                fk.column,
                fk.foreign_table,
                fk.foreign_column,
                fk.on_delete.sql(),
                fk.on_update.sql()
            ));
        }

        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);\n",
            self.name,
            parts.join(",\n    ")
        );

        for index in &self.indexes {
            validate_identifier(&index.name)?;
            for column in &index.columns {
                validate_identifier(column)?;
            }
            sql.push_str(&format!(
                "CREATE {}INDEX IF NOT EXISTS {} ON {}({});\n",
                if index.unique { "UNIQUE " } else { "" },
                index.name,
                self.name,
                index.columns.join(", ")
            ));
        }

        Ok(sql)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: DataType,
    pub constraints: Vec<ColumnConstraint>,
    pub default_value: Option<DefaultValue>,
    /// Whether the column is part of the external `as_entry` projection.
    pub in_entry: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            constraints: Vec::new(),
            default_value: None,
            in_entry: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.constraints.push(ColumnConstraint::NotNull);
        self
    }

    pub fn unique(mut self) -> Self {
        self.constraints.push(ColumnConstraint::Unique);
        self
    }

    pub fn with_default(mut self, value: DefaultValue) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Keeps the column out of `as_entry`; it still appears in `as_dict`.
    pub fn internal(mut self) -> Self {
        self.in_entry = false;
        self
    }

    fn sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.data_type.sql());
        for constraint in &self.constraints {
            sql.push_str(match constraint {
                ColumnConstraint::NotNull => " NOT NULL",
                ColumnConstraint::Unique => " UNIQUE",
            });
        }
        if let Some(default) = &self.default_value {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.sql());
        }
        sql
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Text,
    Real,
    Blob,
    /// Stored as INTEGER 0/1.
    Boolean,
}

impl DataType {
    fn sql(self) -> &'static str {
        match self {
            DataType::Integer | DataType::Boolean => "INTEGER",
            DataType::Text => "TEXT",
            DataType::Real => "REAL",
            DataType::Blob => "BLOB",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnConstraint {
    NotNull,
    Unique,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    Integer(i64),
    Text(String),
    Real(f64),
    Null,
    CurrentTimestamp,
}

impl DefaultValue {
    fn sql(&self) -> String {
        match self {
            DefaultValue::Integer(i) => i.to_string(),
            DefaultValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            DefaultValue::Real(f) => format!("{f:?}"),
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
}

impl ForeignKeyAction {
    fn sql(self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
            ForeignKeyAction::Restrict => "RESTRICT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Validates that a name can be spliced into SQL as a bare identifier.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("items").is_ok());
        assert!(validate_identifier("_private_2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("drop;--").is_err());
    }

    #[test]
    fn test_update_table_has_watermark_column() {
        let table = TableDefinition::update("events");
        let column = table.column(UPDATE_ID_COLUMN).unwrap();
        assert_eq!(column.data_type, DataType::Integer);
        assert_eq!(column.default_value, Some(DefaultValue::Integer(0)));
        assert!(table.kind.is_update_tracked());
    }

    #[test]
    fn test_create_sql_renders_columns_and_indexes() {
        let table = TableDefinition::new("items")
            .with_column(ColumnDefinition::new("name", DataType::Text).not_null().unique())
            .with_column(
                ColumnDefinition::new("note", DataType::Text).with_default(DefaultValue::Text("it's".into())),
            )
            .with_index(IndexDefinition {
                name: "idx_items_name".into(),
                columns: vec!["name".into()],
                unique: false,
            });
        let sql = table.create_sql().unwrap();
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS items"));
        assert!(sql.contains("id TEXT PRIMARY KEY NOT NULL"));
        assert!(sql.contains("name TEXT NOT NULL UNIQUE"));
        assert!(sql.contains("note TEXT DEFAULT 'it''s'"));
        assert!(sql.contains("CREATE INDEX IF NOT EXISTS idx_items_name ON items(name);"));
    }

    #[test]
    fn test_create_sql_rejects_explicit_id_column() {
        let table = TableDefinition::new("items").with_column(ColumnDefinition::new("id", DataType::Integer));
        assert!(matches!(
            table.create_sql(),
            Err(DatabaseError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_create_all_sql_runs_twice() {
        let schema = Schema::new()
            .add_table(TableDefinition::meta_information())
            .add_table(TableDefinition::update("events"));
        let sql = schema.create_all_sql().unwrap();
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(&sql).unwrap();
        conn.execute_batch(&sql).unwrap();
        assert_eq!(schema.registry().len(), 2);
    }

    #[test]
    fn test_foreign_key_rendering() {
        let table = TableDefinition::new("children")
            .with_column(ColumnDefinition::new("parent_id", DataType::Text))
            .with_foreign_key(ForeignKey {
                column: "parent_id".into(),
                foreign_table: "parents".into(),
                foreign_column: "id".into(),
                on_delete: ForeignKeyAction::Cascade,
                on_update: ForeignKeyAction::NoAction,
            });
        let sql = table.create_sql().unwrap();
        assert!(sql.contains("FOREIGN KEY (parent_id) REFERENCES parents(id) ON DELETE CASCADE ON UPDATE NO ACTION"));
    }
}
