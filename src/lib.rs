//! SQLite table idioms, components and database file lifecycle for the Runar
//! ecosystem.
//!
//! # Intention
//!
//! - Own one SQLite file per [`DatabaseFile`], with paired blocking and
//!   cooperative engines and their session factories.
//! - Provide reusable table idioms: singleton rows, update watermarks and a
//!   meta-information row.
//! - Let components reach their owner's sessions and tables without owning
//!   the owner.
//!
//! # Architectural Boundaries
//!
//! - Storage, locking and query planning are SQLite's; this crate only
//!   composes them.
//! - No migrations: the schema is created as declared.
//!
//! # Example
//!
//! ```no_run
//! use rust_sqlite_objects::{
//!     entry, ColumnDefinition, DataType, DatabaseConfig, DatabaseFile, Entry, Schema,
//!     SingletonTableComponent, TableDefinition,
//! };
//!
//! # fn main() -> rust_sqlite_objects::Result<()> {
//! let schema = Schema::new().add_table(
//!     TableDefinition::singleton("items").with_column(ColumnDefinition::new("value", DataType::Integer)),
//! );
//! let file = DatabaseFile::new(
//!     DatabaseConfig::new("db.sqlite", schema)
//!         .with_create(true)
//!         .with_open(true),
//! )?;
//!
//! let items = SingletonTableComponent::new(&file, "items");
//! items.create_entry(None, None, true, entry([("value", 1)]))?;
//! let current: Entry = items.get_entry(None, true)?.into_entry();
//! assert_eq!(current["value"].as_integer(), Some(1));
//! file.close();
//! # Ok(())
//! # }
//! ```

pub mod component;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod schema;
pub mod session;
pub mod table;
pub mod value;

pub use component::{
    ComponentBuilder, DatabaseComponent, MetaInformationComponent, SingletonTableComponent,
    TableComponent, UpdateTableComponent,
};
pub use config::{DatabaseConfig, EngineOptions, JournalMode, SessionOptions};
pub use database::{ComponentRegistry, DatabaseFile, DatabaseState};
pub use engine::{AsyncEngine, AsyncSessionFactory, Engine, SessionFactory};
pub use error::{DatabaseError, Result};
pub use schema::{
    ColumnConstraint, ColumnDefinition, DataType, DefaultValue, ForeignKey, ForeignKeyAction,
    IndexDefinition, Schema, TableDefinition, TableKind, TableRegistry, ID_COLUMN,
    META_INFORMATION_TABLE, UPDATE_ID_COLUMN,
};
pub use session::{with_transaction, AsyncSession, AsyncUnitOfWork, Session};
pub use table::{
    MetaInformationTable, Record, RowSet, SingleRow, SingletonTable, Table, UpdateTable,
};
pub use value::{entry, merge_fields, Entry, Value};
