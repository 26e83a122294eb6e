//! Error types for database file, table and component operations.

use thiserror::Error;

use crate::schema::TableKind;

/// Errors that can occur while working with a database file or its tables.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A session was requested from a handle whose engines are not open.
    #[error("database file not open")]
    NotOpen,

    /// An engine was requested before a file path was set.
    #[error("database file has no path")]
    NoPath,

    /// SQLite engine or driver failure, passed through unchanged.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The singleton row an operation expects does not exist.
    #[error("no row found in table '{table}'")]
    RowNotFound { table: String },

    /// A singleton table already holds its row.
    #[error("singleton table '{table}' already has a row")]
    SingletonOccupied { table: String },

    /// No table is registered under the requested name.
    #[error("table '{0}' is not registered")]
    TableNotFound(String),

    /// No component is attached under the requested name.
    #[error("component '{0}' is not attached")]
    ComponentNotFound(String),

    /// The database file a component belongs to has been dropped.
    #[error("owning database file no longer exists")]
    OwnerDropped,

    /// A table was bound to an idiom it was not declared for.
    #[error("table '{table}' is not a {expected:?} table")]
    WrongTableKind { table: String, expected: TableKind },

    /// A field name that the table does not declare.
    #[error("table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    /// Table, column or index name that cannot be used as an SQL identifier.
    #[error("invalid identifier '{0}': must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidIdentifier(String),

    /// A stored value does not fit its column's declared type.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// The async session lost its connection.
    #[error("session closed")]
    SessionClosed,

    /// A blocking worker running a query failed to complete.
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Convenience alias for results with [`DatabaseError`].
pub type Result<T> = std::result::Result<T, DatabaseError>;
