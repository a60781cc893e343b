//! Storage collaborator interface
//!
//! The metadata engine and row layer only reach physical storage through
//! these traits:
//! - DDL: create/drop/rename tables, add/drop/rename columns
//! - parameterized select, count, insert, update, delete
//! - column introspection (existence only, never type semantics)
//! - scalar predicate registration for the query compiler's REGEXP
//!
//! A handle is opened per logical operation and released when dropped.

mod errors;
mod sqlite;
mod value;

pub use errors::{StorageError, StorageResult};
pub use sqlite::{SqliteHandle, SqliteProvider};
pub use value::SqlValue;

use std::collections::BTreeMap;

use crate::schema::StorageType;

/// Column specification for `create_table`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub storage_type: StorageType,
    /// Extra DDL after the type, e.g. `PRIMARY KEY AUTOINCREMENT`
    pub constraint: &'static str,
}

/// One row as returned by the store, keyed by column name
pub type StoredRow = BTreeMap<String, SqlValue>;

/// A parameterized read
#[derive(Debug, Clone, Copy)]
pub struct SelectQuery<'a> {
    /// Filter text with `?` placeholders
    pub where_clause: &'a str,
    /// Bind values for `where_clause`, in placeholder order
    pub params: &'a [SqlValue],
    /// Ordering text, without the `ORDER BY` keyword
    pub order_clause: &'a str,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Scalar predicate installed into the store, `(pattern, value) -> matched`
pub type ScalarPredicate = fn(&str, &str) -> bool;

/// Operations on one open database
pub trait StorageHandle {
    fn create_table(&self, table: &str, columns: &[ColumnSpec]) -> StorageResult<()>;

    fn drop_table(&self, table: &str) -> StorageResult<()>;

    fn rename_table(&self, old: &str, new: &str) -> StorageResult<()>;

    fn add_column(&self, table: &str, name: &str, storage_type: StorageType) -> StorageResult<()>;

    fn drop_column(&self, table: &str, name: &str) -> StorageResult<()>;

    fn rename_column(&self, table: &str, old: &str, new: &str) -> StorageResult<()>;

    /// Physical column names, in storage order
    fn table_columns(&self, table: &str) -> StorageResult<Vec<String>>;

    fn select(&self, table: &str, query: &SelectQuery<'_>) -> StorageResult<Vec<StoredRow>>;

    fn count(&self, table: &str, where_clause: &str, params: &[SqlValue]) -> StorageResult<u64>;

    /// Inserts a row and returns its storage-assigned id
    fn insert(&self, table: &str, values: &[(String, SqlValue)]) -> StorageResult<i64>;

    /// Returns false when no row has that id
    fn update(&self, table: &str, id: i64, values: &[(String, SqlValue)]) -> StorageResult<bool>;

    /// Returns false when no row has that id
    fn delete(&self, table: &str, id: i64) -> StorageResult<bool>;

    fn register_scalar_function(&self, name: &str, predicate: ScalarPredicate) -> StorageResult<()>;
}

/// Opens handles and manages whole databases
pub trait StorageProvider: Send + Sync {
    type Handle: StorageHandle;

    /// Opens a scoped handle with the REGEXP predicate registered
    fn open(&self, database: &str) -> StorageResult<Self::Handle>;

    fn create_database(&self, database: &str) -> StorageResult<()>;

    fn drop_database(&self, database: &str) -> StorageResult<()>;

    fn rename_database(&self, old: &str, new: &str) -> StorageResult<()>;

    fn database_exists(&self, database: &str) -> bool;
}
