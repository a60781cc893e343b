//! Observable events
//!
//! Every structural log line carries one of these as its `event` field so
//! log consumers can match on a stable name instead of message text.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    ConfigLoaded,
    DataDirInitialized,
    /// Metadata directory fsync failed after a record was renamed into place
    MetadataSyncFailed,

    // Databases
    DatabaseCreated,
    DatabaseRenamed,
    DatabaseDeleted,
    DatabaseVisibilityChanged,

    // Tables
    TableCreated,
    TableRenamed,
    TableDeleted,
    TableVisibilityChanged,
    /// Metadata names a column the physical table lacks
    TableDrift,

    // Columns
    ColumnCreated,
    ColumnRenamed,
    ColumnRetyped,
    ColumnVisibilityChanged,
    ColumnSwapped,
    ColumnMoved,
    ColumnDeleted,
    TagRegistered,
    TagUnregistered,
    RuleUpdated,

    // Compensation
    /// Undoing a physical change after a metadata write failed
    RollbackStarted,
    RollbackFailed,

    // Rows
    RowInserted,
    RowUpdated,
    RowDeleted,
    SearchExecuted,
    /// Search string rejected by the grammar, title substrings used instead
    SearchFallback,
}

impl Event {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::DataDirInitialized => "DATA_DIR_INITIALIZED",
            Event::MetadataSyncFailed => "METADATA_SYNC_FAILED",
            Event::DatabaseCreated => "DATABASE_CREATED",
            Event::DatabaseRenamed => "DATABASE_RENAMED",
            Event::DatabaseDeleted => "DATABASE_DELETED",
            Event::DatabaseVisibilityChanged => "DATABASE_VISIBILITY_CHANGED",
            Event::TableCreated => "TABLE_CREATED",
            Event::TableRenamed => "TABLE_RENAMED",
            Event::TableDeleted => "TABLE_DELETED",
            Event::TableVisibilityChanged => "TABLE_VISIBILITY_CHANGED",
            Event::TableDrift => "TABLE_DRIFT",
            Event::ColumnCreated => "COLUMN_CREATED",
            Event::ColumnRenamed => "COLUMN_RENAMED",
            Event::ColumnRetyped => "COLUMN_RETYPED",
            Event::ColumnVisibilityChanged => "COLUMN_VISIBILITY_CHANGED",
            Event::ColumnSwapped => "COLUMN_SWAPPED",
            Event::ColumnMoved => "COLUMN_MOVED",
            Event::ColumnDeleted => "COLUMN_DELETED",
            Event::TagRegistered => "TAG_REGISTERED",
            Event::TagUnregistered => "TAG_UNREGISTERED",
            Event::RuleUpdated => "RULE_UPDATED",
            Event::RollbackStarted => "ROLLBACK_STARTED",
            Event::RollbackFailed => "ROLLBACK_FAILED",
            Event::RowInserted => "ROW_INSERTED",
            Event::RowUpdated => "ROW_UPDATED",
            Event::RowDeleted => "ROW_DELETED",
            Event::SearchExecuted => "SEARCH_EXECUTED",
            Event::SearchFallback => "SEARCH_FALLBACK",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
