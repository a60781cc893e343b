//! Schema error types
//!
//! Error codes:
//! - TABULA_NOT_FOUND (REJECT)
//! - TABULA_CONFLICT (REJECT)
//! - TABULA_VALIDATION_FAILED (REJECT)
//! - TABULA_PROTECTED_COLUMN (REJECT)
//! - TABULA_STORAGE_REJECTED (REJECT)
//! - TABULA_INVARIANT_BROKEN (FATAL)
//! - TABULA_INCONSISTENT_STATE (FATAL)

use std::fmt;

use crate::storage::StorageError;

/// Severity levels for schema errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Client request rejected, nothing was changed
    Reject,
    /// Metadata and storage can no longer be trusted to agree
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Error kinds shared by the metadata engine, the validator and the row layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorCode {
    /// Database, table, column or row absent
    NotFound,
    /// Duplicate name, already-registered tag, or concurrent metadata change
    Conflict,
    /// Value or identifier fails type, shape or range checks
    Validation,
    /// Structural change attempted on a protected column
    Protected,
    /// Storage collaborator rejected a statement
    Storage,
    /// Metadata disagrees with the type catalog
    Invariant,
    /// A compensating rollback failed, storage and metadata have diverged
    Inconsistent,
}

impl SchemaErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::NotFound => "TABULA_NOT_FOUND",
            SchemaErrorCode::Conflict => "TABULA_CONFLICT",
            SchemaErrorCode::Validation => "TABULA_VALIDATION_FAILED",
            SchemaErrorCode::Protected => "TABULA_PROTECTED_COLUMN",
            SchemaErrorCode::Storage => "TABULA_STORAGE_REJECTED",
            SchemaErrorCode::Invariant => "TABULA_INVARIANT_BROKEN",
            SchemaErrorCode::Inconsistent => "TABULA_INCONSISTENT_STATE",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            SchemaErrorCode::Invariant | SchemaErrorCode::Inconsistent => Severity::Fatal,
            _ => Severity::Reject,
        }
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Schema error with the offending identifier attached
#[derive(Debug)]
pub struct SchemaError {
    code: SchemaErrorCode,
    message: String,
    /// Column, table, database, tag or rule the error is about
    subject: Option<String>,
    source: Option<StorageError>,
}

impl SchemaError {
    fn new(code: SchemaErrorCode, subject: Option<String>, message: String) -> Self {
        Self {
            code,
            message,
            subject,
            source: None,
        }
    }

    /// Something the caller named does not exist
    pub fn not_found(kind: &str, name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            SchemaErrorCode::NotFound,
            Some(name.clone()),
            format!("{} '{}' not found", kind, name),
        )
    }

    /// Something the caller tried to create already exists
    pub fn already_exists(kind: &str, name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            SchemaErrorCode::Conflict,
            Some(name.clone()),
            format!("{} '{}' already exists", kind, name),
        )
    }

    /// Metadata record changed between read and write
    pub fn concurrent_modification(database: impl Into<String>) -> Self {
        let database = database.into();
        Self::new(
            SchemaErrorCode::Conflict,
            Some(database.clone()),
            format!("metadata for database '{}' was modified concurrently", database),
        )
    }

    /// Value or identifier rejected
    pub fn validation(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        let subject = subject.into();
        Self::new(
            SchemaErrorCode::Validation,
            Some(subject.clone()),
            format!("'{}': {}", subject, reason.into()),
        )
    }

    /// Custom rule does not compile
    pub fn invalid_rule(column: impl Into<String>, rule: &str, reason: impl fmt::Display) -> Self {
        let column = column.into();
        Self::new(
            SchemaErrorCode::Validation,
            Some(column.clone()),
            format!("invalid rule '{}' on column '{}': {}", rule, column, reason),
        )
    }

    /// Structural change on a protected column
    pub fn protected(column: impl Into<String>, operation: &str) -> Self {
        let column = column.into();
        Self::new(
            SchemaErrorCode::Protected,
            Some(column.clone()),
            format!("column '{}' is protected and cannot be {}", column, operation),
        )
    }

    /// Storage collaborator rejected an operation
    pub fn storage(operation: impl Into<String>, source: StorageError) -> Self {
        let operation = operation.into();
        Self {
            code: SchemaErrorCode::Storage,
            message: format!("storage rejected {}: {}", operation, source),
            subject: Some(operation),
            source: Some(source),
        }
    }

    /// Metadata is unreadable or disagrees with the catalog
    pub fn invariant(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        let subject = subject.into();
        Self::new(
            SchemaErrorCode::Invariant,
            Some(subject.clone()),
            format!("internal consistency failure on '{}': {}", subject, reason.into()),
        )
    }

    /// A rollback failed after a metadata write failed
    pub fn inconsistent(operation: &str, original: &SchemaError, rollback: &SchemaError) -> Self {
        Self::new(
            SchemaErrorCode::Inconsistent,
            original.subject.clone(),
            format!(
                "{} left storage and metadata diverged: {} (rollback failed: {})",
                operation, original, rollback
            ),
        )
    }

    /// Returns the error code
    pub fn code(&self) -> SchemaErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the offending identifier if applicable
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code.code(), self.message)
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;
