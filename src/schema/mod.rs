//! Schema subsystem for tabula
//!
//! Column Type Catalog, Value Validator and the Schema Metadata Engine.
//!
//! # Invariants
//!
//! - Column indices in a table always form a permutation of `0..N`
//! - The six protected columns are never renamed, retyped, moved or deleted
//! - Every user-supplied name is normalized before use
//! - Metadata is the source of truth for column semantics; physical
//!   introspection only confirms existence

mod checksum;
mod engine;
mod errors;
mod metadata;
mod naming;
mod types;
mod validator;

pub use engine::{NewColumn, SchemaEngine};
pub use errors::{SchemaError, SchemaErrorCode, SchemaResult, Severity};
pub use metadata::{FileMetadataStore, MemoryMetadataStore, MetadataStore, Versioned};
pub use naming::{checked_database_id, checked_name, normalize_name, quote_ident};
pub use types::{
    is_protected, now_millis, ColumnDef, ColumnExtras, ColumnType, DatabaseMeta, StorageType,
    TableMeta, CONTENT_COLUMN, CREATED_COLUMN, HIDDEN_COLUMN, ID_COLUMN, MODIFIED_COLUMN,
    PROTECTED_COLUMNS, TITLE_COLUMN,
};
pub use validator::{decode_link, validate, Link};
