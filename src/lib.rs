//! tabula - typed-column tables over embedded SQLite
//!
//! - schema: database/table/column metadata, the column type catalog and value validation
//! - query: the search language and its compilation to SQL predicates
//! - rows: validated row access and paginated search
//! - storage: the physical SQLite layer

pub mod cli;
pub mod observability;
pub mod query;
pub mod rows;
pub mod schema;
pub mod storage;
