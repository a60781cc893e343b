//! Row Access Layer
//!
//! Typed row reads and writes on top of the schema engine.

mod manager;

pub use manager::{Row, RowConfig, RowManager, SearchOptions, SearchPage};
