//! Query Compiler
//!
//! Turns a free-form search string plus sort and pagination options into a
//! parameterized filter that the storage layer executes. Compilation never
//! fails: a string the grammar rejects degrades to title substring matches.

mod ast;
mod compiler;
mod dates;
mod lexer;
mod options;
mod parser;
mod regexp;

pub use ast::{QueryNode, TermValue};
pub use compiler::{
    compile_search, fallback_predicate, resolve_column, Comparison, Predicate, QueryCompiler,
    ResolvedField,
};
pub use dates::{parse_date_term, DayBounds};
pub use lexer::{Token, Tokenizer};
pub use options::{Pagination, SortDirection, SortKey, SortSpec};
pub use parser::{parse_query, Parser};
pub use regexp::regex_matches;
