//! CLI module for tabula
//!
//! Provides command-line access to:
//! - init: create the data directory and config
//! - db / table / column / tag / rule: schema operations
//! - row / search: row access and the search language

mod args;
mod commands;
mod errors;
mod io;

pub use args::{
    Cli, ColumnAction, Command, DbAction, RowAction, RuleAction, TableAction, TagAction,
};
pub use commands::{execute, init, open_engine, run, run_command, Config, Engine};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{parse_row, write_error, write_response};
