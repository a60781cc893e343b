//! CLI argument definitions using clap
//!
//! Commands:
//! - tabula init [--data-dir <dir>]
//! - tabula db create|rename|delete|list|hide|show
//! - tabula table create|rename|delete|hide|show|verify
//! - tabula column add|rename|retype|hide|show|move|swap|delete|list
//! - tabula tag add|remove
//! - tabula rule set
//! - tabula row insert|update|delete|get
//! - tabula search <database> <table> [query]
//!
//! Every command accepts `--config <path>` (default `./tabula.json`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tabula - typed-column tables with a search language
#[derive(Parser, Debug)]
#[command(name = "tabula")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./tabula.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the data directory, and the config file if it is missing
    Init {
        /// Data directory written into a new config file
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Manage databases
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Manage tables
    Table {
        #[command(subcommand)]
        action: TableAction,
    },

    /// Manage columns
    Column {
        #[command(subcommand)]
        action: ColumnAction,
    },

    /// Manage a tag column's vocabulary
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },

    /// Manage a custom column's validation rule
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },

    /// Read and write rows
    Row {
        #[command(subcommand)]
        action: RowAction,
    },

    /// Search a table
    Search {
        database: String,
        table: String,
        /// Search string, e.g. `dune AND rating:>=4`
        #[arg(default_value = "")]
        query: String,
        /// `column`, `column.asc`, `column.desc` or `random`
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        offset: Option<u64>,
        /// Include rows marked hidden
        #[arg(long)]
        include_hidden: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum DbAction {
    Create { name: String },
    Rename { database: String, new_name: String },
    Delete { database: String },
    List,
    Hide { database: String },
    Show { database: String },
}

#[derive(Subcommand, Debug)]
pub enum TableAction {
    Create { database: String, name: String },
    Rename { database: String, table: String, new_name: String },
    Delete { database: String, table: String },
    Hide { database: String, table: String },
    Show { database: String, table: String },
    /// Check that every defined column exists in storage
    Verify { database: String, table: String },
}

#[derive(Subcommand, Debug)]
pub enum ColumnAction {
    Add {
        database: String,
        table: String,
        name: String,
        /// Column type, e.g. `integer`, `multi_tag`, `link`
        #[arg(long = "type")]
        column_type: String,
        #[arg(long)]
        hidden: bool,
        /// Insert at this index instead of the end
        #[arg(long)]
        index: Option<usize>,
    },
    Rename {
        database: String,
        table: String,
        column: String,
        new_name: String,
    },
    /// Change a column's type. Existing values in the column are discarded.
    Retype {
        database: String,
        table: String,
        column: String,
        column_type: String,
    },
    Hide { database: String, table: String, column: String },
    Show { database: String, table: String, column: String },
    Move {
        database: String,
        table: String,
        column: String,
        index: usize,
    },
    Swap {
        database: String,
        table: String,
        column: String,
        index: usize,
    },
    Delete { database: String, table: String, column: String },
    List { database: String, table: String },
}

#[derive(Subcommand, Debug)]
pub enum TagAction {
    Add {
        database: String,
        table: String,
        column: String,
        tag: String,
        #[arg(long)]
        description: Option<String>,
    },
    Remove {
        database: String,
        table: String,
        column: String,
        tag: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum RuleAction {
    /// Set the pattern; an empty pattern removes the rule
    Set {
        database: String,
        table: String,
        column: String,
        pattern: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum RowAction {
    /// Insert a row given as a JSON object
    Insert {
        database: String,
        table: String,
        fields: String,
    },
    /// Update fields of a row given as a JSON object
    Update {
        database: String,
        table: String,
        id: i64,
        fields: String,
    },
    Delete { database: String, table: String, id: i64 },
    Get { database: String, table: String, id: i64 },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
