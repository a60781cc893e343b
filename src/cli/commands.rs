//! CLI command implementations
//!
//! Each command loads the config, initializes logging, opens the schema
//! engine over the data directory, runs one operation and prints one JSON
//! response.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::observability::{init_logging, Event, LogFormat, LoggingConfig};
use crate::query::{Pagination, SortSpec};
use crate::rows::{RowConfig, RowManager, SearchOptions};
use crate::schema::{ColumnType, FileMetadataStore, NewColumn, SchemaEngine};
use crate::storage::SqliteProvider;

use super::args::{
    Cli, ColumnAction, Command, DbAction, RowAction, RuleAction, TableAction, TagAction,
};
use super::errors::{CliError, CliResult};
use super::io::{parse_row, write_response};

const DATABASES_DIR: &str = "databases";
const METADATA_DIR: &str = "metadata";
const DEFAULT_DATA_DIR: &str = "./data";

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Data directory (required)
    pub data_dir: String,

    /// Log filter directive (optional, default "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "json" or "pretty" (optional, default "pretty")
    #[serde(default)]
    pub log_format: LogFormat,

    /// Search page size when no limit is given (optional, default 100)
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,

    /// Upper bound on any search limit (optional, default 1000)
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_page_size() -> u64 {
    100
}
fn default_max_page_size() -> u64 {
    1000
}

impl Config {
    /// Config with defaults for everything but the data directory
    pub fn new(data_dir: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.data_dir.trim().is_empty() {
            return Err(CliError::config_error("data_dir must not be empty"));
        }
        if self.default_page_size == 0 {
            return Err(CliError::config_error("default_page_size must be > 0"));
        }
        if self.max_page_size < self.default_page_size {
            return Err(CliError::config_error(format!(
                "max_page_size ({}) must be >= default_page_size ({})",
                self.max_page_size, self.default_page_size
            )));
        }
        Ok(())
    }

    /// Get data directory as Path
    pub fn data_path(&self) -> &Path {
        Path::new(&self.data_dir)
    }

    pub fn databases_path(&self) -> PathBuf {
        self.data_path().join(DATABASES_DIR)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.data_path().join(METADATA_DIR)
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: self.log_format,
        }
    }

    pub fn rows(&self) -> RowConfig {
        RowConfig {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }
}

/// Engine type the CLI runs against
pub type Engine = SchemaEngine<SqliteProvider, FileMetadataStore>;

fn is_initialized(config: &Config) -> bool {
    config.metadata_path().is_dir() && config.databases_path().is_dir()
}

/// Opens the engine over an initialized data directory.
pub fn open_engine(config: &Config) -> CliResult<Engine> {
    if !is_initialized(config) {
        return Err(CliError::not_initialized());
    }
    let storage = SqliteProvider::new(config.databases_path())?;
    let metadata = FileMetadataStore::open(config.metadata_path())?;
    Ok(SchemaEngine::new(storage, metadata))
}

/// Main entry point for CLI
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(&cli.config, cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(config_path: &Path, cmd: Command) -> CliResult<()> {
    if let Command::Init { data_dir } = cmd {
        return init(config_path, data_dir.as_deref());
    }

    let config = Config::load(config_path)?;
    init_logging(&config.logging())?;
    info!(event = %Event::ConfigLoaded, path = %config_path.display(), "config loaded");
    let engine = open_engine(&config)?;
    let data = execute(&engine, &config, cmd)?;
    write_response(data)
}

/// Initialize a data directory
///
/// Writes a default config first if none exists at `config_path`.
pub fn init(config_path: &Path, data_dir: Option<&Path>) -> CliResult<()> {
    let config = if config_path.exists() {
        Config::load(config_path)?
    } else {
        let dir = data_dir
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let config = Config::new(dir);
        config.validate()?;
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(config_path, serde_json::to_string_pretty(&config)?)?;
        config
    };

    if is_initialized(&config) {
        return Err(CliError::already_initialized());
    }

    for dir in [config.databases_path(), config.metadata_path()] {
        fs::create_dir_all(&dir).map_err(|e| {
            CliError::config_error(format!("Failed to create directory {:?}: {}", dir, e))
        })?;
    }

    init_logging(&config.logging())?;
    info!(event = %Event::DataDirInitialized, data_dir = %config.data_dir, "data directory initialized");
    write_response(json!({"initialized": true, "data_dir": config.data_dir}))
}

fn parse_type(raw: &str) -> CliResult<ColumnType> {
    Ok(raw.parse::<ColumnType>()?)
}

/// Runs one non-init command and returns its JSON result.
pub fn execute(engine: &Engine, config: &Config, cmd: Command) -> CliResult<Value> {
    let data = match cmd {
        Command::Init { .. } => {
            return Err(CliError::invalid_argument("init runs before the engine opens"))
        }

        Command::Db { action } => match action {
            DbAction::Create { name } => serde_json::to_value(engine.create_database(&name)?)?,
            DbAction::Rename { database, new_name } => {
                serde_json::to_value(engine.rename_database(&database, &new_name)?)?
            }
            DbAction::Delete { database } => {
                engine.delete_database(&database)?;
                json!({"deleted": database})
            }
            DbAction::List => serde_json::to_value(engine.list_databases()?)?,
            DbAction::Hide { database } => {
                engine.set_database_visibility(&database, true)?;
                json!({"hidden": true})
            }
            DbAction::Show { database } => {
                engine.set_database_visibility(&database, false)?;
                json!({"hidden": false})
            }
        },

        Command::Table { action } => match action {
            TableAction::Create { database, name } => {
                serde_json::to_value(engine.create_table(&database, &name)?)?
            }
            TableAction::Rename {
                database,
                table,
                new_name,
            } => {
                engine.rename_table(&database, &table, &new_name)?;
                json!({"renamed": table})
            }
            TableAction::Delete { database, table } => {
                engine.delete_table(&database, &table)?;
                json!({"deleted": table})
            }
            TableAction::Hide { database, table } => {
                engine.set_table_visibility(&database, &table, true)?;
                json!({"hidden": true})
            }
            TableAction::Show { database, table } => {
                engine.set_table_visibility(&database, &table, false)?;
                json!({"hidden": false})
            }
            TableAction::Verify { database, table } => {
                engine.verify_table(&database, &table)?;
                json!({"verified": true})
            }
        },

        Command::Column { action } => column(engine, action)?,

        Command::Tag { action } => match action {
            TagAction::Add {
                database,
                table,
                column,
                tag,
                description,
            } => {
                let tag =
                    engine.register_tag(&database, &table, &column, &tag, description.as_deref())?;
                json!({"registered": tag})
            }
            TagAction::Remove {
                database,
                table,
                column,
                tag,
            } => {
                let removed = engine.unregister_tag(&database, &table, &column, &tag)?;
                json!({"removed": removed})
            }
        },

        Command::Rule { action } => match action {
            RuleAction::Set {
                database,
                table,
                column,
                pattern,
            } => {
                engine.update_custom_rule(&database, &table, &column, &pattern)?;
                json!({"rule": pattern})
            }
        },

        Command::Row { action } => {
            let rows = RowManager::new(engine, config.rows());
            match action {
                RowAction::Insert {
                    database,
                    table,
                    fields,
                } => {
                    let id = rows.insert(&database, &table, &parse_row(&fields)?)?;
                    json!({"id": id})
                }
                RowAction::Update {
                    database,
                    table,
                    id,
                    fields,
                } => {
                    rows.update(&database, &table, id, &parse_row(&fields)?)?;
                    json!({"id": id})
                }
                RowAction::Delete { database, table, id } => {
                    rows.delete(&database, &table, id)?;
                    json!({"deleted": id})
                }
                RowAction::Get { database, table, id } => {
                    Value::Object(rows.get(&database, &table, id)?)
                }
            }
        }

        Command::Search {
            database,
            table,
            query,
            sort,
            limit,
            offset,
            include_hidden,
        } => {
            let sort = match sort {
                Some(raw) => SortSpec::parse(&raw)?,
                None => SortSpec::default(),
            };
            let options = SearchOptions {
                query,
                sort,
                pagination: Pagination::new(limit, offset),
                include_hidden,
            };
            let page = RowManager::new(engine, config.rows()).search(&database, &table, &options)?;
            serde_json::to_value(page)?
        }
    };
    Ok(data)
}

fn column(engine: &Engine, action: ColumnAction) -> CliResult<Value> {
    let data = match action {
        ColumnAction::Add {
            database,
            table,
            name,
            column_type,
            hidden,
            index,
        } => {
            let options = NewColumn { hidden, index };
            let created =
                engine.create_column(&database, &table, &name, parse_type(&column_type)?, options)?;
            serde_json::to_value(created)?
        }
        ColumnAction::Rename {
            database,
            table,
            column,
            new_name,
        } => serde_json::to_value(engine.rename_or_retype(
            &database,
            &table,
            &column,
            Some(&new_name),
            None,
        )?)?,
        ColumnAction::Retype {
            database,
            table,
            column,
            column_type,
        } => serde_json::to_value(engine.rename_or_retype(
            &database,
            &table,
            &column,
            None,
            Some(parse_type(&column_type)?),
        )?)?,
        ColumnAction::Hide {
            database,
            table,
            column,
        } => {
            engine.update_visibility(&database, &table, &column, true)?;
            json!({"hidden": true})
        }
        ColumnAction::Show {
            database,
            table,
            column,
        } => {
            engine.update_visibility(&database, &table, &column, false)?;
            json!({"hidden": false})
        }
        ColumnAction::Move {
            database,
            table,
            column,
            index,
        } => {
            engine.move_index(&database, &table, &column, index)?;
            serde_json::to_value(engine.columns(&database, &table)?)?
        }
        ColumnAction::Swap {
            database,
            table,
            column,
            index,
        } => {
            engine.swap_index(&database, &table, &column, index)?;
            serde_json::to_value(engine.columns(&database, &table)?)?
        }
        ColumnAction::Delete {
            database,
            table,
            column,
        } => {
            engine.delete_column(&database, &table, &column)?;
            json!({"deleted": column})
        }
        ColumnAction::List { database, table } => {
            serde_json::to_value(engine.columns(&database, &table)?)?
        }
    };
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        Config::new(dir.path().join("data").to_string_lossy().into_owned())
    }

    #[test]
    fn test_config_defaults_and_validation() {
        let config: Config = serde_json::from_str(r#"{"data_dir": "/tmp/x"}"#).unwrap();
        assert_eq!(config, Config::new("/tmp/x"));
        config.validate().unwrap();

        let mut bad = Config::new("/tmp/x");
        bad.max_page_size = 10;
        assert!(bad.validate().is_err());
        bad.max_page_size = 100;
        bad.default_page_size = 0;
        assert!(bad.validate().is_err());
        assert!(Config::new(" ").validate().is_err());
    }

    #[test]
    fn test_config_missing_data_dir_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tabula.json");
        fs::write(&path, r#"{"log_level": "debug"}"#).unwrap();
        let err = Config::load(&path).unwrap_err();
        assert_eq!(err.code_str(), "TABULA_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_engine_requires_init() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        assert_eq!(
            open_engine(&config).err().map(|e| e.code_str()),
            Some("TABULA_CLI_NOT_INITIALIZED")
        );
    }

    #[test]
    fn test_execute_end_to_end() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        fs::create_dir_all(config.databases_path()).unwrap();
        fs::create_dir_all(config.metadata_path()).unwrap();
        let engine = open_engine(&config).unwrap();

        let run = |cmd: Command| execute(&engine, &config, cmd);
        run(Command::Db {
            action: DbAction::Create { name: "Lib".into() },
        })
        .unwrap();
        run(Command::Table {
            action: TableAction::Create {
                database: "lib".into(),
                name: "books".into(),
            },
        })
        .unwrap();
        let col = run(Command::Column {
            action: ColumnAction::Add {
                database: "lib".into(),
                table: "books".into(),
                name: "Pages".into(),
                column_type: "integer".into(),
                hidden: false,
                index: None,
            },
        })
        .unwrap();
        assert_eq!(col["name"], json!("pages"));
        assert_eq!(col["type"], json!("integer"));

        let err = run(Command::Column {
            action: ColumnAction::Add {
                database: "lib".into(),
                table: "books".into(),
                name: "x".into(),
                column_type: "blob".into(),
                hidden: false,
                index: None,
            },
        })
        .unwrap_err();
        assert_eq!(err.code_str(), "TABULA_VALIDATION_FAILED");

        let inserted = run(Command::Row {
            action: RowAction::Insert {
                database: "lib".into(),
                table: "books".into(),
                fields: r#"{"title": "Dune", "pages": 412}"#.into(),
            },
        })
        .unwrap();
        assert_eq!(inserted["id"], json!(1));

        let page = run(Command::Search {
            database: "lib".into(),
            table: "books".into(),
            query: "pages:>400".into(),
            sort: Some("pages.desc".into()),
            limit: None,
            offset: None,
            include_hidden: false,
        })
        .unwrap();
        assert_eq!(page["filtered"], json!(1));
        assert_eq!(page["rows"][0]["title"], json!("Dune"));
    }
}
