//! SQLite storage collaborator
//!
//! One database file per database id under the provider's root directory.
//! Every handle registers the `regexp` predicate so `X REGEXP ?` works.

use rusqlite::functions::FunctionFlags;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::errors::{StorageError, StorageResult};
use super::{
    ColumnSpec, ScalarPredicate, SelectQuery, SqlValue, StorageHandle, StorageProvider, StoredRow,
};
use crate::query::regex_matches;
use crate::schema::{quote_ident, StorageType};

const DATABASE_EXTENSION: &str = "sqlite3";

/// Provider rooted at a directory of SQLite files
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    root: PathBuf,
}

impl SqliteProvider {
    /// Creates the root directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, database: &str) -> PathBuf {
        self.root.join(format!("{}.{}", database, DATABASE_EXTENSION))
    }
}

impl StorageProvider for SqliteProvider {
    type Handle = SqliteHandle;

    fn open(&self, database: &str) -> StorageResult<SqliteHandle> {
        let path = self.path_for(database);
        if !path.exists() {
            return Err(StorageError::DatabaseNotFound(database.to_string()));
        }
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let handle = SqliteHandle { conn };
        handle.register_scalar_function("regexp", regex_matches)?;
        debug!(database, "storage handle opened");
        Ok(handle)
    }

    fn create_database(&self, database: &str) -> StorageResult<()> {
        let path = self.path_for(database);
        if path.exists() {
            return Err(StorageError::DatabaseExists(database.to_string()));
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA user_version = 1;")?;
        Ok(())
    }

    fn drop_database(&self, database: &str) -> StorageResult<()> {
        let path = self.path_for(database);
        if !path.exists() {
            return Err(StorageError::DatabaseNotFound(database.to_string()));
        }
        fs::remove_file(&path)?;
        Ok(())
    }

    fn rename_database(&self, old: &str, new: &str) -> StorageResult<()> {
        let from = self.path_for(old);
        let to = self.path_for(new);
        if !from.exists() {
            return Err(StorageError::DatabaseNotFound(old.to_string()));
        }
        if to.exists() {
            return Err(StorageError::DatabaseExists(new.to_string()));
        }
        fs::rename(&from, &to)?;
        Ok(())
    }

    fn database_exists(&self, database: &str) -> bool {
        self.path_for(database).exists()
    }
}

/// Open connection to one database. Closed on drop.
pub struct SqliteHandle {
    conn: Connection,
}

impl SqliteHandle {
    fn execute(&self, sql: &str) -> StorageResult<()> {
        debug!(sql, "ddl");
        self.conn.execute(sql, [])?;
        Ok(())
    }
}

impl StorageHandle for SqliteHandle {
    fn create_table(&self, table: &str, columns: &[ColumnSpec]) -> StorageResult<()> {
        let specs: Vec<String> = columns
            .iter()
            .map(|c| {
                format!("{} {} {}", quote_ident(&c.name), c.storage_type.sql_name(), c.constraint)
                    .trim_end()
                    .to_string()
            })
            .collect();
        self.execute(&format!("CREATE TABLE {} ({})", quote_ident(table), specs.join(", ")))
    }

    fn drop_table(&self, table: &str) -> StorageResult<()> {
        self.execute(&format!("DROP TABLE {}", quote_ident(table)))
    }

    fn rename_table(&self, old: &str, new: &str) -> StorageResult<()> {
        self.execute(&format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(old),
            quote_ident(new)
        ))
    }

    fn add_column(&self, table: &str, name: &str, storage_type: StorageType) -> StorageResult<()> {
        self.execute(&format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table),
            quote_ident(name),
            storage_type.sql_name()
        ))
    }

    fn drop_column(&self, table: &str, name: &str) -> StorageResult<()> {
        self.execute(&format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_ident(table),
            quote_ident(name)
        ))
    }

    fn rename_column(&self, table: &str, old: &str, new: &str) -> StorageResult<()> {
        self.execute(&format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            quote_ident(table),
            quote_ident(old),
            quote_ident(new)
        ))
    }

    fn table_columns(&self, table: &str) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let names = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        if names.is_empty() {
            return Err(StorageError::TableNotFound(table.to_string()));
        }
        Ok(names)
    }

    fn select(&self, table: &str, query: &SelectQuery<'_>) -> StorageResult<Vec<StoredRow>> {
        let mut sql = format!(
            "SELECT * FROM {} WHERE {}",
            quote_ident(table),
            query.where_clause
        );
        if !query.order_clause.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(query.order_clause);
        }
        let mut params: Vec<SqlValue> = query.params.to_vec();
        match (query.limit, query.offset) {
            (Some(limit), offset) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                params.push(SqlValue::Integer(clamp_i64(limit)));
                params.push(SqlValue::Integer(clamp_i64(offset.unwrap_or(0))));
            }
            (None, Some(offset)) => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                params.push(SqlValue::Integer(clamp_i64(offset)));
            }
            (None, None) => {}
        }
        debug!(sql = %sql, params = params.len(), "select");

        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let mut out = StoredRow::new();
                for (i, name) in names.iter().enumerate() {
                    out.insert(name.clone(), row.get::<_, SqlValue>(i)?);
                }
                Ok(out)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count(&self, table: &str, where_clause: &str, params: &[SqlValue]) -> StorageResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", quote_ident(table), where_clause);
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn insert(&self, table: &str, values: &[(String, SqlValue)]) -> StorageResult<i64> {
        let columns: Vec<String> = values.iter().map(|(n, _)| quote_ident(n)).collect();
        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.join(", "),
            placeholders
        );
        self.conn
            .execute(&sql, params_from_iter(values.iter().map(|(_, v)| v)))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update(&self, table: &str, id: i64, values: &[(String, SqlValue)]) -> StorageResult<bool> {
        if values.is_empty() {
            return Ok(self.count(table, "\"id\" = ?", &[SqlValue::Integer(id)])? > 0);
        }
        let assignments: Vec<String> = values
            .iter()
            .map(|(n, _)| format!("{} = ?", quote_ident(n)))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE \"id\" = ?",
            quote_ident(table),
            assignments.join(", ")
        );
        let mut bound: Vec<&SqlValue> = values.iter().map(|(_, v)| v).collect();
        let id_value = SqlValue::Integer(id);
        bound.push(&id_value);
        let changed = self.conn.execute(&sql, params_from_iter(bound))?;
        Ok(changed > 0)
    }

    fn delete(&self, table: &str, id: i64) -> StorageResult<bool> {
        let sql = format!("DELETE FROM {} WHERE \"id\" = ?1", quote_ident(table));
        Ok(self.conn.execute(&sql, params![id])? > 0)
    }

    fn register_scalar_function(
        &self,
        name: &str,
        predicate: ScalarPredicate,
    ) -> StorageResult<()> {
        self.conn.create_scalar_function(
            name,
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            move |ctx| {
                let pattern = ctx.get_raw(0).as_str().ok();
                let value = ctx.get_raw(1).as_str().ok();
                Ok(match (pattern, value) {
                    (Some(p), Some(v)) => predicate(p, v),
                    _ => false,
                })
            },
        )?;
        Ok(())
    }
}

fn clamp_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}
