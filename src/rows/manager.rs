//! Row Access Layer
//!
//! Row writes: schema supplies column definitions, each field is validated,
//! then stored. Row reads and searches: schema supplies column definitions,
//! the query compiler builds the filter, storage executes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::observability::Event;
use crate::query::{compile_search, Pagination, Predicate, SortSpec};
use crate::schema::{
    decode_link, normalize_name, now_millis, validate, ColumnDef, ColumnType, MetadataStore,
    SchemaEngine, SchemaError, SchemaResult, CREATED_COLUMN, HIDDEN_COLUMN, ID_COLUMN,
    MODIFIED_COLUMN, TITLE_COLUMN,
};
use crate::storage::{
    SelectQuery, SqlValue, StorageError, StorageHandle, StorageProvider, StoredRow,
};

/// One row rendered as a JSON object
pub type Row = Map<String, Value>;

/// Page size bounds for search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowConfig {
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for RowConfig {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            max_page_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Search string; empty matches everything
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub sort: SortSpec,
    #[serde(default)]
    pub pagination: Pagination,
    /// Include rows whose `hidden` flag is set
    #[serde(default)]
    pub include_hidden: bool,
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchPage {
    /// Rows passing the visibility filter
    pub total: u64,
    /// Rows passing the visibility filter and the search
    pub filtered: u64,
    pub rows: Vec<Row>,
}

/// Fields a caller may never write
const SYSTEM_COLUMNS: [&str; 3] = [ID_COLUMN, CREATED_COLUMN, MODIFIED_COLUMN];

pub struct RowManager<'a, P: StorageProvider, M: MetadataStore> {
    engine: &'a SchemaEngine<P, M>,
    config: RowConfig,
}

impl<'a, P: StorageProvider, M: MetadataStore> RowManager<'a, P, M> {
    pub fn new(engine: &'a SchemaEngine<P, M>, config: RowConfig) -> Self {
        Self { engine, config }
    }

    /// Inserts a row and returns its id. A non-blank title is required.
    pub fn insert(&self, database: &str, table: &str, fields: &Row) -> SchemaResult<i64> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        let columns = self.engine.columns(&db, &table)?;
        let mut values = prepare_values(&columns, fields)?;
        if !values.iter().any(|(name, _)| name == TITLE_COLUMN) {
            return Err(SchemaError::validation(TITLE_COLUMN, "title is required"));
        }

        let now = now_millis();
        values.push((CREATED_COLUMN.to_string(), SqlValue::Integer(now)));
        values.push((MODIFIED_COLUMN.to_string(), SqlValue::Integer(now)));

        let handle = self.engine.open(&db)?;
        let id = handle
            .insert(&table, &values)
            .map_err(|e| SchemaError::storage(format!("insert into '{}'", table), e))?;
        info!(event = %Event::RowInserted, database = %db, table = %table, id, "row inserted");
        Ok(id)
    }

    /// Partial update. Always stamps `modified_at`.
    pub fn update(&self, database: &str, table: &str, id: i64, fields: &Row) -> SchemaResult<()> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        let columns = self.engine.columns(&db, &table)?;
        let mut values = prepare_values(&columns, fields)?;
        values.push((MODIFIED_COLUMN.to_string(), SqlValue::Integer(now_millis())));

        let handle = self.engine.open(&db)?;
        let found = handle
            .update(&table, id, &values)
            .map_err(|e| SchemaError::storage(format!("update '{}'", table), e))?;
        if !found {
            return Err(SchemaError::not_found("row", id.to_string()));
        }
        info!(event = %Event::RowUpdated, database = %db, table = %table, id, fields = values.len() - 1, "row updated");
        Ok(())
    }

    pub fn delete(&self, database: &str, table: &str, id: i64) -> SchemaResult<()> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        // Table must exist in metadata, not only in storage.
        self.engine.columns(&db, &table)?;

        let handle = self.engine.open(&db)?;
        let found = handle
            .delete(&table, id)
            .map_err(|e| SchemaError::storage(format!("delete from '{}'", table), e))?;
        if !found {
            return Err(SchemaError::not_found("row", id.to_string()));
        }
        info!(event = %Event::RowDeleted, database = %db, table = %table, id, "row deleted");
        Ok(())
    }

    pub fn get(&self, database: &str, table: &str, id: i64) -> SchemaResult<Row> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        let columns = self.engine.columns(&db, &table)?;

        let handle = self.engine.open(&db)?;
        let params = [SqlValue::Integer(id)];
        let rows = handle
            .select(
                &table,
                &SelectQuery {
                    where_clause: "\"id\" = ?",
                    params: &params,
                    order_clause: "",
                    limit: Some(1),
                    offset: None,
                },
            )
            .map_err(|e| SchemaError::storage(format!("read from '{}'", table), e))?;
        rows.into_iter()
            .next()
            .map(|stored| render_row(&columns, stored))
            .ok_or_else(|| SchemaError::not_found("row", id.to_string()))
    }

    /// Compiles the search, applies visibility, sort and pagination.
    pub fn search(
        &self,
        database: &str,
        table: &str,
        options: &SearchOptions,
    ) -> SchemaResult<SearchPage> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        let columns = self.engine.columns(&db, &table)?;

        let visibility = if options.include_hidden {
            Predicate::always_true()
        } else {
            Predicate {
                sql: format!("\"{}\" = 0", HIDDEN_COLUMN),
                params: Vec::new(),
            }
        };
        let filter = compile_search(&options.query, &columns).and(visibility.clone());
        let order = options.sort.order_clause(&columns);
        let page = options
            .pagination
            .bounded(self.config.default_page_size, self.config.max_page_size);

        let handle = self.engine.open(&db)?;
        let storage_err = |e: StorageError| SchemaError::storage(format!("search '{}'", table), e);
        let total = handle
            .count(&table, &visibility.sql, &visibility.params)
            .map_err(storage_err)?;
        let filtered = handle
            .count(&table, &filter.sql, &filter.params)
            .map_err(storage_err)?;
        let rows = handle
            .select(
                &table,
                &SelectQuery {
                    where_clause: &filter.sql,
                    params: &filter.params,
                    order_clause: &order,
                    limit: page.limit,
                    offset: page.offset,
                },
            )
            .map_err(storage_err)?;

        debug!(where_clause = %filter.sql, order = %order, "search compiled");
        info!(
            event = %Event::SearchExecuted,
            database = %db,
            table = %table,
            total,
            filtered,
            returned = rows.len(),
            "search executed"
        );
        Ok(SearchPage {
            total,
            filtered,
            rows: rows
                .into_iter()
                .map(|stored| render_row(&columns, stored))
                .collect(),
        })
    }
}

/// Normalizes field names and validates each value against its column.
fn prepare_values(columns: &[ColumnDef], fields: &Row) -> SchemaResult<Vec<(String, SqlValue)>> {
    let mut values: Vec<(String, SqlValue)> = Vec::with_capacity(fields.len());
    for (raw, value) in fields {
        let name = normalize_name(raw);
        if SYSTEM_COLUMNS.contains(&name.as_str()) {
            return Err(SchemaError::protected(name, "written directly"));
        }
        let column = columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| SchemaError::validation(&name, "no such field"))?;
        if values.iter().any(|(n, _)| *n == name) {
            return Err(SchemaError::validation(&name, "field given more than once"));
        }

        let stored = validate(column, value)?;
        if name == TITLE_COLUMN && stored.as_text().map_or(true, |t| t.trim().is_empty()) {
            return Err(SchemaError::validation(TITLE_COLUMN, "title must not be blank"));
        }
        if name == HIDDEN_COLUMN && stored == SqlValue::Null {
            return Err(SchemaError::validation(HIDDEN_COLUMN, "hidden cannot be cleared"));
        }
        values.push((name, stored));
    }
    Ok(values)
}

/// Renders a stored row in column order, decoding link cells.
fn render_row(columns: &[ColumnDef], mut stored: StoredRow) -> Row {
    let mut row = Row::new();
    for column in columns {
        let value = stored.remove(&column.name).unwrap_or(SqlValue::Null);
        let rendered = match (&value, column.column_type) {
            (SqlValue::Text(text), ColumnType::Link) => {
                decode_link(text).unwrap_or_else(|| value.to_json())
            }
            _ => value.to_json(),
        };
        row.insert(column.name.clone(), rendered);
    }
    row
}
