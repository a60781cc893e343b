//! Schema Metadata Engine
//!
//! Owns column definitions and their persistence. Structural operations run
//! in three steps:
//!
//! 1. Validate against a copy of the metadata record (no side effects)
//! 2. Apply the physical DDL steps through one scoped storage handle
//! 3. Compare-and-swap the edited record into the metadata store
//!
//! If step 3 fails, the DDL steps are undone in reverse order. If undoing
//! fails too, the caller gets an `Inconsistent` error naming both failures.
//! Undoing a dropped column or table recreates its shape, not its data.

use regex::Regex;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use super::errors::{SchemaError, SchemaResult};
use super::metadata::{MetadataStore, Versioned};
use super::naming::{checked_database_id, checked_name, normalize_name};
use super::types::{
    is_protected, now_millis, ColumnDef, ColumnExtras, ColumnType, DatabaseMeta, StorageType,
    TableMeta, HIDDEN_COLUMN, ID_COLUMN, TITLE_COLUMN,
};
use crate::observability::Event;
use crate::storage::{ColumnSpec, StorageHandle, StorageProvider, StorageResult};

/// One physical change and enough information to undo it
#[derive(Debug, Clone, PartialEq)]
enum Ddl {
    CreateTable { table: String, columns: Vec<ColumnSpec> },
    DropTable { table: String, columns: Vec<ColumnSpec> },
    RenameTable { old: String, new: String },
    AddColumn { table: String, name: String, storage_type: StorageType },
    DropColumn { table: String, name: String, storage_type: StorageType },
    RenameColumn { table: String, old: String, new: String },
}

impl Ddl {
    fn apply<H: StorageHandle>(&self, handle: &H) -> StorageResult<()> {
        match self {
            Ddl::CreateTable { table, columns } => handle.create_table(table, columns),
            Ddl::DropTable { table, .. } => handle.drop_table(table),
            Ddl::RenameTable { old, new } => handle.rename_table(old, new),
            Ddl::AddColumn { table, name, storage_type } => {
                handle.add_column(table, name, *storage_type)
            }
            Ddl::DropColumn { table, name, .. } => handle.drop_column(table, name),
            Ddl::RenameColumn { table, old, new } => handle.rename_column(table, old, new),
        }
    }

    fn inverse(&self) -> Ddl {
        match self.clone() {
            Ddl::CreateTable { table, columns } => Ddl::DropTable { table, columns },
            Ddl::DropTable { table, columns } => Ddl::CreateTable { table, columns },
            Ddl::RenameTable { old, new } => Ddl::RenameTable { old: new, new: old },
            Ddl::AddColumn { table, name, storage_type } => Ddl::DropColumn {
                table,
                name,
                storage_type,
            },
            Ddl::DropColumn { table, name, storage_type } => Ddl::AddColumn {
                table,
                name,
                storage_type,
            },
            Ddl::RenameColumn { table, old, new } => Ddl::RenameColumn {
                table,
                old: new,
                new: old,
            },
        }
    }

    fn describe(&self) -> String {
        match self {
            Ddl::CreateTable { table, .. } => format!("create table '{}'", table),
            Ddl::DropTable { table, .. } => format!("drop table '{}'", table),
            Ddl::RenameTable { old, new } => format!("rename table '{}' to '{}'", old, new),
            Ddl::AddColumn { table, name, .. } => format!("add column '{}.{}'", table, name),
            Ddl::DropColumn { table, name, .. } => format!("drop column '{}.{}'", table, name),
            Ddl::RenameColumn { table, old, new } => {
                format!("rename column '{}.{}' to '{}'", table, old, new)
            }
        }
    }
}

fn physical_constraint(column: &str) -> &'static str {
    match column {
        ID_COLUMN => "PRIMARY KEY AUTOINCREMENT",
        TITLE_COLUMN => "NOT NULL",
        HIDDEN_COLUMN => "NOT NULL DEFAULT 0",
        _ => "",
    }
}

/// Physical column list for a table's current definitions
fn table_specs(table: &TableMeta) -> Vec<ColumnSpec> {
    table
        .ordered_columns()
        .into_iter()
        .map(|c| ColumnSpec {
            name: c.name.clone(),
            storage_type: c.column_type.storage_type(),
            constraint: physical_constraint(&c.name),
        })
        .collect()
}

/// Options for [`SchemaEngine::create_column`]
#[derive(Debug, Clone, Default)]
pub struct NewColumn {
    pub hidden: bool,
    /// Position to insert at; the end when absent
    pub index: Option<usize>,
}

/// Schema Metadata Engine over a storage provider and a metadata store
pub struct SchemaEngine<P: StorageProvider, M: MetadataStore> {
    storage: P,
    metadata: M,
}

impl<P: StorageProvider, M: MetadataStore> SchemaEngine<P, M> {
    pub fn new(storage: P, metadata: M) -> Self {
        Self { storage, metadata }
    }

    pub fn storage(&self) -> &P {
        &self.storage
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    // ==================== internals ====================

    fn load(&self, database: &str) -> SchemaResult<Versioned<DatabaseMeta>> {
        self.metadata
            .load(database)?
            .ok_or_else(|| SchemaError::not_found("database", database))
    }

    pub(crate) fn open(&self, database: &str) -> SchemaResult<P::Handle> {
        self.storage
            .open(database)
            .map_err(|e| SchemaError::storage(format!("open database '{}'", database), e))
    }

    /// Runs one structural operation. `edit` validates and mutates a copy of
    /// the record and returns the DDL steps that realize the change.
    fn transact<R>(
        &self,
        database: &str,
        operation: &'static str,
        edit: impl FnOnce(&mut DatabaseMeta) -> SchemaResult<(R, Vec<Ddl>)>,
    ) -> SchemaResult<R> {
        let current = self.load(database)?;
        let mut meta = current.value.clone();
        let (result, steps) = edit(&mut meta)?;
        meta.modified_at = now_millis();

        if steps.is_empty() {
            self.metadata
                .compare_and_swap(database, Some(current.version), &meta)?;
            return Ok(result);
        }

        let handle = self.open(database)?;
        for (applied, step) in steps.iter().enumerate() {
            if let Err(e) = step.apply(&handle) {
                let err = SchemaError::storage(step.describe(), e);
                return Err(self.roll_back(&handle, database, operation, &steps[..applied], err));
            }
        }
        if let Err(err) = self
            .metadata
            .compare_and_swap(database, Some(current.version), &meta)
        {
            return Err(self.roll_back(&handle, database, operation, &steps, err));
        }
        Ok(result)
    }

    fn roll_back(
        &self,
        handle: &P::Handle,
        database: &str,
        operation: &'static str,
        applied: &[Ddl],
        original: SchemaError,
    ) -> SchemaError {
        if applied.is_empty() {
            return original;
        }
        warn!(
            event = %Event::RollbackStarted,
            database,
            operation,
            steps = applied.len(),
            error = %original,
            "undoing physical changes"
        );
        for step in applied.iter().rev() {
            let undo = step.inverse();
            if let Err(e) = undo.apply(handle) {
                let rollback = SchemaError::storage(undo.describe(), e);
                error!(
                    event = %Event::RollbackFailed,
                    database,
                    operation,
                    error = %rollback,
                    "storage and metadata diverged"
                );
                return SchemaError::inconsistent(operation, &original, &rollback);
            }
        }
        original
    }

    // ==================== databases ====================

    /// Creates the physical store and the metadata record.
    pub fn create_database(&self, name: &str) -> SchemaResult<DatabaseMeta> {
        let id = checked_database_id(name)?;
        if self.metadata.load(&id)?.is_some() || self.storage.database_exists(&id) {
            return Err(SchemaError::already_exists("database", id));
        }

        let meta = DatabaseMeta::new(&id, name.trim(), now_millis());
        self.storage
            .create_database(&id)
            .map_err(|e| SchemaError::storage(format!("create database '{}'", id), e))?;

        if let Err(err) = self.metadata.compare_and_swap(&id, None, &meta) {
            return Err(self.undo_database(&id, "create database", err, |s| {
                s.drop_database(&id)
            }));
        }

        info!(event = %Event::DatabaseCreated, database = %id, "database created");
        Ok(meta)
    }

    /// Moves the physical store and the metadata record to a new id together.
    pub fn rename_database(&self, database: &str, new_name: &str) -> SchemaResult<DatabaseMeta> {
        let old_id = normalize_name(database);
        let new_id = checked_database_id(new_name)?;
        let current = self.load(&old_id)?;

        let mut meta = current.value.clone();
        meta.name = new_name.trim().to_string();
        meta.modified_at = now_millis();

        if new_id == old_id {
            self.metadata
                .compare_and_swap(&old_id, Some(current.version), &meta)?;
            return Ok(meta);
        }
        if self.metadata.load(&new_id)?.is_some() || self.storage.database_exists(&new_id) {
            return Err(SchemaError::already_exists("database", new_id));
        }
        meta.id = new_id.clone();

        self.storage.rename_database(&old_id, &new_id).map_err(|e| {
            SchemaError::storage(format!("rename database '{}' to '{}'", old_id, new_id), e)
        })?;

        if let Err(err) = self.metadata.compare_and_swap(&new_id, None, &meta) {
            return Err(self.undo_database(&old_id, "rename database", err, |s| {
                s.rename_database(&new_id, &old_id)
            }));
        }
        if let Err(err) = self.metadata.remove(&old_id, current.version) {
            if let Err(rollback) = self.metadata.remove(&new_id, 1) {
                error!(event = %Event::RollbackFailed, database = %old_id, error = %rollback, "metadata diverged");
                return Err(SchemaError::inconsistent("rename database", &err, &rollback));
            }
            return Err(self.undo_database(&old_id, "rename database", err, |s| {
                s.rename_database(&new_id, &old_id)
            }));
        }

        info!(
            event = %Event::DatabaseRenamed,
            database = %old_id,
            new_database = %new_id,
            "database renamed"
        );
        Ok(meta)
    }

    /// Removes the metadata record, then the physical store. A failed
    /// physical drop restores the record.
    pub fn delete_database(&self, database: &str) -> SchemaResult<()> {
        let id = normalize_name(database);
        let current = self.load(&id)?;
        self.metadata.remove(&id, current.version)?;

        if let Err(e) = self.storage.drop_database(&id) {
            let err = SchemaError::storage(format!("drop database '{}'", id), e);
            warn!(event = %Event::RollbackStarted, database = %id, error = %err, "restoring metadata");
            if let Err(rollback) = self.metadata.compare_and_swap(&id, None, &current.value) {
                error!(event = %Event::RollbackFailed, database = %id, error = %rollback, "metadata diverged");
                return Err(SchemaError::inconsistent("delete database", &err, &rollback));
            }
            return Err(err);
        }

        info!(event = %Event::DatabaseDeleted, database = %id, "database deleted");
        Ok(())
    }

    pub fn set_database_visibility(&self, database: &str, hidden: bool) -> SchemaResult<()> {
        let id = normalize_name(database);
        self.transact(&id, "set database visibility", |meta| {
            meta.hidden = hidden;
            Ok(((), Vec::new()))
        })?;
        info!(event = %Event::DatabaseVisibilityChanged, database = %id, hidden, "database visibility changed");
        Ok(())
    }

    pub fn database(&self, database: &str) -> SchemaResult<DatabaseMeta> {
        Ok(self.load(&normalize_name(database))?.value)
    }

    /// Every database record, ordered by id
    pub fn list_databases(&self) -> SchemaResult<Vec<DatabaseMeta>> {
        let mut databases = Vec::new();
        for id in self.metadata.list()? {
            // A record removed between list and load is skipped.
            if let Some(record) = self.metadata.load(&id)? {
                databases.push(record.value);
            }
        }
        Ok(databases)
    }

    fn undo_database(
        &self,
        database: &str,
        operation: &'static str,
        original: SchemaError,
        undo: impl FnOnce(&P) -> StorageResult<()>,
    ) -> SchemaError {
        warn!(event = %Event::RollbackStarted, database, operation, error = %original, "undoing physical changes");
        match undo(&self.storage) {
            Ok(()) => original,
            Err(e) => {
                let rollback =
                    SchemaError::storage(format!("undo {} '{}'", operation, database), e);
                error!(event = %Event::RollbackFailed, database, operation, error = %rollback, "storage and metadata diverged");
                SchemaError::inconsistent(operation, &original, &rollback)
            }
        }
    }

    // ==================== tables ====================

    /// Creates a table holding only the six protected columns.
    pub fn create_table(&self, database: &str, name: &str) -> SchemaResult<TableMeta> {
        let db = normalize_name(database);
        let table = checked_name("table", name)?;
        let created = self.transact(&db, "create table", |meta| {
            if meta.tables.contains_key(&table) {
                return Err(SchemaError::already_exists("table", &table));
            }
            let def = TableMeta::with_protected_columns();
            let step = Ddl::CreateTable {
                table: table.clone(),
                columns: table_specs(&def),
            };
            meta.tables.insert(table.clone(), def.clone());
            Ok((def, vec![step]))
        })?;
        info!(event = %Event::TableCreated, database = %db, table = %table, "table created");
        Ok(created)
    }

    pub fn rename_table(&self, database: &str, table: &str, new_name: &str) -> SchemaResult<()> {
        let db = normalize_name(database);
        let old = normalize_name(table);
        let new = checked_name("table", new_name)?;
        self.transact(&db, "rename table", |meta| {
            if old == new {
                meta.table(&old)?;
                return Ok(((), Vec::new()));
            }
            if meta.tables.contains_key(&new) {
                return Err(SchemaError::already_exists("table", &new));
            }
            let def = meta
                .tables
                .remove(&old)
                .ok_or_else(|| SchemaError::not_found("table", &old))?;
            meta.tables.insert(new.clone(), def);
            Ok((
                (),
                vec![Ddl::RenameTable {
                    old: old.clone(),
                    new: new.clone(),
                }],
            ))
        })?;
        info!(event = %Event::TableRenamed, database = %db, table = %old, new_table = %new, "table renamed");
        Ok(())
    }

    pub fn delete_table(&self, database: &str, table: &str) -> SchemaResult<()> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        self.transact(&db, "delete table", |meta| {
            let def = meta
                .tables
                .remove(&table)
                .ok_or_else(|| SchemaError::not_found("table", &table))?;
            Ok((
                (),
                vec![Ddl::DropTable {
                    table: table.clone(),
                    columns: table_specs(&def),
                }],
            ))
        })?;
        info!(event = %Event::TableDeleted, database = %db, table = %table, "table deleted");
        Ok(())
    }

    pub fn set_table_visibility(
        &self,
        database: &str,
        table: &str,
        hidden: bool,
    ) -> SchemaResult<()> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        self.transact(&db, "set table visibility", |meta| {
            meta.table_mut(&table)?.hidden = hidden;
            Ok(((), Vec::new()))
        })?;
        info!(event = %Event::TableVisibilityChanged, database = %db, table = %table, hidden, "table visibility changed");
        Ok(())
    }

    /// Column definitions ordered by index
    pub fn columns(&self, database: &str, table: &str) -> SchemaResult<Vec<ColumnDef>> {
        let meta = self.database(database)?;
        Ok(meta
            .table(&normalize_name(table))?
            .ordered_columns()
            .into_iter()
            .cloned()
            .collect())
    }

    /// Confirms every defined column exists in physical storage.
    ///
    /// Only existence is checked; physical types are never consulted.
    pub fn verify_table(&self, database: &str, table: &str) -> SchemaResult<()> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        let columns = self.columns(&db, &table)?;
        let handle = self.open(&db)?;
        let physical = handle
            .table_columns(&table)
            .map_err(|e| SchemaError::storage(format!("inspect table '{}'", table), e))?;
        if physical.is_empty() {
            return Err(SchemaError::invariant(&table, "table is missing from storage"));
        }
        for col in &columns {
            if !physical.iter().any(|p| p == &col.name) {
                warn!(event = %Event::TableDrift, database = %db, table = %table, column = %col.name, "column missing from storage");
                return Err(SchemaError::invariant(
                    &col.name,
                    format!("column is defined on '{}' but missing from storage", table),
                ));
            }
        }
        Ok(())
    }

    // ==================== columns ====================

    /// Adds a column at the end, or at `options.index` shifting the rest.
    pub fn create_column(
        &self,
        database: &str,
        table: &str,
        name: &str,
        column_type: ColumnType,
        options: NewColumn,
    ) -> SchemaResult<ColumnDef> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        let name = checked_name("column", name)?;
        let created = self.transact(&db, "create column", |meta| {
            let def = meta.table_mut(&table)?;
            let mut column = ColumnDef::new(&name, column_type, 0);
            column.hidden = options.hidden;
            def.insert_column(column, options.index)?;
            let created = def.column(&name)?.clone();
            Ok((
                created,
                vec![Ddl::AddColumn {
                    table: table.clone(),
                    name: name.clone(),
                    storage_type: column_type.storage_type(),
                }],
            ))
        })?;
        info!(
            event = %Event::ColumnCreated,
            database = %db,
            table = %table,
            column = %name,
            column_type = %column_type,
            index = created.index,
            "column created"
        );
        Ok(created)
    }

    /// Renames and/or retypes a column. Rename runs first.
    ///
    /// Retyping drops and re-adds the physical column: existing values are
    /// lost and type extras reset, while index and visibility are kept.
    /// Retyping to the current type changes nothing.
    pub fn rename_or_retype(
        &self,
        database: &str,
        table: &str,
        column: &str,
        new_name: Option<&str>,
        new_type: Option<ColumnType>,
    ) -> SchemaResult<ColumnDef> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        let old = normalize_name(column);
        let new = new_name.map(|n| checked_name("column", n)).transpose()?;

        if is_protected(&old) {
            let verb = if new.is_some() { "renamed" } else { "retyped" };
            return Err(SchemaError::protected(old, verb));
        }
        if new.is_none() && new_type.is_none() {
            return Err(SchemaError::validation(old, "nothing to rename or retype"));
        }

        let updated = self.transact(&db, "rename or retype column", |meta| {
            let def = meta.table_mut(&table)?;
            let mut steps = Vec::new();
            let mut current = def.column(&old)?.name.clone();

            if let Some(new) = new.as_ref().filter(|n| **n != old) {
                if def.columns.contains_key(new) {
                    return Err(SchemaError::already_exists("column", new));
                }
                let mut col = def
                    .columns
                    .remove(&old)
                    .ok_or_else(|| SchemaError::not_found("column", &old))?;
                col.name = new.clone();
                def.columns.insert(new.clone(), col);
                steps.push(Ddl::RenameColumn {
                    table: table.clone(),
                    old: old.clone(),
                    new: new.clone(),
                });
                current = new.clone();
            }

            if let Some(ty) = new_type {
                let col = def.column_mut(&current)?;
                if col.column_type != ty {
                    steps.push(Ddl::DropColumn {
                        table: table.clone(),
                        name: current.clone(),
                        storage_type: col.column_type.storage_type(),
                    });
                    steps.push(Ddl::AddColumn {
                        table: table.clone(),
                        name: current.clone(),
                        storage_type: ty.storage_type(),
                    });
                    col.column_type = ty;
                    col.extras = ColumnExtras::default_for(ty);
                }
            }

            Ok((def.column(&current)?.clone(), steps))
        })?;

        if updated.name != old {
            info!(event = %Event::ColumnRenamed, database = %db, table = %table, column = %old, new_column = %updated.name, "column renamed");
        }
        if let Some(ty) = new_type {
            info!(event = %Event::ColumnRetyped, database = %db, table = %table, column = %updated.name, column_type = %ty, "column retyped");
        }
        Ok(updated)
    }

    /// Flips the hidden flag. Metadata only.
    pub fn update_visibility(
        &self,
        database: &str,
        table: &str,
        column: &str,
        hidden: bool,
    ) -> SchemaResult<()> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        let column = normalize_name(column);
        self.transact(&db, "update column visibility", |meta| {
            meta.table_mut(&table)?.column_mut(&column)?.hidden = hidden;
            Ok(((), Vec::new()))
        })?;
        info!(event = %Event::ColumnVisibilityChanged, database = %db, table = %table, column = %column, hidden, "column visibility changed");
        Ok(())
    }

    /// Trades index values with the column currently at `target`.
    pub fn swap_index(
        &self,
        database: &str,
        table: &str,
        column: &str,
        target: usize,
    ) -> SchemaResult<()> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        let column = normalize_name(column);
        self.transact(&db, "swap column index", |meta| {
            meta.table_mut(&table)?.swap_index(&column, target)?;
            Ok(((), Vec::new()))
        })?;
        info!(event = %Event::ColumnSwapped, database = %db, table = %table, column = %column, index = target, "column swapped");
        Ok(())
    }

    /// Moves a column to `new_index`, shifting the columns in between.
    pub fn move_index(
        &self,
        database: &str,
        table: &str,
        column: &str,
        new_index: usize,
    ) -> SchemaResult<()> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        let column = normalize_name(column);
        let moved = self.transact(&db, "move column index", |meta| {
            let def = meta.table_mut(&table)?;
            let before = def.column(&column)?.index;
            def.move_index(&column, new_index)?;
            Ok((before != new_index, Vec::new()))
        })?;
        if moved {
            info!(event = %Event::ColumnMoved, database = %db, table = %table, column = %column, index = new_index, "column moved");
        }
        Ok(())
    }

    /// Drops a column and closes the index gap it leaves.
    pub fn delete_column(&self, database: &str, table: &str, column: &str) -> SchemaResult<()> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        let column = normalize_name(column);
        if is_protected(&column) {
            return Err(SchemaError::protected(column, "deleted"));
        }
        self.transact(&db, "delete column", |meta| {
            let removed = meta.table_mut(&table)?.remove_column(&column)?;
            Ok((
                (),
                vec![Ddl::DropColumn {
                    table: table.clone(),
                    name: column.clone(),
                    storage_type: removed.column_type.storage_type(),
                }],
            ))
        })?;
        info!(event = %Event::ColumnDeleted, database = %db, table = %table, column = %column, "column deleted");
        Ok(())
    }

    /// Adds a tag to a tag column's vocabulary. Returns the normalized tag.
    pub fn register_tag(
        &self,
        database: &str,
        table: &str,
        column: &str,
        tag: &str,
        description: Option<&str>,
    ) -> SchemaResult<String> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        let column = normalize_name(column);
        let tag = checked_name("tag", tag)?;
        self.transact(&db, "register tag", |meta| {
            let tags = tag_vocabulary(meta.table_mut(&table)?, &column)?;
            if tags.contains_key(&tag) {
                return Err(SchemaError::already_exists("tag", &tag));
            }
            tags.insert(tag.clone(), description.unwrap_or_default().to_string());
            Ok(((), Vec::new()))
        })?;
        info!(event = %Event::TagRegistered, database = %db, table = %table, column = %column, tag = %tag, "tag registered");
        Ok(tag)
    }

    /// Removes a tag from the vocabulary. Returns false if it was absent.
    ///
    /// Rows already storing the tag keep it.
    pub fn unregister_tag(
        &self,
        database: &str,
        table: &str,
        column: &str,
        tag: &str,
    ) -> SchemaResult<bool> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        let column = normalize_name(column);
        let tag = normalize_name(tag);

        let current = self.load(&db)?;
        let mut meta = current.value;
        let tags = tag_vocabulary(meta.table_mut(&table)?, &column)?;
        if tags.remove(&tag).is_none() {
            return Ok(false);
        }

        self.transact(&db, "unregister tag", |meta| {
            tag_vocabulary(meta.table_mut(&table)?, &column)?.remove(&tag);
            Ok(((), Vec::new()))
        })?;
        info!(event = %Event::TagUnregistered, database = %db, table = %table, column = %column, tag = %tag, "tag unregistered");
        Ok(true)
    }

    /// Sets the pattern values of a custom column must match. An empty
    /// pattern removes the rule.
    pub fn update_custom_rule(
        &self,
        database: &str,
        table: &str,
        column: &str,
        pattern: &str,
    ) -> SchemaResult<()> {
        let db = normalize_name(database);
        let table = normalize_name(table);
        let column = normalize_name(column);
        if is_protected(&column) {
            return Err(SchemaError::protected(column, "given a rule"));
        }
        Regex::new(pattern).map_err(|e| SchemaError::invalid_rule(&column, pattern, e))?;
        self.transact(&db, "update custom rule", |meta| {
            let col = meta.table_mut(&table)?.column_mut(&column)?;
            if col.column_type != ColumnType::Custom {
                return Err(SchemaError::validation(
                    &column,
                    format!("rules apply to custom columns, not {}", col.column_type),
                ));
            }
            col.extras = ColumnExtras::Rule {
                rule: pattern.to_string(),
            };
            Ok(((), Vec::new()))
        })?;
        info!(event = %Event::RuleUpdated, database = %db, table = %table, column = %column, "custom rule updated");
        Ok(())
    }
}

/// Mutable vocabulary of a tag column
fn tag_vocabulary<'a>(
    table: &'a mut TableMeta,
    column: &str,
) -> SchemaResult<&'a mut BTreeMap<String, String>> {
    if is_protected(column) {
        return Err(SchemaError::protected(column, "given tags"));
    }
    let col = table.column_mut(column)?;
    let column_type = col.column_type;
    if !column_type.is_tag() {
        return Err(SchemaError::validation(
            column,
            format!("tags apply to tag columns, not {}", column_type),
        ));
    }
    if !matches!(col.extras, ColumnExtras::Tags { .. }) {
        col.extras = ColumnExtras::default_for(column_type);
    }
    match &mut col.extras {
        ColumnExtras::Tags { tags } => Ok(tags),
        _ => Err(SchemaError::invariant(column, "tag column without a vocabulary")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{MemoryMetadataStore, SchemaErrorCode};
    use crate::storage::SqliteProvider;
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> SchemaEngine<SqliteProvider, MemoryMetadataStore> {
        let storage = SqliteProvider::new(dir.path().join("databases")).unwrap();
        SchemaEngine::new(storage, MemoryMetadataStore::new())
    }

    #[test]
    fn test_inverse_round_trips() {
        let step = Ddl::RenameColumn {
            table: "t".into(),
            old: "a".into(),
            new: "b".into(),
        };
        assert_eq!(step.inverse().inverse(), step);
        assert!(matches!(
            Ddl::AddColumn {
                table: "t".into(),
                name: "a".into(),
                storage_type: StorageType::Real
            }
            .inverse(),
            Ddl::DropColumn {
                storage_type: StorageType::Real,
                ..
            }
        ));
    }

    #[test]
    fn test_protected_specs() {
        let specs = table_specs(&TableMeta::with_protected_columns());
        assert_eq!(specs.len(), 6);
        assert_eq!(specs[0].name, ID_COLUMN);
        assert_eq!(specs[0].constraint, "PRIMARY KEY AUTOINCREMENT");
        assert_eq!(specs[5].constraint, "NOT NULL DEFAULT 0");
    }

    #[test]
    fn test_create_column_stamps_database() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let db = engine.create_database("Library").unwrap();
        engine.create_table("library", "Books").unwrap();
        let col = engine
            .create_column(
                "library",
                "books",
                " Page Count ",
                ColumnType::Integer,
                NewColumn::default(),
            )
            .unwrap();
        assert_eq!(col.name, "page_count");
        assert_eq!(col.index, 6);

        let after = engine.database("library").unwrap();
        assert!(after.modified_at >= db.modified_at);
        engine.verify_table("library", "books").unwrap();
    }

    #[test]
    fn test_rename_then_retype_in_one_call() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine.create_database("lib").unwrap();
        engine.create_table("lib", "books").unwrap();
        engine
            .create_column(
                "lib",
                "books",
                "genre",
                ColumnType::MultiTag,
                NewColumn {
                    hidden: true,
                    index: Some(2),
                },
            )
            .unwrap();
        engine.register_tag("lib", "books", "genre", "SciFi", None).unwrap();

        let col = engine
            .rename_or_retype("lib", "books", "genre", Some("Category"), Some(ColumnType::String))
            .unwrap();
        assert_eq!(col.name, "category");
        assert_eq!(col.column_type, ColumnType::String);
        assert_eq!(col.index, 2);
        assert!(col.hidden);
        assert_eq!(col.extras, ColumnExtras::None);
        engine.verify_table("lib", "books").unwrap();
    }

    #[test]
    fn test_unregister_absent_tag_is_noop() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine.create_database("lib").unwrap();
        engine.create_table("lib", "books").unwrap();
        engine
            .create_column("lib", "books", "genre", ColumnType::SingleTag, NewColumn::default())
            .unwrap();
        let before = engine.metadata().load("lib").unwrap().unwrap().version;
        assert!(!engine.unregister_tag("lib", "books", "genre", "nope").unwrap());
        let after = engine.metadata().load("lib").unwrap().unwrap().version;
        assert_eq!(before, after);
    }

    #[test]
    fn test_rule_requires_custom_column() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine.create_database("lib").unwrap();
        engine.create_table("lib", "books").unwrap();
        engine
            .create_column("lib", "books", "isbn", ColumnType::Custom, NewColumn::default())
            .unwrap();
        engine
            .create_column("lib", "books", "pages", ColumnType::Integer, NewColumn::default())
            .unwrap();

        let err = engine.update_custom_rule("lib", "books", "isbn", "([").unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::Validation);
        assert!(err.message().contains("invalid rule"));

        let err = engine.update_custom_rule("lib", "books", "pages", "^\\d+$").unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::Validation);

        engine.update_custom_rule("lib", "books", "isbn", "^\\d{13}$").unwrap();
        let cols = engine.columns("lib", "books").unwrap();
        let isbn = cols.iter().find(|c| c.name == "isbn").unwrap();
        assert_eq!(isbn.rule(), Some("^\\d{13}$"));
    }
}
