//! Column type catalog and schema metadata records
//!
//! Supported column types:
//! - string, rich_text: opaque text
//! - boolean: 0/1
//! - integer, float
//! - date: positive epoch milliseconds
//! - rating: integer 0-5, advanced_rating: real 0.0-10.0
//! - single_tag, multi_tag: tokens drawn from the column's vocabulary
//! - custom: text matched against the column's rule
//! - link: `{displayName, url}` JSON text

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::errors::{SchemaError, SchemaResult};

/// Physical storage class a column type maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Text,
    Integer,
    Real,
}

impl StorageType {
    /// SQL type name used in DDL
    pub fn sql_name(&self) -> &'static str {
        match self {
            StorageType::Text => "TEXT",
            StorageType::Integer => "INTEGER",
            StorageType::Real => "REAL",
        }
    }
}

/// Declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    RichText,
    Boolean,
    Integer,
    Float,
    Date,
    Rating,
    AdvancedRating,
    SingleTag,
    MultiTag,
    Custom,
    Link,
}

impl ColumnType {
    pub const ALL: [ColumnType; 12] = [
        ColumnType::String,
        ColumnType::RichText,
        ColumnType::Boolean,
        ColumnType::Integer,
        ColumnType::Float,
        ColumnType::Date,
        ColumnType::Rating,
        ColumnType::AdvancedRating,
        ColumnType::SingleTag,
        ColumnType::MultiTag,
        ColumnType::Custom,
        ColumnType::Link,
    ];

    /// Returns the type identifier
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::RichText => "rich_text",
            ColumnType::Boolean => "boolean",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Date => "date",
            ColumnType::Rating => "rating",
            ColumnType::AdvancedRating => "advanced_rating",
            ColumnType::SingleTag => "single_tag",
            ColumnType::MultiTag => "multi_tag",
            ColumnType::Custom => "custom",
            ColumnType::Link => "link",
        }
    }

    /// Physical storage type. Fixed and total.
    pub fn storage_type(&self) -> StorageType {
        match self {
            ColumnType::Boolean | ColumnType::Integer | ColumnType::Date | ColumnType::Rating => {
                StorageType::Integer
            }
            ColumnType::Float | ColumnType::AdvancedRating => StorageType::Real,
            ColumnType::String
            | ColumnType::RichText
            | ColumnType::SingleTag
            | ColumnType::MultiTag
            | ColumnType::Custom
            | ColumnType::Link => StorageType::Text,
        }
    }

    /// Types whose search terms may carry a comparison operator
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Integer
                | ColumnType::Float
                | ColumnType::Rating
                | ColumnType::AdvancedRating
                | ColumnType::Boolean
        )
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, ColumnType::SingleTag | ColumnType::MultiTag)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

impl FromStr for ColumnType {
    type Err = SchemaError;

    /// Unknown identifiers are a hard error, never a fallback to `string`.
    fn from_str(s: &str) -> SchemaResult<Self> {
        let wanted = s.trim().to_lowercase();
        ColumnType::ALL
            .iter()
            .copied()
            .find(|t| t.type_name() == wanted)
            .ok_or_else(|| SchemaError::validation(s, "unknown column type"))
    }
}

/// Type-specific column data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnExtras {
    #[default]
    None,
    /// Tag vocabulary, normalized tag name -> description
    Tags { tags: BTreeMap<String, String> },
    /// Validation pattern for custom columns, empty means unconstrained
    Rule { rule: String },
}

impl ColumnExtras {
    /// Fresh extras for a newly created or retyped column
    pub fn default_for(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::SingleTag | ColumnType::MultiTag => ColumnExtras::Tags {
                tags: BTreeMap::new(),
            },
            ColumnType::Custom => ColumnExtras::Rule {
                rule: String::new(),
            },
            _ => ColumnExtras::None,
        }
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub hidden: bool,
    pub index: usize,
    #[serde(default)]
    pub extras: ColumnExtras,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType, index: usize) -> Self {
        Self {
            name: name.into(),
            column_type,
            hidden: false,
            index,
            extras: ColumnExtras::default_for(column_type),
        }
    }

    pub fn is_protected(&self) -> bool {
        is_protected(&self.name)
    }

    /// Registered tag vocabulary, if this is a tag column
    pub fn tags(&self) -> Option<&BTreeMap<String, String>> {
        match &self.extras {
            ColumnExtras::Tags { tags } => Some(tags),
            _ => None,
        }
    }

    /// Custom rule, if one is set
    pub fn rule(&self) -> Option<&str> {
        match &self.extras {
            ColumnExtras::Rule { rule } if !rule.is_empty() => Some(rule),
            _ => None,
        }
    }
}

pub const ID_COLUMN: &str = "id";
pub const TITLE_COLUMN: &str = "title";
pub const CONTENT_COLUMN: &str = "content";
pub const CREATED_COLUMN: &str = "created_at";
pub const MODIFIED_COLUMN: &str = "modified_at";
pub const HIDDEN_COLUMN: &str = "hidden";

/// Columns present on every table, in their initial display order
pub const PROTECTED_COLUMNS: [(&str, ColumnType); 6] = [
    (ID_COLUMN, ColumnType::Integer),
    (TITLE_COLUMN, ColumnType::String),
    (CONTENT_COLUMN, ColumnType::RichText),
    (CREATED_COLUMN, ColumnType::Date),
    (MODIFIED_COLUMN, ColumnType::Date),
    (HIDDEN_COLUMN, ColumnType::Boolean),
];

/// Returns true for the fixed identifier/title/content/timestamp/hidden columns
pub fn is_protected(name: &str) -> bool {
    PROTECTED_COLUMNS.iter().any(|(n, _)| *n == name)
}

/// Per-table column definitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TableMeta {
    #[serde(default)]
    pub hidden: bool,
    pub columns: BTreeMap<String, ColumnDef>,
}

impl TableMeta {
    /// A table holding only the protected columns
    pub fn with_protected_columns() -> Self {
        let columns = PROTECTED_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, (name, ty))| (name.to_string(), ColumnDef::new(*name, *ty, i)))
            .collect();
        Self {
            hidden: false,
            columns,
        }
    }

    pub fn column(&self, name: &str) -> SchemaResult<&ColumnDef> {
        self.columns
            .get(name)
            .ok_or_else(|| SchemaError::not_found("column", name))
    }

    pub fn column_mut(&mut self, name: &str) -> SchemaResult<&mut ColumnDef> {
        self.columns
            .get_mut(name)
            .ok_or_else(|| SchemaError::not_found("column", name))
    }

    /// Columns ordered by index
    pub fn ordered_columns(&self) -> Vec<&ColumnDef> {
        let mut cols: Vec<_> = self.columns.values().collect();
        cols.sort_by_key(|c| c.index);
        cols
    }

    /// True when indices are exactly `{0, .., len-1}`
    pub fn has_dense_indices(&self) -> bool {
        let mut seen = vec![false; self.columns.len()];
        for col in self.columns.values() {
            match seen.get_mut(col.index) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        true
    }

    /// Appends a column at the end, then moves it to `explicit_index` if given.
    pub fn insert_column(
        &mut self,
        mut def: ColumnDef,
        explicit_index: Option<usize>,
    ) -> SchemaResult<()> {
        if self.columns.contains_key(&def.name) {
            return Err(SchemaError::already_exists("column", def.name));
        }
        let count = self.columns.len();
        if let Some(target) = explicit_index {
            if target > count {
                return Err(SchemaError::validation(
                    &def.name,
                    format!("index {} out of range 0..={}", target, count),
                ));
            }
        }
        def.index = count;
        let name = def.name.clone();
        self.columns.insert(name.clone(), def);
        if let Some(target) = explicit_index {
            self.shift_to(&name, target);
        }
        Ok(())
    }

    /// Removes a column and closes the gap it leaves.
    pub fn remove_column(&mut self, name: &str) -> SchemaResult<ColumnDef> {
        if is_protected(name) {
            return Err(SchemaError::protected(name, "deleted"));
        }
        let removed = self
            .columns
            .remove(name)
            .ok_or_else(|| SchemaError::not_found("column", name))?;
        for col in self.columns.values_mut() {
            if col.index > removed.index {
                col.index -= 1;
            }
        }
        Ok(removed)
    }

    /// Exchanges index values with whichever column holds `target`.
    pub fn swap_index(&mut self, name: &str, target: usize) -> SchemaResult<()> {
        if is_protected(name) {
            return Err(SchemaError::protected(name, "moved"));
        }
        let current = self.column(name)?.index;
        let other = self
            .columns
            .values()
            .find(|c| c.index == target)
            .map(|c| c.name.clone())
            .ok_or_else(|| SchemaError::not_found("column index", target.to_string()))?;
        if is_protected(&other) {
            return Err(SchemaError::protected(other, "moved"));
        }
        self.column_mut(&other)?.index = current;
        self.column_mut(name)?.index = target;
        Ok(())
    }

    /// Moves a column to `new_index`, shifting the columns in between by one.
    pub fn move_index(&mut self, name: &str, new_index: usize) -> SchemaResult<()> {
        if is_protected(name) {
            return Err(SchemaError::protected(name, "moved"));
        }
        self.column(name)?;
        if new_index >= self.columns.len() {
            return Err(SchemaError::validation(
                name,
                format!("index {} out of range 0..{}", new_index, self.columns.len()),
            ));
        }
        self.shift_to(name, new_index);
        Ok(())
    }

    fn shift_to(&mut self, name: &str, new_index: usize) {
        let old_index = match self.columns.get(name) {
            Some(col) => col.index,
            None => return,
        };
        if old_index == new_index {
            return;
        }
        for col in self.columns.values_mut() {
            if col.name == name {
                col.index = new_index;
            } else if old_index < new_index && col.index > old_index && col.index <= new_index {
                col.index -= 1;
            } else if new_index < old_index && col.index >= new_index && col.index < old_index {
                col.index += 1;
            }
        }
    }
}

/// Database metadata record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMeta {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub modified_at: i64,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub tables: BTreeMap<String, TableMeta>,
}

impl DatabaseMeta {
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at: now,
            modified_at: now,
            hidden: false,
            tables: BTreeMap::new(),
        }
    }

    pub fn table(&self, name: &str) -> SchemaResult<&TableMeta> {
        self.tables
            .get(name)
            .ok_or_else(|| SchemaError::not_found("table", name))
    }

    pub fn table_mut(&mut self, name: &str) -> SchemaResult<&mut TableMeta> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| SchemaError::not_found("table", name))
    }
}

/// Current time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
