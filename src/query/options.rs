//! Sort and pagination options
//!
//! Sort strings look like `field`, `field.asc`, `field.desc`, or `random`.

use serde::{Deserialize, Serialize};

use super::compiler::resolve_column;
use crate::schema::{quote_ident, ColumnDef, SchemaError, SchemaResult, ID_COLUMN};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Column name or `i<index>` reference
    Column(String),
    Random,
}

/// Sort specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::asc(ID_COLUMN)
    }
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            key: SortKey::Column(field.into()),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            key: SortKey::Column(field.into()),
            direction: SortDirection::Desc,
        }
    }

    pub fn random() -> Self {
        Self {
            key: SortKey::Random,
            direction: SortDirection::Asc,
        }
    }

    /// Parses `field[.asc|.desc]` or `random`.
    pub fn parse(value: &str) -> SchemaResult<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(SchemaError::validation("sort", "sort key is empty"));
        }
        if value.eq_ignore_ascii_case("random") {
            return Ok(Self::random());
        }

        match value.rfind('.') {
            Some(dot) => {
                let field = &value[..dot];
                let direction = &value[dot + 1..];
                if field.is_empty() {
                    return Err(SchemaError::validation("sort", "sort key is empty"));
                }
                match direction.to_lowercase().as_str() {
                    "asc" => Ok(Self::asc(field)),
                    "desc" => Ok(Self::desc(field)),
                    _ => Err(SchemaError::validation(
                        "sort",
                        format!("invalid sort direction: {}", direction),
                    )),
                }
            }
            None => Ok(Self::asc(value)),
        }
    }

    /// ORDER BY body for this sort against the given columns.
    ///
    /// Column sorts carry an `id` tie-breaker so pages are stable.
    pub fn order_clause(&self, columns: &[ColumnDef]) -> String {
        let token = match &self.key {
            SortKey::Random => return "RANDOM()".to_string(),
            SortKey::Column(token) => token,
        };
        let column = resolve_column(token, columns)
            .map(|c| c.name.as_str())
            .unwrap_or(ID_COLUMN);
        let direction = self.direction.as_str();
        if column == ID_COLUMN {
            format!("{} {}", quote_ident(ID_COLUMN), direction)
        } else {
            format!(
                "{} {}, {} ASC",
                quote_ident(column),
                direction,
                quote_ident(ID_COLUMN)
            )
        }
    }
}

/// Row-count limit and offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Pagination {
    pub fn new(limit: Option<u64>, offset: Option<u64>) -> Self {
        Self { limit, offset }
    }

    /// Fills a missing limit with `default` and caps it at `max`.
    pub fn bounded(&self, default: u64, max: u64) -> Self {
        let limit = self.limit.unwrap_or(default).min(max);
        Self {
            limit: Some(limit),
            offset: self.offset.filter(|o| *o > 0),
        }
    }
}
