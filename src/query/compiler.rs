//! Search string to parameterized filter predicate
//!
//! 1. Parse the search string (fall back to title substrings on failure)
//! 2. Resolve field tokens against the supplied column definitions
//! 3. Lower each term according to the target column's type
//! 4. Combine into one boolean expression with `?` placeholders
//!
//! Literals never appear in the SQL text; they are returned as bind values.

use tracing::debug;

use super::ast::{QueryNode, TermValue};
use super::dates::parse_date_term;
use super::parser::{parse_query, MAX_TERMS};
use crate::observability::Event;
use crate::schema::{quote_ident, ColumnDef, ColumnType, StorageType, TITLE_COLUMN};
use crate::storage::SqlValue;

/// Operands per parenthesized group before groups are nested
const MAX_GROUP_OPERANDS: usize = 32;

/// SQL filter text plus its bind values, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Predicate {
    /// Matches every row
    pub fn always_true() -> Self {
        Self {
            sql: "1".to_string(),
            params: Vec::new(),
        }
    }

    pub fn is_always_true(&self) -> bool {
        self.sql == "1" && self.params.is_empty()
    }

    fn leaf(sql: String, params: Vec<SqlValue>) -> Self {
        Self { sql, params }
    }

    /// Conjunction; an always-true side is dropped.
    pub fn and(self, other: Predicate) -> Predicate {
        if self.is_always_true() {
            return other;
        }
        if other.is_always_true() {
            return self;
        }
        self.combine("AND", other)
    }

    pub fn or(self, other: Predicate) -> Predicate {
        self.combine("OR", other)
    }

    pub fn negate(self) -> Predicate {
        Predicate {
            sql: format!("NOT ({})", self.sql),
            params: self.params,
        }
    }

    fn combine(self, connective: &str, other: Predicate) -> Predicate {
        Predicate::join(connective, vec![self, other])
    }

    /// Joins operands under one connective as flat groups of at most
    /// [`MAX_GROUP_OPERANDS`], so the SQL nests logarithmically in the
    /// operand count instead of linearly.
    fn join(connective: &str, mut operands: Vec<Predicate>) -> Predicate {
        while operands.len() > MAX_GROUP_OPERANDS {
            let mut grouped = Vec::with_capacity(operands.len() / MAX_GROUP_OPERANDS + 1);
            let mut rest = operands.into_iter().peekable();
            while rest.peek().is_some() {
                let chunk: Vec<Predicate> = rest.by_ref().take(MAX_GROUP_OPERANDS).collect();
                grouped.push(Predicate::flat(connective, chunk));
            }
            operands = grouped;
        }
        Predicate::flat(connective, operands)
    }

    fn flat(connective: &str, mut operands: Vec<Predicate>) -> Predicate {
        if operands.len() == 1 {
            if let Some(only) = operands.pop() {
                return only;
            }
        }
        let separator = format!(" {} ", connective);
        let mut sql = Vec::with_capacity(operands.len());
        let mut params = Vec::new();
        for operand in operands {
            sql.push(operand.sql);
            params.extend(operand.params);
        }
        Predicate {
            sql: format!("({})", sql.join(&separator)),
            params,
        }
    }
}

/// Comparison operator recognized at the start of numeric and date terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    pub fn sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            ">" => Some(Comparison::Gt),
            ">=" => Some(Comparison::Gte),
            "<" => Some(Comparison::Lt),
            "<=" => Some(Comparison::Lte),
            _ => None,
        }
    }

    /// Splits a leading operator off `term`.
    fn split(term: &str) -> (Option<Comparison>, &str) {
        for prefix in [">=", "<=", ">", "<"] {
            if let Some(rest) = term.strip_prefix(prefix) {
                return (Comparison::from_prefix(prefix), rest);
            }
        }
        (None, term)
    }
}

/// Column a field token resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    pub name: String,
    pub column_type: ColumnType,
}

impl ResolvedField {
    fn title() -> Self {
        Self {
            name: TITLE_COLUMN.to_string(),
            column_type: ColumnType::String,
        }
    }

    fn of(column: &ColumnDef) -> Self {
        Self {
            name: column.name.clone(),
            column_type: column.column_type,
        }
    }
}

/// Resolves `token` as a case-insensitive column name, then as `i<index>`.
pub fn resolve_column<'a>(token: &str, columns: &'a [ColumnDef]) -> Option<&'a ColumnDef> {
    let wanted = token.trim().to_lowercase();
    if let Some(col) = columns.iter().find(|c| c.name.to_lowercase() == wanted) {
        return Some(col);
    }
    let index: usize = wanted.strip_prefix('i')?.parse().ok()?;
    columns.iter().find(|c| c.index == index)
}

/// Compiles a search string against the given columns. Never fails.
pub fn compile_search(search: &str, columns: &[ColumnDef]) -> Predicate {
    match parse_query(search) {
        Ok(None) => Predicate::always_true(),
        Ok(Some(node)) => {
            debug!(terms = node.term_count(), "search parsed");
            QueryCompiler::new(columns).lower(&node)
        }
        Err(reason) => {
            debug!(
                event = %Event::SearchFallback,
                %reason,
                search,
                "search fell back to title substrings"
            );
            fallback_predicate(search)
        }
    }
}

/// Conjunction of title substring matches, one per whitespace-separated
/// token. Only the first [`MAX_TERMS`] tokens are used.
pub fn fallback_predicate(search: &str) -> Predicate {
    let operands: Vec<Predicate> = search
        .split_whitespace()
        .take(MAX_TERMS)
        .map(|token| substring(TITLE_COLUMN, StorageType::Text, token))
        .collect();
    if operands.is_empty() {
        return Predicate::always_true();
    }
    Predicate::join("AND", operands)
}

/// Lowers an AST against one table's columns. Borrows the columns for the
/// duration of the call only.
pub struct QueryCompiler<'a> {
    columns: &'a [ColumnDef],
}

impl<'a> QueryCompiler<'a> {
    pub fn new(columns: &'a [ColumnDef]) -> Self {
        Self { columns }
    }

    pub fn resolve(&self, token: &str) -> ResolvedField {
        resolve_column(token, self.columns)
            .map(ResolvedField::of)
            .unwrap_or_else(ResolvedField::title)
    }

    pub fn lower(&self, node: &QueryNode) -> Predicate {
        match node {
            QueryNode::Term(value) => lower_term(&ResolvedField::title(), value),
            QueryNode::Field { field, value } => lower_term(&self.resolve(field), value),
            QueryNode::And(operands) => Predicate::join("AND", self.lower_all(operands)),
            QueryNode::Or(operands) => Predicate::join("OR", self.lower_all(operands)),
            QueryNode::Not(inner) => self.lower(inner).negate(),
            QueryNode::Group(inner) => self.lower(inner),
        }
    }

    fn lower_all(&self, operands: &[QueryNode]) -> Vec<Predicate> {
        operands.iter().map(|node| self.lower(node)).collect()
    }
}

fn lower_term(target: &ResolvedField, value: &TermValue) -> Predicate {
    let storage = target.column_type.storage_type();
    let text = match value {
        TermValue::Regex(pattern) => return regex(&target.name, storage, pattern),
        TermValue::Text(text) => text.as_str(),
    };

    if target.column_type == ColumnType::Boolean {
        if let Some(flag) = parse_boolean(text) {
            return compare(&target.name, Comparison::Eq, SqlValue::Integer(flag));
        }
    }
    if target.column_type.is_numeric() {
        if let Some((op, number)) = parse_numeric(target.column_type, text) {
            return compare(&target.name, op, number);
        }
    }
    if target.column_type == ColumnType::Date {
        if let Some((op, day)) = parse_date_term(text) {
            return match op {
                None => {
                    let column = quote_ident(&target.name);
                    Predicate::leaf(
                        format!("({} >= ? AND {} <= ?)", column, column),
                        vec![SqlValue::Integer(day.start), SqlValue::Integer(day.end)],
                    )
                }
                Some(Comparison::Gt) => compare(&target.name, Comparison::Gt, day.end.into()),
                Some(Comparison::Gte) => compare(&target.name, Comparison::Gte, day.start.into()),
                Some(Comparison::Lt) => compare(&target.name, Comparison::Lt, day.start.into()),
                Some(Comparison::Lte) => compare(&target.name, Comparison::Lte, day.end.into()),
                Some(Comparison::Eq) => compare(&target.name, Comparison::Eq, day.start.into()),
            };
        }
    }
    substring(&target.name, storage, text)
}

fn parse_boolean(text: &str) -> Option<i64> {
    match text.trim().to_lowercase().as_str() {
        "true" | "1" => Some(1),
        "false" | "0" => Some(0),
        _ => None,
    }
}

fn parse_numeric(column_type: ColumnType, text: &str) -> Option<(Comparison, SqlValue)> {
    let (op, rest) = Comparison::split(text.trim());
    let rest = rest.trim();
    let integral = matches!(
        column_type,
        ColumnType::Integer | ColumnType::Rating | ColumnType::Boolean
    );
    let number = match rest.parse::<i64>() {
        Ok(i) if integral => SqlValue::Integer(i),
        _ => {
            let f = rest.parse::<f64>().ok().filter(|f| f.is_finite())?;
            SqlValue::Real(f)
        }
    };
    Some((op.unwrap_or(Comparison::Eq), number))
}

fn compare(column: &str, op: Comparison, value: SqlValue) -> Predicate {
    Predicate::leaf(
        format!("{} {} ?", quote_ident(column), op.sql()),
        vec![value],
    )
}

fn text_operand(column: &str, storage: StorageType) -> String {
    match storage {
        StorageType::Text => quote_ident(column),
        _ => format!("CAST({} AS TEXT)", quote_ident(column)),
    }
}

fn regex(column: &str, storage: StorageType, pattern: &str) -> Predicate {
    Predicate::leaf(
        format!("{} REGEXP ?", text_operand(column, storage)),
        vec![SqlValue::from(pattern)],
    )
}

fn substring(column: &str, storage: StorageType, text: &str) -> Predicate {
    Predicate::leaf(
        format!("{} LIKE ? ESCAPE '\\'", text_operand(column, storage)),
        vec![SqlValue::Text(format!("%{}%", escape_like(text)))],
    )
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableMeta;

    fn columns() -> Vec<ColumnDef> {
        let mut table = TableMeta::with_protected_columns();
        for (name, ty) in [
            ("count", ColumnType::Integer),
            ("due", ColumnType::Date),
            ("done", ColumnType::Boolean),
            ("score", ColumnType::AdvancedRating),
            ("tags", ColumnType::MultiTag),
        ] {
            table.insert_column(ColumnDef::new(name, ty, 0), None).unwrap();
        }
        table.ordered_columns().into_iter().cloned().collect()
    }

    fn compile(search: &str) -> Predicate {
        compile_search(search, &columns())
    }

    #[test]
    fn test_numeric_comparison() {
        let p = compile("count:>=5");
        assert_eq!(p.sql, "\"count\" >= ?");
        assert_eq!(p.params, vec![SqlValue::Integer(5)]);

        let p = compile("count:5");
        assert_eq!(p.sql, "\"count\" = ?");
        assert_eq!(p.params, vec![SqlValue::Integer(5)]);

        let p = compile("score:<7.5");
        assert_eq!(p.sql, "\"score\" < ?");
        assert_eq!(p.params, vec![SqlValue::Real(7.5)]);
    }

    #[test]
    fn test_non_numeric_term_on_numeric_column_is_substring() {
        let p = compile("count:many");
        assert_eq!(p.sql, "CAST(\"count\" AS TEXT) LIKE ? ESCAPE '\\'");
        assert_eq!(p.params, vec![SqlValue::from("%many%")]);
    }

    #[test]
    fn test_boolean_words() {
        for (term, flag) in [("TRUE", 1), ("false", 0), ("1", 1), ("0", 0)] {
            let p = compile(&format!("done:{}", term));
            assert_eq!(p.sql, "\"done\" = ?");
            assert_eq!(p.params, vec![SqlValue::Integer(flag)]);
        }
    }

    #[test]
    fn test_date_exact_day() {
        let p = compile("due:2024-01-10");
        assert_eq!(p.sql, "(\"due\" >= ? AND \"due\" <= ?)");
        assert_eq!(
            p.params,
            vec![
                SqlValue::Integer(1_704_844_800_000),
                SqlValue::Integer(1_704_931_199_999)
            ]
        );
    }

    #[test]
    fn test_date_bounds() {
        let p = compile("due:>2024-01-10");
        assert_eq!(p.sql, "\"due\" > ?");
        assert_eq!(p.params, vec![SqlValue::Integer(1_704_931_199_999)]);

        let p = compile("due:>=2024-01-10");
        assert_eq!(p.params, vec![SqlValue::Integer(1_704_844_800_000)]);

        let p = compile("due:<2024/1/10");
        assert_eq!(p.sql, "\"due\" < ?");
        assert_eq!(p.params, vec![SqlValue::Integer(1_704_844_800_000)]);

        let p = compile("due:<=2024-01-10");
        assert_eq!(p.params, vec![SqlValue::Integer(1_704_931_199_999)]);
    }

    #[test]
    fn test_positional_and_case_insensitive_fields() {
        // count is the first user column, right after the six protected ones
        assert_eq!(compile("i6:3"), compile("COUNT:3"));
        assert_eq!(compile("i1:dune"), compile("title:dune"));
    }

    #[test]
    fn test_unknown_field_falls_back_to_title() {
        let p = compile("nosuch:dune");
        assert_eq!(p.sql, "\"title\" LIKE ? ESCAPE '\\'");
        assert_eq!(p.params, vec![SqlValue::from("%dune%")]);
    }

    #[test]
    fn test_regex_term() {
        let p = compile("tags:/^red/");
        assert_eq!(p.sql, "\"tags\" REGEXP ?");
        assert_eq!(p.params, vec![SqlValue::from("^red")]);

        let p = compile("count:/^1/");
        assert_eq!(p.sql, "CAST(\"count\" AS TEXT) REGEXP ?");
    }

    #[test]
    fn test_connectives_keep_param_order() {
        let p = compile("(dune OR count:>2) AND !done:true");
        assert_eq!(
            p.sql,
            "((\"title\" LIKE ? ESCAPE '\\' OR \"count\" > ?) AND NOT (\"done\" = ?))"
        );
        assert_eq!(
            p.params,
            vec![SqlValue::from("%dune%"), SqlValue::Integer(2), SqlValue::Integer(1)]
        );
    }

    #[test]
    fn test_empty_is_always_true() {
        assert!(compile("").is_always_true());
        assert!(compile("   ").is_always_true());
    }

    #[test]
    fn test_like_wildcards_are_escaped() {
        let p = compile("100%_off");
        assert_eq!(p.params, vec![SqlValue::from("%100\\%\\_off%")]);
    }

    #[test]
    fn test_fallback_on_malformed() {
        let p = compile("(dune emma");
        assert_eq!(
            p.sql,
            "(\"title\" LIKE ? ESCAPE '\\' AND \"title\" LIKE ? ESCAPE '\\')"
        );
        assert_eq!(
            p.params,
            vec![SqlValue::from("%(dune%"), SqlValue::from("%emma%")]
        );
        assert_eq!(p, fallback_predicate("(dune emma"));
    }

    #[test]
    fn test_implicit_and_is_one_flat_group() {
        let p = compile("dune emma count:3");
        assert_eq!(
            p.sql,
            "(\"title\" LIKE ? ESCAPE '\\' AND \"title\" LIKE ? ESCAPE '\\' AND \"count\" = ?)"
        );
        assert_eq!(p.params.len(), 3);
    }

    fn paren_depth(sql: &str) -> usize {
        let mut depth = 0usize;
        let mut deepest = 0;
        for c in sql.chars() {
            match c {
                '(' => {
                    depth += 1;
                    deepest = deepest.max(depth);
                }
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        deepest
    }

    #[test]
    fn test_many_terms_nest_shallowly() {
        let words: Vec<String> = (0..500).map(|i| format!("w{}", i)).collect();
        let parsed = compile(&words.join(" "));
        assert_eq!(parsed.params.len(), 500);
        assert!(paren_depth(&parsed.sql) <= 2, "{}", paren_depth(&parsed.sql));

        let fallback = compile(&format!("({}", words.join(" ")));
        assert_eq!(fallback.params.len(), 500);
        assert!(paren_depth(&fallback.sql) <= 3);

        let capped = fallback_predicate(&vec!["w"; MAX_TERMS + 50].join(" "));
        assert_eq!(capped.params.len(), MAX_TERMS);
    }

    #[test]
    fn test_deep_nesting_falls_back_without_overflow() {
        for input in [
            "(".repeat(200_000),
            format!("{}a", "!".repeat(200_000)),
            format!("{}a{}", "(".repeat(5_000), ")".repeat(5_000)),
        ] {
            let p = compile(&input);
            assert_eq!(p, fallback_predicate(&input));
        }
    }

    #[test]
    fn test_fallback_never_panics() {
        for input in ["((((", "AND", "/unterminated", "\"", "a:", "!!!", "||", ")("] {
            let p = compile(input);
            assert!(!p.sql.is_empty());
        }
    }
}
