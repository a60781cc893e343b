//! Search Tests
//!
//! Runs compiled searches against real SQLite tables:
//! - numeric, boolean and date comparisons select the right rows
//! - connectives, grouping and negation combine as written
//! - regex terms match via the registered predicate, bad patterns match nothing
//! - unparseable input falls back to title substrings without failing
//! - visibility, sorting and pagination compose with the filter

use serde_json::{json, Value};
use tabula::query::{Pagination, SortSpec};
use tabula::rows::{Row, RowConfig, RowManager, SearchOptions, SearchPage};
use tabula::schema::{ColumnType, MemoryMetadataStore, NewColumn, SchemaEngine};
use tabula::storage::SqliteProvider;
use tempfile::TempDir;

type Engine = SchemaEngine<SqliteProvider, MemoryMetadataStore>;

/// 2024-01-10T00:00:00.000Z
const JAN_10_START: i64 = 1_704_844_800_000;
/// 2024-01-10T23:59:59.999Z
const JAN_10_END: i64 = 1_704_931_199_999;
const DAY: i64 = 86_400_000;

// =============================================================================
// Helpers
// =============================================================================

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {}", other),
    }
}

fn setup() -> (TempDir, Engine) {
    let tmp = TempDir::new().unwrap();
    let engine = SchemaEngine::new(
        SqliteProvider::new(tmp.path()).unwrap(),
        MemoryMetadataStore::new(),
    );
    engine.create_database("lib").unwrap();
    engine.create_table("lib", "books").unwrap();
    for (name, ty) in [
        ("count", ColumnType::Integer),
        ("due", ColumnType::Date),
        ("done", ColumnType::Boolean),
        ("genre", ColumnType::MultiTag),
        ("stars", ColumnType::Rating),
    ] {
        engine
            .create_column("lib", "books", name, ty, NewColumn::default())
            .unwrap();
    }
    for tag in ["classic", "scifi", "horror"] {
        engine
            .register_tag("lib", "books", "genre", tag, None)
            .unwrap();
    }

    let rows = RowManager::new(&engine, RowConfig::default());
    let fixtures = [
        json!({
            "title": "Dune",
            "count": 3,
            "due": JAN_10_START,
            "done": true,
            "genre": "scifi classic",
            "stars": 5
        }),
        json!({
            "title": "Emma",
            "count": 5,
            "due": JAN_10_END,
            "done": false,
            "genre": "classic",
            "stars": 3
        }),
        json!({
            "title": "Dracula",
            "count": 8,
            "due": JAN_10_END + 1,
            "done": true,
            "genre": "horror classic",
            "stars": 4
        }),
        json!({
            "title": "Neuromancer",
            "count": 12,
            "due": JAN_10_START - DAY,
            "done": false,
            "genre": "scifi",
            "stars": 4
        }),
        json!({"title": "Draft notes", "count": 1, "hidden": true}),
    ];
    for fixture in fixtures {
        rows.insert("lib", "books", &row(fixture)).unwrap();
    }
    (tmp, engine)
}

fn search(engine: &Engine, options: SearchOptions) -> SearchPage {
    RowManager::new(engine, RowConfig::default())
        .search("lib", "books", &options)
        .unwrap()
}

fn titles(engine: &Engine, query: &str) -> Vec<String> {
    let page = search(
        engine,
        SearchOptions {
            query: query.to_string(),
            sort: SortSpec::asc("title"),
            ..SearchOptions::default()
        },
    );
    page.rows
        .iter()
        .map(|r| r["title"].as_str().unwrap_or_default().to_string())
        .collect()
}

// =============================================================================
// Typed Comparisons
// =============================================================================

#[test]
fn test_numeric_comparisons() {
    let (_tmp, engine) = setup();
    assert_eq!(titles(&engine, "count:>=5"), ["Dracula", "Emma", "Neuromancer"]);
    assert_eq!(titles(&engine, "count:5"), ["Emma"]);
    assert_eq!(titles(&engine, "count:<5"), ["Dune"]);
    assert_eq!(titles(&engine, "stars:4"), ["Dracula", "Neuromancer"]);
}

#[test]
fn test_positional_field_reference() {
    let (_tmp, engine) = setup();
    let count = engine
        .columns("lib", "books")
        .unwrap()
        .into_iter()
        .find(|c| c.name == "count")
        .unwrap();
    let query = format!("i{}:>10", count.index);
    assert_eq!(titles(&engine, &query), ["Neuromancer"]);
}

#[test]
fn test_boolean_words() {
    let (_tmp, engine) = setup();
    assert_eq!(titles(&engine, "done:TRUE"), ["Dracula", "Dune"]);
    assert_eq!(titles(&engine, "done:0"), ["Emma", "Neuromancer"]);
}

#[test]
fn test_date_day_bucketing() {
    let (_tmp, engine) = setup();
    assert_eq!(titles(&engine, "due:2024-01-10"), ["Dune", "Emma"]);
    assert_eq!(titles(&engine, "due:>2024-01-10"), ["Dracula"]);
    assert_eq!(titles(&engine, "due:>=2024/1/10"), ["Dracula", "Dune", "Emma"]);
    assert_eq!(titles(&engine, "due:<2024-01-10"), ["Neuromancer"]);
    assert_eq!(titles(&engine, "due:<=2024-01-10"), ["Dune", "Emma", "Neuromancer"]);
}

#[test]
fn test_non_numeric_term_is_substring() {
    let (_tmp, engine) = setup();
    // Not number-shaped, so it becomes a substring match over the stored text.
    assert_eq!(titles(&engine, "count:1x"), Vec::<String>::new());
    assert_eq!(titles(&engine, "genre:SCI"), ["Dune", "Neuromancer"]);
}

// =============================================================================
// Connectives
// =============================================================================

#[test]
fn test_connectives_and_negation() {
    let (_tmp, engine) = setup();
    assert_eq!(titles(&engine, "genre:classic AND done:1"), ["Dracula", "Dune"]);
    assert_eq!(titles(&engine, "emma || dune"), ["Dune", "Emma"]);
    assert_eq!(titles(&engine, "!genre:classic"), ["Neuromancer"]);
    assert_eq!(titles(&engine, "NOT (dracula OR emma) count:<10"), ["Dune"]);
    assert_eq!(titles(&engine, "d"), ["Dracula", "Dune"]);
}

#[test]
fn test_quoted_literals_are_bound_not_interpolated() {
    let (_tmp, engine) = setup();
    assert!(titles(&engine, "\"'; DROP TABLE books; --\"").is_empty());
    assert!(titles(&engine, "%").is_empty());
    assert_eq!(titles(&engine, "").len(), 4);
}

// =============================================================================
// Regex
// =============================================================================

#[test]
fn test_regex_terms() {
    let (_tmp, engine) = setup();
    assert_eq!(titles(&engine, "title:/^D/"), ["Dracula", "Dune"]);
    assert_eq!(titles(&engine, "count:/^1\\d$/"), ["Neuromancer"]);
    assert!(titles(&engine, "title:/([/").is_empty());
}

// =============================================================================
// Fallback
// =============================================================================

#[test]
fn test_malformed_query_falls_back_to_title_substrings() {
    let (_tmp, engine) = setup();
    RowManager::new(&engine, RowConfig::default())
        .update("lib", "books", 2, &row(json!({"title": "Emma (abridged)"})))
        .unwrap();

    // Tokens are matched literally, parentheses included.
    assert_eq!(titles(&engine, "(dun"), Vec::<String>::new());
    assert_eq!(titles(&engine, "(ABR"), ["Emma (abridged)"]);
    assert_eq!(titles(&engine, "emma (abr"), ["Emma (abridged)"]);
    assert_eq!(titles(&engine, "d) ("), ["Emma (abridged)"]);
    for bad in ["((", "||", "!", ")", "NOT"] {
        let page = search(
            &engine,
            SearchOptions {
                query: bad.to_string(),
                ..SearchOptions::default()
            },
        );
        assert_eq!(page.total, 4, "query {:?}", bad);
    }
}

// =============================================================================
// Long and Deeply Nested Queries
// =============================================================================

#[test]
fn test_long_queries_run_against_sqlite() {
    let (_tmp, engine) = setup();
    RowManager::new(&engine, RowConfig::default())
        .update("lib", "books", 1, &row(json!({"title": "Dune (dual edition)"})))
        .unwrap();

    let conjunction = vec!["du"; 250].join(" ");
    assert_eq!(titles(&engine, &conjunction), ["Dune (dual edition)"]);

    let disjunction = vec!["emma"; 250].join(" OR ");
    assert_eq!(titles(&engine, &disjunction), ["Emma"]);

    let mixed = vec!["(emma || neuro) !x"; 100].join(" ");
    assert_eq!(titles(&engine, &mixed), ["Emma", "Neuromancer"]);

    // Unclosed group, so every token is matched literally.
    let malformed = format!("(du {}", vec!["du"; 249].join(" "));
    assert_eq!(titles(&engine, &malformed), ["Dune (dual edition)"]);

    // Past the term cap the parser gives up and the fallback is truncated.
    let oversized = vec!["du"; 1500].join(" ");
    assert_eq!(titles(&engine, &oversized), ["Dune (dual edition)"]);
}

#[test]
fn test_deep_nesting_falls_back_without_failing() {
    let (_tmp, engine) = setup();

    let at_limit = format!("{}dune{}", "(".repeat(16), ")".repeat(16));
    assert_eq!(titles(&engine, &at_limit), ["Dune"]);

    let negations = format!("{}dune{}", "!(".repeat(8), ")".repeat(8));
    assert_eq!(titles(&engine, &negations), ["Dune"]);

    let over_limit = format!("{}dune{}", "(".repeat(17), ")".repeat(17));
    assert!(titles(&engine, &over_limit).is_empty());

    for deep in [
        "(".repeat(200_000),
        format!("{}a", "!".repeat(200_000)),
        format!("{}dune{}", "(".repeat(5_000), ")".repeat(5_000)),
    ] {
        let page = search(
            &engine,
            SearchOptions {
                query: deep,
                ..SearchOptions::default()
            },
        );
        assert_eq!(page.total, 4);
        assert_eq!(page.filtered, 0);
    }
}

// =============================================================================
// Visibility, Sort, Pagination
// =============================================================================

#[test]
fn test_visibility_and_counts() {
    let (_tmp, engine) = setup();
    let page = search(
        &engine,
        SearchOptions {
            query: "dr".to_string(),
            ..SearchOptions::default()
        },
    );
    assert_eq!(page.total, 4);
    assert_eq!(page.filtered, 1);

    let page = search(
        &engine,
        SearchOptions {
            query: "dr".to_string(),
            include_hidden: true,
            ..SearchOptions::default()
        },
    );
    assert_eq!(page.total, 5);
    assert_eq!(page.filtered, 2);
}

#[test]
fn test_sort_and_pagination() {
    let (_tmp, engine) = setup();
    let page = search(
        &engine,
        SearchOptions {
            sort: SortSpec::desc("count"),
            pagination: Pagination::new(Some(2), Some(1)),
            ..SearchOptions::default()
        },
    );
    assert_eq!(page.filtered, 4);
    let counts: Vec<&Value> = page.rows.iter().map(|r| &r["count"]).collect();
    assert_eq!(counts, [&json!(8), &json!(5)]);

    let page = search(
        &engine,
        SearchOptions {
            sort: SortSpec::random(),
            pagination: Pagination::new(Some(100_000), None),
            ..SearchOptions::default()
        },
    );
    assert_eq!(page.rows.len(), 4);
}
