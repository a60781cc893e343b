//! Metadata Durability Tests
//!
//! - Column definitions survive an engine restart verbatim
//! - Database rename and delete keep storage and metadata together
//! - Row writes validate against the reloaded definitions

use serde_json::{json, Value};
use tabula::rows::{Row, RowConfig, RowManager};
use tabula::schema::{
    ColumnType, FileMetadataStore, NewColumn, SchemaEngine, SchemaErrorCode,
};
use tabula::storage::{SqliteProvider, StorageProvider};
use tempfile::TempDir;

type Engine = SchemaEngine<SqliteProvider, FileMetadataStore>;

fn open(tmp: &TempDir) -> Engine {
    SchemaEngine::new(
        SqliteProvider::new(tmp.path().join("databases")).unwrap(),
        FileMetadataStore::open(tmp.path().join("metadata")).unwrap(),
    )
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {}", other),
    }
}

#[test]
fn test_definitions_survive_restart() {
    let tmp = TempDir::new().unwrap();
    let before = {
        let engine = open(&tmp);
        engine.create_database("Reading List").unwrap();
        engine.create_table("reading_list", "Books").unwrap();
        engine
            .create_column(
                "reading_list",
                "books",
                "Genre",
                ColumnType::MultiTag,
                NewColumn::default(),
            )
            .unwrap();
        engine
            .register_tag("reading_list", "books", "genre", "Sci Fi", Some("speculative"))
            .unwrap();
        engine
            .create_column(
                "reading_list",
                "books",
                "isbn",
                ColumnType::Custom,
                NewColumn {
                    hidden: true,
                    index: Some(2),
                },
            )
            .unwrap();
        engine
            .update_custom_rule("reading_list", "books", "isbn", r"^\d{13}$")
            .unwrap();
        engine.database("reading_list").unwrap()
    };

    let engine = open(&tmp);
    let after = engine.database("reading_list").unwrap();
    assert_eq!(after, before);
    assert_eq!(after.name, "Reading List");

    let columns = engine.columns("reading_list", "books").unwrap();
    let isbn = columns.iter().find(|c| c.name == "isbn").unwrap();
    assert_eq!(isbn.index, 2);
    assert!(isbn.hidden);
    assert_eq!(isbn.rule(), Some(r"^\d{13}$"));
    engine.verify_table("reading_list", "books").unwrap();

    let rows = RowManager::new(&engine, RowConfig::default());
    let err = rows
        .insert("reading_list", "books", &row(json!({"title": "Dune", "isbn": "12"})))
        .unwrap_err();
    assert_eq!(err.code(), SchemaErrorCode::Validation);

    let err = rows
        .insert("reading_list", "books", &row(json!({"title": "Dune", "genre": "horror"})))
        .unwrap_err();
    assert_eq!(err.code(), SchemaErrorCode::Validation);
    assert_eq!(err.subject(), Some("genre"));

    let id = rows
        .insert(
            "reading_list",
            "books",
            &row(json!({"title": "Dune", "genre": "SCI_FI", "isbn": "9780441013593"})),
        )
        .unwrap();
    let stored = rows.get("reading_list", "books", id).unwrap();
    assert_eq!(stored["genre"], json!("sci_fi"));
    assert_eq!(stored["isbn"], json!("9780441013593"));
}

#[test]
fn test_database_rename_moves_storage_and_metadata() {
    let tmp = TempDir::new().unwrap();
    let engine = open(&tmp);
    engine.create_database("lib").unwrap();
    engine.create_table("lib", "books").unwrap();

    let renamed = engine.rename_database("lib", "Archive").unwrap();
    assert_eq!(renamed.id, "archive");
    assert!(engine.storage().database_exists("archive"));
    assert!(!engine.storage().database_exists("lib"));
    assert_eq!(
        engine.database("lib").unwrap_err().code(),
        SchemaErrorCode::NotFound
    );
    engine.verify_table("archive", "books").unwrap();

    engine.create_database("lib").unwrap();
    assert_eq!(
        engine.rename_database("lib", "archive").unwrap_err().code(),
        SchemaErrorCode::Conflict
    );
}

#[test]
fn test_database_delete_removes_both_sides() {
    let tmp = TempDir::new().unwrap();
    let engine = open(&tmp);
    engine.create_database("lib").unwrap();
    engine.create_database("scratch").unwrap();
    engine.delete_database("scratch").unwrap();

    assert!(!engine.storage().database_exists("scratch"));
    let ids: Vec<String> = engine
        .list_databases()
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(ids, ["lib"]);

    drop(engine);
    let engine = open(&tmp);
    assert_eq!(
        engine.database("scratch").unwrap_err().code(),
        SchemaErrorCode::NotFound
    );
}
