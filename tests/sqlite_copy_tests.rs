#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! End-to-end copy runs between two in-memory SQLite databases. These
//! exercise the whole engine (introspection, planning, paging, chunked
//! inserts, transaction terminal) without needing a database server.

use tablesmith::core::{CopyError, PageCursor, RunParams, SqlValue};
use tablesmith::drivers::SqliteDriver;
use tablesmith::{DatabaseDriver, ops};

async fn driver_with(statements: &[&str]) -> SqliteDriver {
    let driver = SqliteDriver::connect("sqlite::memory:").await.unwrap();
    for sql in statements {
        driver.execute(sql).await.unwrap();
    }
    driver
}

async fn seed_items(driver: &SqliteDriver, count: usize) {
    for chunk in (1..=count).collect::<Vec<_>>().chunks(500) {
        let values: Vec<String> = chunk
            .iter()
            .map(|i| format!("({i}, 'name-{i}')"))
            .collect();
        driver
            .execute(&format!(
                "INSERT INTO items (id, name) VALUES {}",
                values.join(", ")
            ))
            .await
            .unwrap();
    }
}

async fn row_count(driver: &SqliteDriver, table: &str) -> i64 {
    driver.fetch_table_set().await.unwrap()[table].row_count
}

fn quiet_params() -> RunParams {
    RunParams {
        quiet: true,
        ..RunParams::default()
    }
}

#[tokio::test]
async fn test_copies_all_rows_across_multiple_pages() {
    let source = driver_with(&["CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)"]).await;
    let destination =
        driver_with(&["CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)"]).await;
    seed_items(&source, 2500).await;

    // batch 1000 forces three pages, the last one partial
    let outcome = ops::copy_tables(&source, &destination, &[], &quiet_params())
        .await
        .unwrap();

    assert!(outcome.committed);
    assert_eq!(outcome.total_rows, 2500);
    assert_eq!(outcome.rows_copied["items"], 2500);
    assert_eq!(row_count(&destination, "items").await, 2500);

    // spot check content and ordering survived the transfer
    let tables = destination.fetch_table_set().await.unwrap();
    let rows = destination
        .fetch_page(&tables["items"], &PageCursor::default(), 3)
        .await
        .unwrap();
    assert_eq!(rows[0]["id"], SqlValue::Integer(1));
    assert_eq!(rows[0]["name"], SqlValue::Text("name-1".to_string()));
    assert_eq!(rows[2]["id"], SqlValue::Integer(3));
}

#[tokio::test]
async fn test_dry_run_rolls_everything_back() {
    let source = driver_with(&[
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)",
        "INSERT INTO items (id, name) VALUES (1, 'a'), (2, 'b'), (3, 'c')",
    ])
    .await;
    let destination =
        driver_with(&["CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)"]).await;

    let params = RunParams {
        dry_run: true,
        ..quiet_params()
    };
    let outcome = ops::copy_tables(&source, &destination, &[], &params)
        .await
        .unwrap();

    // the copy ran in full, the transaction was then discarded
    assert!(!outcome.committed);
    assert_eq!(outcome.total_rows, 3);
    assert_eq!(row_count(&destination, "items").await, 0);
}

#[tokio::test]
async fn test_missing_destination_table_aborts_before_copying() {
    let source = driver_with(&[
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)",
        "INSERT INTO items (id, name) VALUES (1, 'a')",
        "CREATE TABLE extra (id INTEGER PRIMARY KEY)",
    ])
    .await;
    let destination =
        driver_with(&["CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)"]).await;

    let err = ops::copy_tables(&source, &destination, &[], &quiet_params())
        .await
        .unwrap_err();

    match err {
        CopyError::MissingDestinationTables { tables } => assert_eq!(tables, ["extra"]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(row_count(&destination, "items").await, 0);
}

#[tokio::test]
async fn test_missing_destination_table_skipped_when_allowed() {
    let source = driver_with(&[
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)",
        "INSERT INTO items (id, name) VALUES (1, 'a'), (2, 'b')",
        "CREATE TABLE extra (id INTEGER PRIMARY KEY)",
        "INSERT INTO extra (id) VALUES (9)",
    ])
    .await;
    let destination =
        driver_with(&["CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)"]).await;

    let params = RunParams {
        ignore_missing_tables: true,
        ..quiet_params()
    };
    let outcome = ops::copy_tables(&source, &destination, &[], &params)
        .await
        .unwrap();

    assert_eq!(outcome.rows_copied.len(), 1);
    assert_eq!(outcome.rows_copied["items"], 2);
    assert_eq!(row_count(&destination, "items").await, 2);
}

#[tokio::test]
async fn test_ignore_list_skips_table_on_both_ends() {
    let source = driver_with(&[
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)",
        "INSERT INTO items (id, name) VALUES (1, 'a')",
        "CREATE TABLE sessions (id INTEGER PRIMARY KEY, token TEXT)",
        "INSERT INTO sessions (id, token) VALUES (1, 's')",
    ])
    .await;
    let destination = driver_with(&[
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)",
        "CREATE TABLE sessions (id INTEGER PRIMARY KEY, token TEXT)",
    ])
    .await;

    let ignore = vec!["sessions".to_string()];
    let outcome = ops::copy_tables(&source, &destination, &ignore, &quiet_params())
        .await
        .unwrap();

    assert_eq!(outcome.rows_copied.len(), 1);
    assert_eq!(row_count(&destination, "items").await, 1);
    assert_eq!(row_count(&destination, "sessions").await, 0);
}

#[tokio::test]
async fn test_empty_string_into_json_column_becomes_empty_object() {
    let source = driver_with(&[
        "CREATE TABLE docs (id INTEGER PRIMARY KEY, payload TEXT)",
        "INSERT INTO docs (id, payload) VALUES (1, ''), (2, '{\"k\":1}')",
    ])
    .await;
    let destination =
        driver_with(&["CREATE TABLE docs (id INTEGER PRIMARY KEY, payload JSON)"]).await;

    ops::copy_tables(&source, &destination, &[], &quiet_params())
        .await
        .unwrap();

    let tables = destination.fetch_table_set().await.unwrap();
    let rows = destination
        .fetch_page(&tables["docs"], &PageCursor::default(), 10)
        .await
        .unwrap();
    assert_eq!(rows[0]["payload"], SqlValue::Text("{}".to_string()));
    assert_eq!(rows[1]["payload"], SqlValue::Text("{\"k\":1}".to_string()));
}

#[tokio::test]
async fn test_truncate_before_insert_discards_stale_rows() {
    let source = driver_with(&[
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)",
        "INSERT INTO items (id, name) VALUES (1, 'fresh')",
    ])
    .await;
    let destination = driver_with(&[
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)",
        "INSERT INTO items (id, name) VALUES (99, 'stale')",
    ])
    .await;

    let params = RunParams {
        truncate_before_insert: true,
        ..quiet_params()
    };
    ops::copy_tables(&source, &destination, &[], &params)
        .await
        .unwrap();

    let tables = destination.fetch_table_set().await.unwrap();
    let rows = destination
        .fetch_page(&tables["items"], &PageCursor::default(), 10)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], SqlValue::Integer(1));
}

#[tokio::test]
async fn test_composite_key_table_pages_by_offset() {
    let source = driver_with(&[
        "CREATE TABLE pairs (a INTEGER, b INTEGER, PRIMARY KEY (a, b))",
    ])
    .await;
    let destination = driver_with(&[
        "CREATE TABLE pairs (a INTEGER, b INTEGER, PRIMARY KEY (a, b))",
    ])
    .await;

    let values: Vec<String> = (0..120).map(|i| format!("({}, {})", i / 10, i % 10)).collect();
    source
        .execute(&format!(
            "INSERT INTO pairs (a, b) VALUES {}",
            values.join(", ")
        ))
        .await
        .unwrap();

    let params = RunParams {
        batch_size: 50,
        ..quiet_params()
    };
    let outcome = ops::copy_tables(&source, &destination, &[], &params)
        .await
        .unwrap();

    assert_eq!(outcome.total_rows, 120);
    assert_eq!(row_count(&destination, "pairs").await, 120);
}

#[tokio::test]
async fn test_table_without_primary_key_is_copied() {
    let source = driver_with(&[
        "CREATE TABLE log (line TEXT)",
        "INSERT INTO log (line) VALUES ('a'), ('b'), ('c'), ('d'), ('e')",
    ])
    .await;
    let destination = driver_with(&["CREATE TABLE log (line TEXT)"]).await;

    let params = RunParams {
        batch_size: 2,
        ..quiet_params()
    };
    let outcome = ops::copy_tables(&source, &destination, &[], &params)
        .await
        .unwrap();

    assert_eq!(outcome.total_rows, 5);
    assert_eq!(row_count(&destination, "log").await, 5);
}

#[tokio::test]
async fn test_zero_batch_size_is_rejected_before_touching_anything() {
    let source = driver_with(&[
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)",
        "INSERT INTO items (id, name) VALUES (1, 'a')",
    ])
    .await;
    let destination = driver_with(&[
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)",
        "INSERT INTO items (id, name) VALUES (99, 'stale')",
    ])
    .await;

    // a zero batch used to fetch nothing and commit, wiping truncated
    // tables; it must fail up front instead
    let params = RunParams {
        batch_size: 0,
        truncate_before_insert: true,
        ..quiet_params()
    };
    let err = ops::copy_tables(&source, &destination, &[], &params)
        .await
        .unwrap_err();

    assert!(matches!(err, CopyError::Config(_)));
    assert_eq!(row_count(&destination, "items").await, 1);
}

#[tokio::test]
async fn test_insert_failure_rolls_back_the_whole_run() {
    let source = driver_with(&[
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)",
        "INSERT INTO items (id, name) VALUES (1, 'a'), (2, NULL)",
    ])
    .await;
    let destination = driver_with(&[
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        "INSERT INTO items (id, name) VALUES (99, 'keep')",
    ])
    .await;

    // the NULL row violates the destination constraint mid-copy
    let err = ops::copy_tables(&source, &destination, &[], &quiet_params())
        .await
        .unwrap_err();

    match err {
        CopyError::Insert { table, .. } => assert_eq!(table, "items"),
        other => panic!("unexpected error: {other}"),
    }

    // the destination looks exactly as it did before the run
    let tables = destination.fetch_table_set().await.unwrap();
    let rows = destination
        .fetch_page(&tables["items"], &PageCursor::default(), 10)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], SqlValue::Integer(99));
    assert_eq!(rows[0]["name"], SqlValue::Text("keep".to_string()));
}

#[tokio::test]
async fn test_driver_reports_dialect_and_quoting() {
    let driver = driver_with(&[]).await;

    assert_eq!(driver.dialect().to_string(), "sqlite");
    assert_eq!(driver.quote_identifier("odd\"name"), "\"odd\"\"name\"");
}
