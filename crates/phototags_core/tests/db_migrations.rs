use phototags_core::db::migrations::latest_version;
use phototags_core::db::schema::detect_layout;
use phototags_core::db::{open_db, open_db_in_memory, DbError, LayoutChoice};
use phototags_core::{TreeLayout, ROOT_TAG_NAME};
use rusqlite::Connection;

#[test]
fn adjacency_layout_creates_tags_closure_and_properties() {
    let conn = open_db_in_memory(TreeLayout::AdjacencyList).unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "Tags");
    assert_table_exists(&conn, "TagsTree");
    assert_table_exists(&conn, "TagProperties");
    assert_eq!(
        detect_layout(&conn).unwrap(),
        Some(TreeLayout::AdjacencyList)
    );
    assert_eq!(count_rows(&conn, "Tags"), 0);
}

#[test]
fn nested_set_layout_seeds_reserved_root_row() {
    let conn = open_db_in_memory(TreeLayout::NestedSet).unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_eq!(detect_layout(&conn).unwrap(), Some(TreeLayout::NestedSet));

    let root: (i64, i64, String, i64, i64) = conn
        .query_row(
            "SELECT id, pid, name, lft, rgt FROM Tags;",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .unwrap();
    assert_eq!(root, (0, -1, ROOT_TAG_NAME.to_string(), 1, 2));
}

#[test]
fn closure_trigger_records_every_ancestor() {
    let conn = open_db_in_memory(TreeLayout::AdjacencyList).unwrap();
    conn.execute_batch(
        "INSERT INTO Tags (id, pid, name) VALUES (1, 0, 'Animals');
         INSERT INTO Tags (id, pid, name) VALUES (2, 1, 'Dogs');
         INSERT INTO Tags (id, pid, name) VALUES (3, 2, 'Terrier');",
    )
    .unwrap();

    let mut stmt = conn
        .prepare("SELECT pid FROM TagsTree WHERE id = 3 ORDER BY pid;")
        .unwrap();
    let ancestors: Vec<i64> = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .map(Result::unwrap)
        .collect();
    assert_eq!(ancestors, vec![0, 1, 2]);

    conn.execute("DELETE FROM Tags WHERE id = 3;", []).unwrap();
    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM TagsTree WHERE id = 3;", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(remaining, 0);
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tags.db");

    let conn_first = open_db(&path, TreeLayout::NestedSet).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path, LayoutChoice::Detect).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_eq!(
        detect_layout(&conn_second).unwrap(),
        Some(TreeLayout::NestedSet)
    );
    assert_eq!(count_rows(&conn_second, "Tags"), 1);
}

#[test]
fn detect_on_fresh_database_picks_adjacency_list() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db(dir.path().join("fresh.db"), LayoutChoice::Detect).unwrap();
    assert_eq!(
        detect_layout(&conn).unwrap(),
        Some(TreeLayout::AdjacencyList)
    );
}

#[test]
fn reopening_with_other_layout_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("adjacency.db");
    drop(open_db(&path, TreeLayout::AdjacencyList).unwrap());

    let err = open_db(&path, TreeLayout::NestedSet).unwrap_err();
    assert!(matches!(
        err,
        DbError::LayoutMismatch {
            requested: TreeLayout::NestedSet,
            found: TreeLayout::AdjacencyList,
        }
    ));
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path, LayoutChoice::Detect).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
