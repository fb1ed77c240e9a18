//! Schema introspection helpers.
//!
//! # Responsibility
//! - Answer "does this table/column exist" questions for readiness checks.
//! - Derive the tree layout from an existing `Tags` table.

use crate::db::DbResult;
use crate::model::layout::TreeLayout;
use rusqlite::Connection;

/// Table holding one row per tag.
pub const TAGS_TABLE: &str = "Tags";
/// Trigger-maintained `(id, ancestor)` helper table of the adjacency layout.
pub const TAGS_TREE_TABLE: &str = "TagsTree";
/// Key/value rows attached to tags.
pub const TAG_PROPERTIES_TABLE: &str = "TagProperties";

/// Returns the layout implied by the `Tags` columns.
///
/// Returns `None` when the `Tags` table does not exist yet.
pub fn detect_layout(conn: &Connection) -> DbResult<Option<TreeLayout>> {
    if !table_exists(conn, TAGS_TABLE)? {
        return Ok(None);
    }
    let nested =
        table_has_column(conn, TAGS_TABLE, "lft")? && table_has_column(conn, TAGS_TABLE, "rgt")?;
    Ok(Some(if nested {
        TreeLayout::NestedSet
    } else {
        TreeLayout::AdjacencyList
    }))
}

/// Returns whether `table` exists in the main schema.
pub fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Returns whether `table` has a column named `column`.
pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> DbResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
