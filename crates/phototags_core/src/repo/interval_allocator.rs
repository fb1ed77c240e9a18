//! Nested-set interval bookkeeping for structural tag mutations.
//!
//! # Responsibility
//! - Open a two-unit gap at the right edge of a parent before insert.
//! - Close the gap left by a deleted leaf.
//! - Refuse structural changes (`pid`, `lft`, `rgt`) on persisted rows.
//!
//! # Invariants
//! - Callers run these functions inside the transaction of the triggering
//!   mutation; nothing here commits.
//! - Only leaves (`rgt - lft == 1`) can be removed.

use crate::model::tag::{NestedInterval, Tag, TagId};
use crate::repo::tag_repo::{TagRepoError, TagRepoResult};
use rusqlite::{Connection, OptionalExtension};

/// Shifts every interval at or beyond the parent's right edge by two and
/// returns the interval reserved for the new child.
///
/// # Errors
/// - `ParentNotFound` when `parent_id` has no row.
pub(crate) fn open_gap_under(
    conn: &Connection,
    parent_id: TagId,
) -> TagRepoResult<NestedInterval> {
    let position: i64 = conn
        .query_row(
            "SELECT rgt FROM Tags WHERE id = ?1;",
            [parent_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(TagRepoError::ParentNotFound(parent_id))?;

    conn.execute(
        "UPDATE Tags
         SET lft = CASE WHEN lft >= ?1 THEN lft + 2 ELSE lft END,
             rgt = rgt + 2
         WHERE rgt >= ?1;",
        [position],
    )?;

    Ok(NestedInterval::new(position, position + 1))
}

/// Fails unless `interval` belongs to a leaf.
pub(crate) fn ensure_leaf(tag_id: TagId, interval: NestedInterval) -> TagRepoResult<()> {
    if interval.width() > 1 {
        return Err(TagRepoError::HasChildren(tag_id));
    }
    Ok(())
}

/// Pulls every interval beyond the removed leaf back by two.
///
/// Must run after the leaf row itself has been deleted.
pub(crate) fn close_gap_at(conn: &Connection, removed: NestedInterval) -> TagRepoResult<usize> {
    let changed = conn.execute(
        "UPDATE Tags
         SET lft = CASE WHEN lft > ?1 THEN lft - 2 ELSE lft END,
             rgt = rgt - 2
         WHERE rgt > ?1;",
        [removed.right],
    )?;
    Ok(changed)
}

/// Rejects updates that would move a node or rewrite its interval.
///
/// Only fields edited in memory are compared with the stored row; a loaded
/// tag whose interval went stale after other inserts still saves.
/// Moving subtrees is not supported: the caller must remove and re-add.
pub(crate) fn ensure_structure_unchanged(stored: &Tag, updated: &Tag) -> TagRepoResult<()> {
    if updated.parent_id_edited() && stored.parent_id() != updated.parent_id() {
        return Err(TagRepoError::UnsupportedMutation {
            id: stored.id(),
            field: "pid",
        });
    }
    if !updated.interval_edited() {
        return Ok(());
    }
    let (before, after) = (stored.interval(), updated.interval());
    if before.map(|value| value.left) != after.map(|value| value.left) {
        return Err(TagRepoError::UnsupportedMutation {
            id: stored.id(),
            field: "lft",
        });
    }
    if before.map(|value| value.right) != after.map(|value| value.right) {
        return Err(TagRepoError::UnsupportedMutation {
            id: stored.id(),
            field: "rgt",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{close_gap_at, ensure_leaf, ensure_structure_unchanged, open_gap_under};
    use crate::model::tag::{NestedInterval, Tag, TagIcon};
    use crate::repo::tag_repo::TagRepoError;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(include_str!("../db/migrations/0001_tags_nested_set.sql"))
            .unwrap();
        conn
    }

    fn intervals(conn: &Connection) -> Vec<(i64, i64, i64)> {
        let mut stmt = conn
            .prepare("SELECT id, lft, rgt FROM Tags ORDER BY id;")
            .unwrap();
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap();
        rows.map(Result::unwrap).collect()
    }

    #[test]
    fn open_gap_reserves_right_edge_of_parent() {
        let conn = setup();
        let reserved = open_gap_under(&conn, 0).unwrap();
        assert_eq!(reserved, NestedInterval::new(2, 3));
        assert_eq!(intervals(&conn), vec![(0, 1, 4)]);
    }

    #[test]
    fn open_then_close_restores_layout() {
        let conn = setup();
        let first = open_gap_under(&conn, 0).unwrap();
        conn.execute(
            "INSERT INTO Tags (id, pid, name, lft, rgt) VALUES (1, 0, 'A', ?1, ?2);",
            [first.left, first.right],
        )
        .unwrap();
        let before = intervals(&conn);

        let second = open_gap_under(&conn, 1).unwrap();
        assert_eq!(second, NestedInterval::new(3, 4));
        assert_eq!(intervals(&conn), vec![(0, 1, 6), (1, 2, 5)]);

        close_gap_at(&conn, second).unwrap();
        assert_eq!(intervals(&conn), before);
    }

    #[test]
    fn open_gap_requires_existing_parent() {
        let conn = setup();
        let err = open_gap_under(&conn, 99).unwrap_err();
        assert!(matches!(err, TagRepoError::ParentNotFound(99)));
    }

    #[test]
    fn only_leaves_are_removable() {
        assert!(ensure_leaf(4, NestedInterval::new(2, 3)).is_ok());
        assert!(matches!(
            ensure_leaf(4, NestedInterval::new(2, 5)),
            Err(TagRepoError::HasChildren(4))
        ));
    }

    #[test]
    fn structural_changes_are_refused() {
        let stored = Tag::from_row(5, 1, "Dogs", TagIcon::None, Some(NestedInterval::new(3, 4)));
        let mut renamed = stored.clone();
        renamed.set_name("Hounds");
        assert!(ensure_structure_unchanged(&stored, &renamed).is_ok());

        let mut moved = stored.clone();
        moved.set_parent_id(0).unwrap();
        assert!(matches!(
            ensure_structure_unchanged(&stored, &moved),
            Err(TagRepoError::UnsupportedMutation { id: 5, field: "pid" })
        ));

        let mut stretched = stored.clone();
        stretched.set_interval(Some(NestedInterval::new(3, 6)));
        assert!(matches!(
            ensure_structure_unchanged(&stored, &stretched),
            Err(TagRepoError::UnsupportedMutation { id: 5, field: "rgt" })
        ));
    }

    #[test]
    fn stale_loaded_interval_is_not_an_edit() {
        let stored = Tag::from_row(5, 1, "Dogs", TagIcon::None, Some(NestedInterval::new(3, 6)));
        let mut stale =
            Tag::from_row(5, 1, "Dogs", TagIcon::None, Some(NestedInterval::new(3, 4)));
        stale.set_name("Hounds");
        assert!(ensure_structure_unchanged(&stored, &stale).is_ok());
    }
}
