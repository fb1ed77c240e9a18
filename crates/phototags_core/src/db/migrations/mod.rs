//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register schema migrations per tree layout in strictly increasing order.
//! - Apply pending migrations atomically.
//!
//! # Invariants
//! - `version` values must remain monotonic and aligned across layouts.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - A database keeps the layout it was created with.

use crate::db::schema::detect_layout;
use crate::db::{DbError, DbResult};
use crate::model::layout::TreeLayout;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const ADJACENCY_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("0001_tags_adjacency.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("0002_tag_properties.sql"),
    },
];

const NESTED_SET_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("0001_tags_nested_set.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("0002_tag_properties.sql"),
    },
];

fn migrations_for(layout: TreeLayout) -> &'static [Migration] {
    match layout {
        TreeLayout::AdjacencyList => ADJACENCY_MIGRATIONS,
        TreeLayout::NestedSet => NESTED_SET_MIGRATIONS,
    }
}

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    ADJACENCY_MIGRATIONS
        .last()
        .map_or(0, |migration| migration.version)
}

/// Applies all pending migrations for `layout` on the provided connection.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the database is newer than this binary.
/// - `LayoutMismatch` when an existing schema uses the other layout.
pub fn apply_migrations(conn: &mut Connection, layout: TreeLayout) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version > 0 {
        if let Some(found) = detect_layout(conn)? {
            if found != layout {
                return Err(DbError::LayoutMismatch {
                    requested: layout,
                    found,
                });
            }
        }
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in migrations_for(layout) {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    Ok(())
}

/// Reads `PRAGMA user_version` from the connection.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
