//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Resolve the tree layout and trigger schema migrations before returning
//!   a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::schema::detect_layout;
use super::DbResult;
use crate::model::layout::TreeLayout;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// How the tree layout of a connection is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutChoice {
    /// Use the layout of the existing schema; fresh databases get the
    /// adjacency list.
    #[default]
    Detect,
    /// Require this layout. Fails on an existing schema of the other layout.
    Fixed(TreeLayout),
}

impl From<TreeLayout> for LayoutChoice {
    fn from(value: TreeLayout) -> Self {
        Self::Fixed(value)
    }
}

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Performs connection bootstrap and migration checks.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>, layout: impl Into<LayoutChoice>) -> DbResult<Connection> {
    open_with("file", layout.into(), || Connection::open(path))
}

/// Opens an in-memory SQLite database and applies all pending migrations.
pub fn open_db_in_memory(layout: impl Into<LayoutChoice>) -> DbResult<Connection> {
    open_with("memory", layout.into(), Connection::open_in_memory)
}

fn open_with(
    mode: &'static str,
    choice: LayoutChoice,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = match connect() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, choice) {
        Ok(layout) => {
            info!(
                "event=db_open module=db status=ok mode={} layout={} duration_ms={}",
                mode,
                layout,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, choice: LayoutChoice) -> DbResult<TreeLayout> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let layout = match choice {
        LayoutChoice::Fixed(layout) => layout,
        LayoutChoice::Detect => detect_layout(conn)?.unwrap_or(TreeLayout::AdjacencyList),
    };
    apply_migrations(conn, layout)?;
    Ok(layout)
}
