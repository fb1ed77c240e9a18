//! Key/value property rows attached to entities.
//!
//! # Responsibility
//! - Read and write `(owner_id, property) -> value` rows that have no
//!   primary key of their own.
//! - Serve any entity table with the same three-column shape.
//!
//! # Invariants
//! - A property is created, overwritten and deleted as a unit per key.
//! - `NULL` values read back as empty strings.

use crate::db::DbResult;
use rusqlite::{params, Connection};

/// Column layout of one property table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyTable {
    pub table: &'static str,
    pub owner_column: &'static str,
    pub key_column: &'static str,
    pub value_column: &'static str,
}

/// `TagProperties(tagid, property, value)`.
pub const TAG_PROPERTIES: PropertyTable = PropertyTable {
    table: "TagProperties",
    owner_column: "tagid",
    key_column: "property",
    value_column: "value",
};

/// Property marking tags that are never decorated with their ancestry.
pub const INTERNAL_TAG_PROPERTY: &str = "internalTag";

/// Property store bound to one connection and one property table.
pub struct PropertyStore<'conn> {
    conn: &'conn Connection,
    table: PropertyTable,
}

impl<'conn> PropertyStore<'conn> {
    pub fn new(conn: &'conn Connection, table: PropertyTable) -> Self {
        Self { conn, table }
    }

    /// Returns whether `owner_id` has `key`.
    pub fn contains(&self, owner_id: i64, key: &str) -> DbResult<bool> {
        let PropertyTable {
            table,
            owner_column,
            key_column,
            ..
        } = self.table;
        let exists: i64 = self.conn.query_row(
            &format!(
                "SELECT EXISTS(
                    SELECT 1 FROM {table}
                    WHERE {owner_column} = ?1 AND {key_column} = ?2
                );"
            ),
            params![owner_id, key],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    /// Returns the value of `key`, or `None` when the property is absent.
    pub fn get(&self, owner_id: i64, key: &str) -> DbResult<Option<String>> {
        let PropertyTable {
            table,
            owner_column,
            key_column,
            value_column,
        } = self.table;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {value_column}
             FROM {table}
             WHERE {owner_column} = ?1 AND {key_column} = ?2
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query(params![owner_id, key])?;
        if let Some(row) = rows.next()? {
            let value: Option<String> = row.get(0)?;
            return Ok(Some(value.unwrap_or_default()));
        }
        Ok(None)
    }

    /// Inserts `key` or overwrites its value.
    pub fn set(&self, owner_id: i64, key: &str, value: &str) -> DbResult<()> {
        let PropertyTable {
            table,
            owner_column,
            key_column,
            value_column,
        } = self.table;
        let changed = self.conn.execute(
            &format!(
                "UPDATE {table}
                 SET {value_column} = ?3
                 WHERE {owner_column} = ?1 AND {key_column} = ?2;"
            ),
            params![owner_id, key, value],
        )?;
        if changed == 0 {
            self.conn.execute(
                &format!(
                    "INSERT INTO {table} ({owner_column}, {key_column}, {value_column})
                     VALUES (?1, ?2, ?3);"
                ),
                params![owner_id, key, value],
            )?;
        }
        Ok(())
    }

    /// Deletes `key`. Returns whether a row existed.
    pub fn remove(&self, owner_id: i64, key: &str) -> DbResult<bool> {
        let PropertyTable {
            table,
            owner_column,
            key_column,
            ..
        } = self.table;
        let changed = self.conn.execute(
            &format!("DELETE FROM {table} WHERE {owner_column} = ?1 AND {key_column} = ?2;"),
            params![owner_id, key],
        )?;
        Ok(changed > 0)
    }

    /// Lists all `(key, value)` pairs of `owner_id` in key order.
    pub fn items(&self, owner_id: i64) -> DbResult<Vec<(String, String)>> {
        let PropertyTable {
            table,
            owner_column,
            key_column,
            value_column,
        } = self.table;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {key_column}, {value_column}
             FROM {table}
             WHERE {owner_column} = ?1
             ORDER BY {key_column} ASC;"
        ))?;
        let mut rows = stmt.query([owner_id])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let value: Option<String> = row.get(1)?;
            items.push((row.get(0)?, value.unwrap_or_default()));
        }
        Ok(items)
    }

    /// Deletes every property of `owner_id`. Returns the number of rows removed.
    pub fn clear(&self, owner_id: i64) -> DbResult<usize> {
        let PropertyTable {
            table,
            owner_column,
            ..
        } = self.table;
        let changed = self.conn.execute(
            &format!("DELETE FROM {table} WHERE {owner_column} = ?1;"),
            [owner_id],
        )?;
        Ok(changed)
    }
}
