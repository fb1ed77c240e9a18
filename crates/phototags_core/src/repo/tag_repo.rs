//! Tag tree repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide persistence APIs for the `Tags` table under either layout.
//! - Answer hierarchy reads (parent, children, ancestors, containment,
//!   hierarchical names) straight from the store.
//! - Keep SQL details and layout branching inside the repository boundary.
//!
//! # Invariants
//! - Every structural write runs in one `IMMEDIATE` transaction; the
//!   interval rewrite and the row change commit or roll back together.
//! - Persisted rows never change `pid`, `lft` or `rgt` through updates.
//! - Navigation never loads the whole tree.

use crate::db::schema::{
    table_exists, table_has_column, TAGS_TABLE, TAGS_TREE_TABLE, TAG_PROPERTIES_TABLE,
};
use crate::db::{schema::detect_layout, DbError};
use crate::model::layout::{ParentLink, TreeLayout, ROOT_TAG_ID, TOP_LEVEL_PARENT_ID};
use crate::model::tag::{
    NestedInterval, NewTag, Tag, TagIcon, TagId, TagValidationError, PATH_SEPARATOR,
};
use crate::repo::interval_allocator;
use crate::repo::property_repo::{PropertyStore, INTERNAL_TAG_PROPERTY, TAG_PROPERTIES};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by tag repository operations.
pub type TagRepoResult<T> = Result<T, TagRepoError>;

/// Errors from tag repository operations.
#[derive(Debug)]
pub enum TagRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Tag failed model validation.
    Validation(TagValidationError),
    /// Target tag does not exist.
    NotFound(TagId),
    /// Identity lookup matched more than one row.
    MultipleFound { id: TagId, count: usize },
    /// Requested parent does not exist.
    ParentNotFound(TagId),
    /// Tag still has children and cannot be removed.
    HasChildren(TagId),
    /// Structural change on a persisted row (move or interval rewrite).
    UnsupportedMutation { id: TagId, field: &'static str },
    /// Sibling with the same name already exists.
    DuplicateSibling { parent_id: TagId, name: String },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to valid read model.
    InvalidData(String),
}

impl Display for TagRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "tag not found: {id}"),
            Self::MultipleFound { id, count } => {
                write!(f, "tag id {id} matched {count} rows")
            }
            Self::ParentNotFound(id) => write!(f, "parent tag not found: {id}"),
            Self::HasChildren(id) => write!(f, "cannot delete tag {id} with sub-tags"),
            Self::UnsupportedMutation { id, field } => write!(
                f,
                "changing `{field}` of tag {id} is not implemented; moving tags is unsupported"
            ),
            Self::DuplicateSibling { parent_id, name } => write!(
                f,
                "tag `{name}` already exists under parent {parent_id}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "tag repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "tag repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid tag data: {message}"),
        }
    }
}

impl Error for TagRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for TagRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for TagRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<TagValidationError> for TagRepoError {
    fn from(value: TagValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Repository interface for the tag tree and its properties.
///
/// Implementations choose one of two code paths per call based on
/// [`TagRepository::layout`]; callers never branch on it.
pub trait TagRepository {
    /// Layout capability this repository was initialized with.
    fn layout(&self) -> TreeLayout;
    /// Loads one tag by id.
    fn get_tag(&self, id: TagId) -> TagRepoResult<Option<Tag>>;
    /// Lists all tags with exactly this plain name.
    fn find_by_name(&self, name: &str) -> TagRepoResult<Vec<Tag>>;
    /// Lists every tag row.
    fn list_tags(&self) -> TagRepoResult<Vec<Tag>>;
    /// Inserts one tag and returns the persisted row.
    fn insert_tag(&self, new_tag: &NewTag) -> TagRepoResult<Tag>;
    /// Persists name and icon of an existing tag.
    fn update_tag(&self, tag: &Tag) -> TagRepoResult<()>;
    /// Deletes a childless tag together with its properties.
    fn delete_tag(&self, id: TagId) -> TagRepoResult<()>;
    /// Loads the parent row, `None` for parentless tags.
    fn parent(&self, tag: &Tag) -> TagRepoResult<Option<Tag>>;
    /// Lists direct children.
    fn children(&self, tag: &Tag) -> TagRepoResult<Vec<Tag>>;
    /// Lists ancestors top-down.
    fn ancestors(&self, tag: &Tag) -> TagRepoResult<Vec<Tag>>;
    /// Returns ancestor ids without loading rows where the layout allows.
    fn ancestor_ids(&self, tag: &Tag) -> TagRepoResult<BTreeSet<TagId>>;
    /// Ancestor ids recorded in the closure helper table, if one exists.
    fn closure_ancestor_ids(&self, id: TagId) -> TagRepoResult<Option<BTreeSet<TagId>>>;
    /// True iff `ancestor` is a direct or indirect ancestor of `descendant`.
    fn contains(&self, ancestor: &Tag, descendant: &Tag) -> TagRepoResult<bool>;
    /// `/`-joined path of names below the root.
    fn hierarchical_name(&self, tag: &Tag) -> TagRepoResult<String>;
    /// Reads one property.
    fn property(&self, tag_id: TagId, key: &str) -> TagRepoResult<Option<String>>;
    /// Inserts or overwrites one property.
    fn set_property(&self, tag_id: TagId, key: &str, value: &str) -> TagRepoResult<()>;
    /// Deletes one property. Returns whether it existed.
    fn remove_property(&self, tag_id: TagId, key: &str) -> TagRepoResult<bool>;
    /// Lists properties in key order.
    fn properties(&self, tag_id: TagId) -> TagRepoResult<Vec<(String, String)>>;
}

/// SQLite-backed tag repository.
pub struct SqliteTagRepository<'conn> {
    conn: &'conn Connection,
    layout: TreeLayout,
    closure_table: bool,
}

impl<'conn> SqliteTagRepository<'conn> {
    /// Creates repository using the layout implied by the schema.
    pub fn try_new(conn: &'conn Connection) -> TagRepoResult<Self> {
        let layout =
            detect_layout(conn)?.ok_or(TagRepoError::MissingRequiredTable(TAGS_TABLE))?;
        Self::with_layout(conn, layout)
    }

    /// Creates repository with an explicit layout capability.
    ///
    /// An adjacency-list repository over a nested-set schema is valid and
    /// ignores the interval columns.
    pub fn with_layout(conn: &'conn Connection, layout: TreeLayout) -> TagRepoResult<Self> {
        ensure_tag_connection_ready(conn, layout)?;
        let closure_table =
            layout == TreeLayout::AdjacencyList && table_exists(conn, TAGS_TREE_TABLE)?;
        Ok(Self {
            conn,
            layout,
            closure_table,
        })
    }

    /// Whether ancestor reads use the `TagsTree` helper table.
    pub fn has_closure_table(&self) -> bool {
        self.closure_table
    }

    fn properties_store(&self) -> PropertyStore<'conn> {
        PropertyStore::new(self.conn, TAG_PROPERTIES)
    }

    fn is_internal(&self, tag_id: TagId) -> TagRepoResult<bool> {
        Ok(self
            .properties_store()
            .contains(tag_id, INTERNAL_TAG_PROPERTY)?)
    }

    fn walk_ancestors(&self, tag: &Tag) -> TagRepoResult<Vec<Tag>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::from([tag.id()]);
        let mut cursor = self.layout.parent_link(tag.parent_id());
        while let ParentLink::Tag(parent_id) = cursor {
            if !visited.insert(parent_id) {
                return Err(TagRepoError::InvalidData(format!(
                    "parent chain of tag {} revisits tag {parent_id}",
                    tag.id()
                )));
            }
            let parent = load_tag(self.conn, self.layout, parent_id)?.ok_or_else(|| {
                TagRepoError::InvalidData(format!(
                    "tag {} has missing ancestor {parent_id}",
                    tag.id()
                ))
            })?;
            cursor = self.layout.parent_link(parent.parent_id());
            chain.push(parent);
        }
        chain.reverse();
        Ok(chain)
    }
}

impl TagRepository for SqliteTagRepository<'_> {
    fn layout(&self) -> TreeLayout {
        self.layout
    }

    fn get_tag(&self, id: TagId) -> TagRepoResult<Option<Tag>> {
        load_tag(self.conn, self.layout, id)
    }

    fn find_by_name(&self, name: &str) -> TagRepoResult<Vec<Tag>> {
        query_tags(
            self.conn,
            self.layout,
            &format!(
                "SELECT {} FROM Tags WHERE name = ?1 ORDER BY id ASC;",
                tag_columns(self.layout)
            ),
            [name],
        )
    }

    fn list_tags(&self) -> TagRepoResult<Vec<Tag>> {
        query_tags(
            self.conn,
            self.layout,
            &format!(
                "SELECT {} FROM Tags ORDER BY id ASC;",
                tag_columns(self.layout)
            ),
            [],
        )
    }

    fn insert_tag(&self, new_tag: &NewTag) -> TagRepoResult<Tag> {
        new_tag.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if self.layout.requires_parent_row(new_tag.parent_id)
            && !tag_exists(&tx, new_tag.parent_id)?
        {
            return Err(TagRepoError::ParentNotFound(new_tag.parent_id));
        }
        if sibling_name_taken(&tx, new_tag.parent_id, &new_tag.name, None)? {
            return Err(TagRepoError::DuplicateSibling {
                parent_id: new_tag.parent_id,
                name: new_tag.name.clone(),
            });
        }

        match self.layout {
            TreeLayout::NestedSet => {
                let interval = interval_allocator::open_gap_under(&tx, new_tag.parent_id)?;
                tx.execute(
                    "INSERT INTO Tags (pid, name, icon, iconkde, lft, rgt)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                    params![
                        new_tag.parent_id,
                        new_tag.name.as_str(),
                        new_tag.icon.image_id(),
                        new_tag.icon.icon_name(),
                        interval.left,
                        interval.right,
                    ],
                )?;
            }
            TreeLayout::AdjacencyList => {
                tx.execute(
                    "INSERT INTO Tags (pid, name, icon, iconkde)
                     VALUES (?1, ?2, ?3, ?4);",
                    params![
                        new_tag.parent_id,
                        new_tag.name.as_str(),
                        new_tag.icon.image_id(),
                        new_tag.icon.icon_name(),
                    ],
                )?;
            }
        }

        let id = tx.last_insert_rowid();
        let tag = load_tag(&tx, self.layout, id)?.ok_or(TagRepoError::NotFound(id))?;
        tx.commit()?;
        Ok(tag)
    }

    fn update_tag(&self, tag: &Tag) -> TagRepoResult<()> {
        tag.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let stored = load_tag(&tx, self.layout, tag.id())?
            .ok_or(TagRepoError::NotFound(tag.id()))?;
        interval_allocator::ensure_structure_unchanged(&stored, tag)?;
        if stored.name() != tag.name()
            && sibling_name_taken(&tx, tag.parent_id(), tag.name(), Some(tag.id()))?
        {
            return Err(TagRepoError::DuplicateSibling {
                parent_id: tag.parent_id(),
                name: tag.name().to_string(),
            });
        }

        tx.execute(
            "UPDATE Tags
             SET name = ?2,
                 icon = ?3,
                 iconkde = ?4
             WHERE id = ?1;",
            params![
                tag.id(),
                tag.name(),
                tag.icon().image_id(),
                tag.icon().icon_name(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_tag(&self, id: TagId) -> TagRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let tag = load_tag(&tx, self.layout, id)?.ok_or(TagRepoError::NotFound(id))?;
        if tag.is_reserved_root() {
            return Err(TagRepoError::UnsupportedMutation {
                id,
                field: "root",
            });
        }

        PropertyStore::new(&tx, TAG_PROPERTIES).clear(id)?;

        match self.layout {
            TreeLayout::NestedSet => {
                let interval = tag.interval().ok_or_else(|| {
                    TagRepoError::InvalidData(format!("tag {id} has no nested-set interval"))
                })?;
                interval_allocator::ensure_leaf(id, interval)?;
                tx.execute("DELETE FROM Tags WHERE id = ?1;", [id])?;
                interval_allocator::close_gap_at(&tx, interval)?;
            }
            TreeLayout::AdjacencyList => {
                if has_children(&tx, id)? {
                    return Err(TagRepoError::HasChildren(id));
                }
                tx.execute("DELETE FROM Tags WHERE id = ?1;", [id])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn parent(&self, tag: &Tag) -> TagRepoResult<Option<Tag>> {
        match self.layout.parent_link(tag.parent_id()) {
            ParentLink::None => Ok(None),
            ParentLink::Tag(parent_id) => load_tag(self.conn, self.layout, parent_id)?
                .map(Some)
                .ok_or(TagRepoError::ParentNotFound(parent_id)),
        }
    }

    fn children(&self, tag: &Tag) -> TagRepoResult<Vec<Tag>> {
        let order = match self.layout {
            TreeLayout::NestedSet => "lft ASC",
            TreeLayout::AdjacencyList => "id ASC",
        };
        query_tags(
            self.conn,
            self.layout,
            &format!(
                "SELECT {} FROM Tags WHERE pid = ?1 AND id <> ?1 ORDER BY {order};",
                tag_columns(self.layout)
            ),
            [tag.id()],
        )
    }

    fn ancestors(&self, tag: &Tag) -> TagRepoResult<Vec<Tag>> {
        match self.layout {
            TreeLayout::NestedSet => query_tags(
                self.conn,
                self.layout,
                "SELECT a.id AS id, a.pid AS pid, a.name AS name, a.icon AS icon,
                        a.iconkde AS iconkde, a.lft AS lft, a.rgt AS rgt
                 FROM Tags a
                 INNER JOIN Tags t ON t.id = ?1
                 WHERE a.lft < t.lft
                   AND a.rgt > t.rgt
                 ORDER BY a.lft ASC;",
                [tag.id()],
            ),
            TreeLayout::AdjacencyList => self.walk_ancestors(tag),
        }
    }

    fn ancestor_ids(&self, tag: &Tag) -> TagRepoResult<BTreeSet<TagId>> {
        match self.layout {
            TreeLayout::NestedSet => {
                let mut stmt = self.conn.prepare(
                    "SELECT a.id
                     FROM Tags a
                     INNER JOIN Tags t ON t.id = ?1
                     WHERE a.lft < t.lft
                       AND a.rgt > t.rgt;",
                )?;
                let mut rows = stmt.query([tag.id()])?;
                let mut ids = BTreeSet::new();
                while let Some(row) = rows.next()? {
                    ids.insert(row.get(0)?);
                }
                Ok(ids)
            }
            TreeLayout::AdjacencyList => match self.closure_ancestor_ids(tag.id())? {
                Some(ids) => Ok(ids),
                None => Ok(self
                    .walk_ancestors(tag)?
                    .iter()
                    .map(Tag::id)
                    .collect()),
            },
        }
    }

    fn closure_ancestor_ids(&self, id: TagId) -> TagRepoResult<Option<BTreeSet<TagId>>> {
        if !self.closure_table {
            return Ok(None);
        }
        let mut stmt = self.conn.prepare(
            "SELECT pid
             FROM TagsTree
             WHERE id = ?1
               AND pid > ?2;",
        )?;
        let mut rows = stmt.query(params![id, TOP_LEVEL_PARENT_ID])?;
        let mut ids = BTreeSet::new();
        while let Some(row) = rows.next()? {
            ids.insert(row.get(0)?);
        }
        Ok(Some(ids))
    }

    fn contains(&self, ancestor: &Tag, descendant: &Tag) -> TagRepoResult<bool> {
        if ancestor.id() == descendant.id() {
            return Ok(false);
        }
        match self.layout {
            TreeLayout::NestedSet => {
                let found: i64 = self.conn.query_row(
                    "SELECT EXISTS(
                        SELECT 1
                        FROM Tags a
                        INNER JOIN Tags d ON d.id = ?2
                        WHERE a.id = ?1
                          AND a.lft < d.lft
                          AND a.rgt > d.rgt
                    );",
                    params![ancestor.id(), descendant.id()],
                    |row| row.get(0),
                )?;
                Ok(found == 1)
            }
            TreeLayout::AdjacencyList => {
                Ok(self.ancestor_ids(descendant)?.contains(&ancestor.id()))
            }
        }
    }

    fn hierarchical_name(&self, tag: &Tag) -> TagRepoResult<String> {
        if self.layout.parent_link(tag.parent_id()) == ParentLink::None
            || self.is_internal(tag.id())?
        {
            return Ok(tag.name().to_string());
        }

        let mut segments: Vec<String> = self
            .ancestors(tag)?
            .into_iter()
            .filter(|ancestor| !ancestor.is_reserved_root())
            .map(|ancestor| ancestor.name().to_string())
            .collect();
        segments.push(tag.name().to_string());
        Ok(segments.join(PATH_SEPARATOR))
    }

    fn property(&self, tag_id: TagId, key: &str) -> TagRepoResult<Option<String>> {
        Ok(self.properties_store().get(tag_id, key)?)
    }

    fn set_property(&self, tag_id: TagId, key: &str, value: &str) -> TagRepoResult<()> {
        if !tag_exists(self.conn, tag_id)? {
            return Err(TagRepoError::NotFound(tag_id));
        }
        Ok(self.properties_store().set(tag_id, key, value)?)
    }

    fn remove_property(&self, tag_id: TagId, key: &str) -> TagRepoResult<bool> {
        Ok(self.properties_store().remove(tag_id, key)?)
    }

    fn properties(&self, tag_id: TagId) -> TagRepoResult<Vec<(String, String)>> {
        Ok(self.properties_store().items(tag_id)?)
    }
}

fn tag_columns(layout: TreeLayout) -> &'static str {
    match layout {
        TreeLayout::NestedSet => "id, pid, name, icon, iconkde, lft, rgt",
        TreeLayout::AdjacencyList => "id, pid, name, icon, iconkde",
    }
}

fn load_tag(conn: &Connection, layout: TreeLayout, id: TagId) -> TagRepoResult<Option<Tag>> {
    let mut tags = query_tags(
        conn,
        layout,
        &format!("SELECT {} FROM Tags WHERE id = ?1;", tag_columns(layout)),
        [id],
    )?;
    match tags.len() {
        0 => Ok(None),
        1 => Ok(tags.pop()),
        count => Err(TagRepoError::MultipleFound { id, count }),
    }
}

fn query_tags<P: rusqlite::Params>(
    conn: &Connection,
    layout: TreeLayout,
    sql: &str,
    params: P,
) -> TagRepoResult<Vec<Tag>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut tags = Vec::new();
    while let Some(row) = rows.next()? {
        tags.push(parse_tag_row(row, layout)?);
    }
    Ok(tags)
}

fn tag_exists(conn: &Connection, id: TagId) -> TagRepoResult<bool> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM Tags WHERE id = ?1;", [id], |row| row.get(0))
        .optional()?;
    Ok(exists.is_some())
}

fn has_children(conn: &Connection, id: TagId) -> TagRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM Tags WHERE pid = ?1 AND id <> ?1);",
        [id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn sibling_name_taken(
    conn: &Connection,
    parent_id: TagId,
    name: &str,
    exclude: Option<TagId>,
) -> TagRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM Tags
            WHERE pid = ?1
              AND name = ?2
              AND (?3 IS NULL OR id <> ?3)
        );",
        params![parent_id, name, exclude],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn parse_tag_row(row: &Row<'_>, layout: TreeLayout) -> TagRepoResult<Tag> {
    let id: TagId = row.get("id")?;
    let icon = TagIcon::from_columns(row.get("icon")?, row.get("iconkde")?).map_err(|err| {
        TagRepoError::InvalidData(format!("tag {id}: {err}"))
    })?;

    let interval = match layout {
        TreeLayout::NestedSet => Some(NestedInterval::new(row.get("lft")?, row.get("rgt")?)),
        TreeLayout::AdjacencyList => None,
    };

    Ok(Tag::from_row(
        id,
        row.get("pid")?,
        row.get::<_, String>("name")?,
        icon,
        interval,
    ))
}

fn ensure_tag_connection_ready(conn: &Connection, layout: TreeLayout) -> TagRepoResult<()> {
    if !table_exists(conn, TAGS_TABLE)? {
        return Err(TagRepoError::MissingRequiredTable(TAGS_TABLE));
    }
    let nested_columns: &[&'static str] = match layout {
        TreeLayout::NestedSet => &["lft", "rgt"],
        TreeLayout::AdjacencyList => &[],
    };
    for column in ["id", "pid", "name", "icon", "iconkde"]
        .into_iter()
        .chain(nested_columns.iter().copied())
    {
        if !table_has_column(conn, TAGS_TABLE, column)? {
            return Err(TagRepoError::MissingRequiredColumn {
                table: TAGS_TABLE,
                column,
            });
        }
    }

    if !table_exists(conn, TAG_PROPERTIES_TABLE)? {
        return Err(TagRepoError::MissingRequiredTable(TAG_PROPERTIES_TABLE));
    }
    for column in ["tagid", "property", "value"] {
        if !table_has_column(conn, TAG_PROPERTIES_TABLE, column)? {
            return Err(TagRepoError::MissingRequiredColumn {
                table: TAG_PROPERTIES_TABLE,
                column,
            });
        }
    }

    if layout == TreeLayout::NestedSet && !tag_exists(conn, ROOT_TAG_ID)? {
        return Err(TagRepoError::InvalidData(format!(
            "nested-set layout requires root tag {ROOT_TAG_ID}"
        )));
    }

    Ok(())
}
