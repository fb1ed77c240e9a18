//! Tree layout capability and parent sentinels.
//!
//! Two physical layouts store the same logical tag tree:
//!
//! - `AdjacencyList`: each row stores only `pid`. Top-level tags use
//!   `pid = 0` and there is no row with id 0.
//! - `NestedSet`: rows additionally carry `lft`/`rgt`. A reserved root row
//!   (`id = 0`, `pid = -1`) contains every other tag; top-level tags use
//!   `pid = 0` and therefore have the root row as parent.

use crate::model::tag::TagId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Id of the reserved nested-set root row.
pub const ROOT_TAG_ID: TagId = 0;
/// `pid` stored on top-level tags in both layouts.
pub const TOP_LEVEL_PARENT_ID: TagId = 0;
/// `pid` stored on the reserved nested-set root row.
pub const ROOT_ROW_PARENT_ID: TagId = -1;
/// Name of the reserved nested-set root row.
pub const ROOT_TAG_NAME: &str = "_Digikam_root_tag_";

/// Physical representation of the tag tree in the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeLayout {
    /// Parent ids only, optionally with the `TagsTree` closure helper table.
    AdjacencyList,
    /// Parent ids plus `lft`/`rgt` interval columns.
    NestedSet,
}

/// Resolved meaning of a raw `pid` value under one layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLink {
    /// Tree root or top-level tag without a parent row.
    None,
    /// Parent row with this id.
    Tag(TagId),
}

impl TreeLayout {
    /// Maps a raw `pid` to a parent link.
    pub fn parent_link(self, pid: TagId) -> ParentLink {
        match self {
            Self::AdjacencyList if pid <= TOP_LEVEL_PARENT_ID => ParentLink::None,
            Self::NestedSet if pid <= ROOT_ROW_PARENT_ID => ParentLink::None,
            _ => ParentLink::Tag(pid),
        }
    }

    /// Returns whether `pid` names a parent row that must exist.
    pub fn requires_parent_row(self, pid: TagId) -> bool {
        matches!(self.parent_link(pid), ParentLink::Tag(_))
    }

    /// Returns whether `lft`/`rgt` are maintained.
    pub fn is_nested_set(self) -> bool {
        matches!(self, Self::NestedSet)
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AdjacencyList => "adjacency_list",
            Self::NestedSet => "nested_set",
        }
    }

    /// Parses the stable name; also accepts hyphenated spelling.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "adjacency_list" | "adjacency" => Some(Self::AdjacencyList),
            "nested_set" | "nested" => Some(Self::NestedSet),
            _ => None,
        }
    }
}

impl Display for TreeLayout {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
