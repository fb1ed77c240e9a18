//! Tag domain model.
//!
//! # Responsibility
//! - Represent one `Tags` row with typed accessors.
//! - Validate assignments that the tree layer must never persist.
//!
//! # Invariants
//! - `id` is assigned by the store and never changes.
//! - At most one of {image icon, named icon} is set.
//! - Names are non-blank and never contain the path separator `/`.

use crate::model::layout::{ROOT_ROW_PARENT_ID, ROOT_TAG_ID};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned tag identifier.
pub type TagId = i64;

/// Identifier of an external image row, used as tag icon.
pub type ImageId = i64;

/// Separator between tag names in a hierarchical name.
pub const PATH_SEPARATOR: &str = "/";

/// Assignment errors raised by tag setters and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValidationError {
    /// Name is blank after trim.
    BlankName,
    /// Name contains the hierarchical path separator.
    NameContainsSeparator(String),
    /// Parent ids are never negative once assigned by callers.
    NegativeParentId(TagId),
    /// Image icon references must be positive ids.
    InvalidImageIcon(ImageId),
    /// Named icons must not be blank.
    BlankIconName,
    /// Persisted row carries both icon representations.
    ConflictingIcon { image: ImageId, name: String },
}

impl Display for TagValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "tag name must not be blank"),
            Self::NameContainsSeparator(name) => {
                write!(f, "tag name `{name}` must not contain `{PATH_SEPARATOR}`")
            }
            Self::NegativeParentId(pid) => write!(f, "parent id must not be negative, got {pid}"),
            Self::InvalidImageIcon(id) => write!(f, "image icon id must be positive, got {id}"),
            Self::BlankIconName => write!(f, "icon name must not be blank"),
            Self::ConflictingIcon { image, name } => write!(
                f,
                "tag icon has both image {image} and icon name `{name}` set"
            ),
        }
    }
}

impl Error for TagValidationError {}

/// Closed interval markers of the nested-set encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedInterval {
    pub left: i64,
    pub right: i64,
}

impl NestedInterval {
    pub fn new(left: i64, right: i64) -> Self {
        Self { left, right }
    }

    /// Returns `right - left`.
    pub fn width(self) -> i64 {
        self.right - self.left
    }

    /// Width is positive and odd, i.e. the interval encloses whole subtrees.
    pub fn is_well_formed(self) -> bool {
        let width = self.width();
        width > 0 && width % 2 == 1
    }

    /// A leaf spans exactly one unit pair.
    pub fn is_leaf(self) -> bool {
        self.width() == 1
    }

    /// `self` is a strict ancestor interval of `other`.
    pub fn strictly_contains(self, other: NestedInterval) -> bool {
        self.left < other.left && self.right > other.right
    }

    pub fn overlaps(self, other: NestedInterval) -> bool {
        !(self.right < other.left || self.left > other.right)
    }
}

impl Display for NestedInterval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.left, self.right)
    }
}

/// Tag icon: an external image, a symbolic icon name, or nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TagIcon {
    #[default]
    None,
    Image(ImageId),
    Named(String),
}

impl TagIcon {
    /// Builds the icon from the `icon` / `iconkde` column pair.
    ///
    /// Non-positive image ids and empty names are treated as unset.
    pub fn from_columns(
        image: Option<ImageId>,
        name: Option<String>,
    ) -> Result<Self, TagValidationError> {
        let image = image.filter(|id| *id > 0);
        let name = name.filter(|value| !value.trim().is_empty());
        match (image, name) {
            (None, None) => Ok(Self::None),
            (Some(id), None) => Ok(Self::Image(id)),
            (None, Some(name)) => Ok(Self::Named(name)),
            (Some(image), Some(name)) => Err(TagValidationError::ConflictingIcon { image, name }),
        }
    }

    /// Value for the `icon` column.
    pub fn image_id(&self) -> Option<ImageId> {
        match self {
            Self::Image(id) => Some(*id),
            _ => None,
        }
    }

    /// Value for the `iconkde` column.
    pub fn icon_name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn validate(&self) -> Result<(), TagValidationError> {
        match self {
            Self::None => Ok(()),
            Self::Image(id) if *id <= 0 => Err(TagValidationError::InvalidImageIcon(*id)),
            Self::Image(_) => Ok(()),
            Self::Named(name) if name.trim().is_empty() => Err(TagValidationError::BlankIconName),
            Self::Named(_) => Ok(()),
        }
    }
}

impl From<ImageId> for TagIcon {
    fn from(value: ImageId) -> Self {
        Self::Image(value)
    }
}

impl From<&str> for TagIcon {
    fn from(value: &str) -> Self {
        Self::Named(value.to_string())
    }
}

impl From<String> for TagIcon {
    fn from(value: String) -> Self {
        Self::Named(value)
    }
}

impl<T: Into<TagIcon>> From<Option<T>> for TagIcon {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::None, Into::into)
    }
}

/// Structural fields edited in memory since the tag was loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct StructuralEdits {
    parent_id: bool,
    interval: bool,
}

/// One node of the tag tree.
///
/// Fields are private so that structural values (`id`, `pid`, interval) only
/// change through checked setters; the store refuses to persist structural
/// changes on existing rows.
///
/// Loaded intervals go stale once other rows are inserted or removed. Only
/// values changed through [`Tag::set_parent_id`] / [`Tag::set_interval`]
/// count as structural edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    id: TagId,
    #[serde(rename = "pid")]
    parent_id: TagId,
    name: String,
    icon: TagIcon,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interval: Option<NestedInterval>,
    #[serde(skip)]
    edits: StructuralEdits,
}

impl Tag {
    /// Builds a tag from persisted column values.
    pub fn from_row(
        id: TagId,
        parent_id: TagId,
        name: impl Into<String>,
        icon: TagIcon,
        interval: Option<NestedInterval>,
    ) -> Self {
        Self {
            id,
            parent_id,
            name: name.into(),
            icon,
            interval,
            edits: StructuralEdits::default(),
        }
    }

    pub fn id(&self) -> TagId {
        self.id
    }

    /// Raw `pid` column value. Interpret it through
    /// [`TreeLayout::parent_link`](crate::model::layout::TreeLayout::parent_link).
    pub fn parent_id(&self) -> TagId {
        self.parent_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn icon(&self) -> &TagIcon {
        &self.icon
    }

    /// Nested-set interval; `None` under the adjacency layout.
    pub fn interval(&self) -> Option<NestedInterval> {
        self.interval
    }

    /// Renames the tag in memory. Has no interval effect.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_icon(&mut self, icon: impl Into<TagIcon>) {
        self.icon = icon.into();
    }

    /// Changes `pid` in memory.
    ///
    /// # Errors
    /// - `NegativeParentId` for negative values.
    pub fn set_parent_id(&mut self, parent_id: TagId) -> Result<(), TagValidationError> {
        if parent_id < 0 {
            return Err(TagValidationError::NegativeParentId(parent_id));
        }
        if parent_id != self.parent_id {
            self.edits.parent_id = true;
        }
        self.parent_id = parent_id;
        Ok(())
    }

    /// Overrides the interval in memory. Persisting a change is refused.
    pub fn set_interval(&mut self, interval: Option<NestedInterval>) {
        if interval != self.interval {
            self.edits.interval = true;
        }
        self.interval = interval;
    }

    /// `pid` was changed through [`Tag::set_parent_id`].
    pub fn parent_id_edited(&self) -> bool {
        self.edits.parent_id
    }

    /// Interval was changed through [`Tag::set_interval`].
    pub fn interval_edited(&self) -> bool {
        self.edits.interval
    }

    /// Reserved nested-set root row.
    pub fn is_reserved_root(&self) -> bool {
        self.id == ROOT_TAG_ID && self.parent_id == ROOT_ROW_PARENT_ID
    }

    /// Validates name and icon.
    pub fn validate(&self) -> Result<(), TagValidationError> {
        validate_tag_name(&self.name)?;
        self.icon.validate()
    }
}

/// Insert request for a new tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTag {
    pub parent_id: TagId,
    pub name: String,
    pub icon: TagIcon,
}

impl NewTag {
    pub fn validate(&self) -> Result<(), TagValidationError> {
        if self.parent_id < 0 {
            return Err(TagValidationError::NegativeParentId(self.parent_id));
        }
        validate_tag_name(&self.name)?;
        self.icon.validate()
    }
}

/// Trims `name` and checks it can be used as one path segment.
pub fn normalize_tag_name(name: &str) -> Result<String, TagValidationError> {
    let trimmed = name.trim();
    validate_tag_name(trimmed)?;
    Ok(trimmed.to_string())
}

fn validate_tag_name(name: &str) -> Result<(), TagValidationError> {
    if name.trim().is_empty() {
        return Err(TagValidationError::BlankName);
    }
    if name.contains(PATH_SEPARATOR) {
        return Err(TagValidationError::NameContainsSeparator(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{normalize_tag_name, NestedInterval, NewTag, Tag, TagIcon, TagValidationError};

    fn sample() -> Tag {
        Tag::from_row(3, 1, "Dogs", TagIcon::None, Some(NestedInterval::new(4, 5)))
    }

    #[test]
    fn set_parent_id_rejects_negative_values() {
        let mut tag = sample();
        let err = tag.set_parent_id(-2).unwrap_err();
        assert_eq!(err, TagValidationError::NegativeParentId(-2));
        assert_eq!(tag.parent_id(), 1);

        assert!(!tag.parent_id_edited());

        tag.set_parent_id(0).unwrap();
        assert_eq!(tag.parent_id(), 0);
        assert!(tag.parent_id_edited());
    }

    #[test]
    fn only_changed_intervals_count_as_edits() {
        let mut tag = sample();
        tag.set_interval(Some(NestedInterval::new(4, 5)));
        assert!(!tag.interval_edited());

        tag.set_interval(Some(NestedInterval::new(4, 7)));
        assert!(tag.interval_edited());
        assert!(!tag.parent_id_edited());
    }

    #[test]
    fn icon_columns_keep_exactly_one_representation() {
        assert_eq!(TagIcon::from_columns(None, None).unwrap(), TagIcon::None);
        assert_eq!(
            TagIcon::from_columns(Some(12), None).unwrap(),
            TagIcon::Image(12)
        );
        assert_eq!(
            TagIcon::from_columns(Some(0), Some("folder".to_string())).unwrap(),
            TagIcon::Named("folder".to_string())
        );
        assert!(matches!(
            TagIcon::from_columns(Some(4), Some("folder".to_string())),
            Err(TagValidationError::ConflictingIcon { image: 4, .. })
        ));
    }

    #[test]
    fn icon_conversions_pick_representation_by_type() {
        assert_eq!(TagIcon::from(42_i64), TagIcon::Image(42));
        assert_eq!(
            TagIcon::from("applications-development"),
            TagIcon::Named("applications-development".to_string())
        );
        assert_eq!(TagIcon::from(None::<&str>), TagIcon::None);
        assert_eq!(
            TagIcon::Image(0).validate(),
            Err(TagValidationError::InvalidImageIcon(0))
        );
    }

    #[test]
    fn names_are_trimmed_and_must_be_single_segments() {
        assert_eq!(normalize_tag_name("  Paris ").unwrap(), "Paris");
        assert_eq!(normalize_tag_name("   "), Err(TagValidationError::BlankName));
        assert!(matches!(
            normalize_tag_name("Europe/Paris"),
            Err(TagValidationError::NameContainsSeparator(_))
        ));

        let new_tag = NewTag {
            parent_id: -1,
            name: "Root".to_string(),
            icon: TagIcon::None,
        };
        assert_eq!(
            new_tag.validate(),
            Err(TagValidationError::NegativeParentId(-1))
        );
    }

    #[test]
    fn interval_predicates() {
        let parent = NestedInterval::new(2, 7);
        let child = NestedInterval::new(3, 4);
        let sibling = NestedInterval::new(5, 6);
        assert!(parent.is_well_formed());
        assert!(parent.strictly_contains(child));
        assert!(!child.strictly_contains(parent));
        assert!(!child.overlaps(sibling));
        assert!(child.is_leaf());
        assert!(!NestedInterval::new(3, 5).is_well_formed());
    }
}
