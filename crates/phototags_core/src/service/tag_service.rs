//! Tag collection use-case service.
//!
//! # Responsibility
//! - Resolve tags by id, plain name and hierarchical path.
//! - Add, rename, re-icon and remove tags through the repository.
//! - Expose hierarchy reads, per-tag properties and the integrity check.
//!
//! # Invariants
//! - Lookups that must be unique fail with `MultipleFound` instead of
//!   picking one candidate.
//! - Failures keep distinct kinds (see [`TagErrorKind`]) so callers can tell
//!   "no such tag" from "tree corrupted" from "operation not supported".

use crate::model::layout::{TreeLayout, TOP_LEVEL_PARENT_ID};
use crate::model::tag::{
    normalize_tag_name, NewTag, Tag, TagIcon, TagId, TagValidationError, PATH_SEPARATOR,
};
use crate::repo::property_repo::INTERNAL_TAG_PROPERTY;
use crate::repo::tag_repo::{TagRepoError, TagRepository};
use crate::service::tree_check::{check_tree, CheckReport, TreeViolation};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type TagServiceResult<T> = Result<T, TagServiceError>;

/// Key used by a failed lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagLookup {
    Id(TagId),
    Name(String),
    Path(String),
}

impl Display for TagLookup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Name(name) => write!(f, "name `{name}`"),
            Self::Path(path) => write!(f, "path `{path}`"),
        }
    }
}

/// Coarse error taxonomy shared by all tag operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagErrorKind {
    NotFound,
    Ambiguous,
    InvalidAssignment,
    UnsupportedMutation,
    StructuralViolation,
    Storage,
}

/// Errors from tag service operations.
#[derive(Debug)]
pub enum TagServiceError {
    /// Structurally forbidden value (blank name, negative parent, bad icon).
    Validation(TagValidationError),
    /// Lookup matched zero rows.
    NotFound(TagLookup),
    /// Lookup that must be unique matched several rows.
    MultipleFound { lookup: TagLookup, count: usize },
    /// Requested parent does not exist.
    ParentNotFound(TagId),
    /// Sibling with the same name already exists.
    DuplicateSibling { parent_id: TagId, name: String },
    /// Tag still has children.
    HasChildren(TagId),
    /// Moving a tag or rewriting its interval is not implemented.
    UnsupportedMutation { id: TagId, field: &'static str },
    /// Consistency check found a broken invariant.
    Integrity(TreeViolation),
    /// Repository-level failure.
    Repo(TagRepoError),
}

impl TagServiceError {
    pub fn kind(&self) -> TagErrorKind {
        match self {
            Self::Validation(_) => TagErrorKind::InvalidAssignment,
            Self::NotFound(_) | Self::ParentNotFound(_) => TagErrorKind::NotFound,
            Self::MultipleFound { .. } => TagErrorKind::Ambiguous,
            Self::UnsupportedMutation { .. } => TagErrorKind::UnsupportedMutation,
            Self::DuplicateSibling { .. } | Self::HasChildren(_) | Self::Integrity(_) => {
                TagErrorKind::StructuralViolation
            }
            Self::Repo(_) => TagErrorKind::Storage,
        }
    }
}

impl Display for TagServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(lookup) => write!(f, "no tag found for {lookup}"),
            Self::MultipleFound { lookup, count } => {
                write!(f, "{count} tags found for {lookup}")
            }
            Self::ParentNotFound(id) => write!(f, "parent tag not found: {id}"),
            Self::DuplicateSibling { parent_id, name } => write!(
                f,
                "tag `{name}` already exists under parent {parent_id}"
            ),
            Self::HasChildren(id) => write!(f, "cannot delete tag {id} with sub-tags"),
            Self::UnsupportedMutation { id, field } => write!(
                f,
                "changing `{field}` of tag {id} is not implemented"
            ),
            Self::Integrity(violation) => write!(f, "tag table inconsistent: {violation}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TagServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TagValidationError> for TagServiceError {
    fn from(value: TagValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<TreeViolation> for TagServiceError {
    fn from(value: TreeViolation) -> Self {
        Self::Integrity(value)
    }
}

impl From<TagRepoError> for TagServiceError {
    fn from(value: TagRepoError) -> Self {
        match value {
            TagRepoError::Validation(err) => Self::Validation(err),
            TagRepoError::NotFound(id) => Self::NotFound(TagLookup::Id(id)),
            TagRepoError::MultipleFound { id, count } => Self::MultipleFound {
                lookup: TagLookup::Id(id),
                count,
            },
            TagRepoError::ParentNotFound(id) => Self::ParentNotFound(id),
            TagRepoError::DuplicateSibling { parent_id, name } => {
                Self::DuplicateSibling { parent_id, name }
            }
            TagRepoError::HasChildren(id) => Self::HasChildren(id),
            TagRepoError::UnsupportedMutation { id, field } => {
                Self::UnsupportedMutation { id, field }
            }
            other => Self::Repo(other),
        }
    }
}

/// Tag given either by id or by a loaded row.
///
/// Id `0` names the top level when used as a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagRef(pub TagId);

impl From<TagId> for TagRef {
    fn from(value: TagId) -> Self {
        Self(value)
    }
}

impl From<&Tag> for TagRef {
    fn from(value: &Tag) -> Self {
        Self(value.id())
    }
}

/// Tag collection facade.
pub struct TagService<R: TagRepository> {
    repo: R,
}

impl<R: TagRepository> TagService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn layout(&self) -> TreeLayout {
        self.repo.layout()
    }

    /// Loads one tag by id.
    pub fn get(&self, id: TagId) -> TagServiceResult<Tag> {
        self.repo
            .get_tag(id)?
            .ok_or(TagServiceError::NotFound(TagLookup::Id(id)))
    }

    /// Resolves a unique tag by plain name, or by hierarchical path when
    /// `name` contains `/`.
    pub fn get_by_name(&self, name: &str) -> TagServiceResult<Tag> {
        if name.contains(PATH_SEPARATOR) {
            return self.get_by_path(name);
        }

        let mut candidates = self.repo.find_by_name(name)?;
        match candidates.len() {
            0 => Err(TagServiceError::NotFound(TagLookup::Name(name.to_string()))),
            1 => Ok(candidates.remove(0)),
            count => Err(TagServiceError::MultipleFound {
                lookup: TagLookup::Name(name.to_string()),
                count,
            }),
        }
    }

    /// Resolves a tag by its full hierarchical name, e.g. `Europe/France/Paris`.
    ///
    /// Candidates sharing the last segment are compared by their computed
    /// hierarchical name.
    pub fn get_by_path(&self, path: &str) -> TagServiceResult<Tag> {
        let segments: Vec<&str> = path
            .split(PATH_SEPARATOR)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect();
        let not_found = || TagServiceError::NotFound(TagLookup::Path(path.to_string()));
        let leaf = segments.last().ok_or_else(not_found)?;
        let wanted = segments.join(PATH_SEPARATOR);

        let mut matches = Vec::new();
        for candidate in self.repo.find_by_name(leaf)? {
            if self.repo.hierarchical_name(&candidate)? == wanted {
                matches.push(candidate);
            }
        }

        match matches.len() {
            0 => Err(not_found()),
            1 => Ok(matches.remove(0)),
            count => Err(TagServiceError::MultipleFound {
                lookup: TagLookup::Path(path.to_string()),
                count,
            }),
        }
    }

    /// Lists every tag with this plain name, across the whole tree.
    pub fn find_by_name(&self, name: &str) -> TagServiceResult<Vec<Tag>> {
        Ok(self.repo.find_by_name(name)?)
    }

    /// Lists every tag row.
    pub fn list(&self) -> TagServiceResult<Vec<Tag>> {
        Ok(self.repo.list_tags()?)
    }

    /// Lists tags directly below the root.
    pub fn top_level(&self) -> TagServiceResult<Vec<Tag>> {
        Ok(self
            .repo
            .list_tags()?
            .into_iter()
            .filter(|tag| tag.parent_id() == TOP_LEVEL_PARENT_ID && !tag.is_reserved_root())
            .collect())
    }

    /// Adds a tag below `parent`; parent `0` creates a top-level tag.
    ///
    /// `icon` accepts an image id, an icon name, a [`TagIcon`] or `None`.
    pub fn add(
        &self,
        name: &str,
        parent: impl Into<TagRef>,
        icon: impl Into<TagIcon>,
    ) -> TagServiceResult<Tag> {
        let new_tag = NewTag {
            parent_id: parent.into().0,
            name: normalize_tag_name(name)?,
            icon: icon.into(),
        };
        new_tag.validate()?;

        match self.repo.insert_tag(&new_tag) {
            Ok(tag) => {
                info!(
                    "event=tag_add module=tags status=ok tag_id={} parent_id={} layout={}",
                    tag.id(),
                    tag.parent_id(),
                    self.repo.layout()
                );
                Ok(tag)
            }
            Err(err) => {
                warn!(
                    "event=tag_add module=tags status=error parent_id={} error={}",
                    new_tag.parent_id, err
                );
                Err(err.into())
            }
        }
    }

    /// Renames one tag and returns the updated row.
    pub fn rename(&self, tag: impl Into<TagRef>, name: &str) -> TagServiceResult<Tag> {
        let mut current = self.get(tag.into().0)?;
        current.set_name(normalize_tag_name(name)?);
        self.save(&current)?;
        Ok(current)
    }

    /// Replaces the icon of one tag and returns the updated row.
    pub fn set_icon(
        &self,
        tag: impl Into<TagRef>,
        icon: impl Into<TagIcon>,
    ) -> TagServiceResult<Tag> {
        let mut current = self.get(tag.into().0)?;
        current.set_icon(icon);
        self.save(&current)?;
        Ok(current)
    }

    /// Persists in-memory edits of a loaded tag.
    ///
    /// # Errors
    /// - `UnsupportedMutation` when `pid` or the interval changed.
    pub fn save(&self, tag: &Tag) -> TagServiceResult<()> {
        if let Err(err) = self.repo.update_tag(tag) {
            warn!(
                "event=tag_update module=tags status=error tag_id={} error={}",
                tag.id(),
                err
            );
            return Err(err.into());
        }
        info!(
            "event=tag_update module=tags status=ok tag_id={}",
            tag.id()
        );
        Ok(())
    }

    /// Removes a childless tag and its properties.
    pub fn remove(&self, tag: impl Into<TagRef>) -> TagServiceResult<()> {
        let id = tag.into().0;
        match self.repo.delete_tag(id) {
            Ok(()) => {
                info!(
                    "event=tag_remove module=tags status=ok tag_id={} layout={}",
                    id,
                    self.repo.layout()
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    "event=tag_remove module=tags status=error tag_id={} error={}",
                    id, err
                );
                Err(err.into())
            }
        }
    }

    pub fn parent(&self, tag: &Tag) -> TagServiceResult<Option<Tag>> {
        Ok(self.repo.parent(tag)?)
    }

    pub fn children(&self, tag: &Tag) -> TagServiceResult<Vec<Tag>> {
        Ok(self.repo.children(tag)?)
    }

    /// Ancestors ordered from the top of the tree down to the direct parent.
    pub fn ancestors(&self, tag: &Tag) -> TagServiceResult<Vec<Tag>> {
        Ok(self.repo.ancestors(tag)?)
    }

    /// `descendant in ancestor`.
    pub fn contains(&self, ancestor: &Tag, descendant: &Tag) -> TagServiceResult<bool> {
        Ok(self.repo.contains(ancestor, descendant)?)
    }

    pub fn hierarchical_name(&self, tag: &Tag) -> TagServiceResult<String> {
        Ok(self.repo.hierarchical_name(tag)?)
    }

    /// Internal tags carry the `internalTag` property.
    pub fn is_internal(&self, tag: &Tag) -> TagServiceResult<bool> {
        Ok(self
            .repo
            .property(tag.id(), INTERNAL_TAG_PROPERTY)?
            .is_some())
    }

    pub fn property(&self, tag: &Tag, key: &str) -> TagServiceResult<Option<String>> {
        Ok(self.repo.property(tag.id(), key)?)
    }

    pub fn has_property(&self, tag: &Tag, key: &str) -> TagServiceResult<bool> {
        Ok(self.repo.property(tag.id(), key)?.is_some())
    }

    pub fn set_property(&self, tag: &Tag, key: &str, value: &str) -> TagServiceResult<()> {
        Ok(self.repo.set_property(tag.id(), key, value)?)
    }

    pub fn remove_property(&self, tag: &Tag, key: &str) -> TagServiceResult<bool> {
        Ok(self.repo.remove_property(tag.id(), key)?)
    }

    pub fn properties(&self, tag: &Tag) -> TagServiceResult<Vec<(String, String)>> {
        Ok(self.repo.properties(tag.id())?)
    }

    /// Verifies parent/child bookkeeping and, where present, intervals.
    ///
    /// Never repairs anything; the first violation is returned as
    /// `TagServiceError::Integrity`.
    pub fn check(&self) -> TagServiceResult<CheckReport> {
        match check_tree(&self.repo) {
            Ok(report) => {
                info!(
                    "event=tree_check module=tags status=ok layout={} tags={}",
                    report.layout, report.tags_checked
                );
                Ok(report)
            }
            Err(err) => {
                warn!(
                    "event=tree_check module=tags status=error layout={} error={}",
                    self.repo.layout(),
                    err
                );
                Err(err)
            }
        }
    }
}
