//! Tag tree consistency checker.
//!
//! # Responsibility
//! - Verify parent/child bookkeeping and the absence of cycles.
//! - Verify nested-set intervals where the layout carries them.
//! - Compare the `TagsTree` helper table with the walked `pid` chain.
//!
//! # Invariants
//! - The checker never writes; the first violation found is returned.
//! - Every violation names the offending tag id(s).

use crate::model::layout::{ParentLink, TreeLayout};
use crate::model::tag::{NestedInterval, Tag, TagId};
use crate::repo::tag_repo::TagRepository;
use crate::service::tag_service::{TagServiceError, TagServiceResult};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Summary of a successful check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub layout: TreeLayout,
    pub tags_checked: usize,
}

/// Broken tree invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeViolation {
    /// Interval width is not positive and odd.
    InvalidInterval { id: TagId, interval: NestedInterval },
    /// Nested-set row without interval values.
    MissingInterval { id: TagId },
    /// Child interval is not strictly inside its parent's.
    ChildOutsideParent { parent_id: TagId, child_id: TagId },
    /// Two sibling intervals overlap.
    OverlappingSiblings { first_id: TagId, second_id: TagId },
    /// Children do not tile the parent interval.
    IntervalGap {
        parent_id: TagId,
        expected: i64,
        found: i64,
    },
    /// Parent chain revisits a tag.
    Cycle { id: TagId },
    /// Tag names itself as parent.
    SelfParent { id: TagId },
    /// Parent id has no row.
    DanglingParent { id: TagId, parent_id: TagId },
    /// Parent does not list the tag among its children.
    ChildNotListed { parent_id: TagId, child_id: TagId },
    /// Nested-set tree without a root row.
    MissingRoot,
    /// Nested-set tree with several parentless rows.
    MultipleRoots { ids: Vec<TagId> },
    /// `TagsTree` rows disagree with the walked parent chain.
    ClosureMismatch { id: TagId },
}

impl Display for TreeViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInterval { id, interval } => {
                write!(f, "tag {id} has malformed interval {interval}")
            }
            Self::MissingInterval { id } => write!(f, "tag {id} has no interval"),
            Self::ChildOutsideParent {
                parent_id,
                child_id,
            } => write!(
                f,
                "interval of tag {child_id} is not inside parent {parent_id}"
            ),
            Self::OverlappingSiblings {
                first_id,
                second_id,
            } => write!(f, "sibling tags {first_id} and {second_id} overlap"),
            Self::IntervalGap {
                parent_id,
                expected,
                found,
            } => write!(
                f,
                "children of tag {parent_id} leave a gap: expected {expected}, found {found}"
            ),
            Self::Cycle { id } => write!(f, "parent chain of tag {id} is cyclic"),
            Self::SelfParent { id } => write!(f, "tag {id} is its own parent"),
            Self::DanglingParent { id, parent_id } => {
                write!(f, "tag {id} references missing parent {parent_id}")
            }
            Self::ChildNotListed {
                parent_id,
                child_id,
            } => write!(
                f,
                "tag {parent_id} does not list child {child_id}"
            ),
            Self::MissingRoot => write!(f, "nested-set tree has no root row"),
            Self::MultipleRoots { ids } => write!(f, "nested-set tree has several roots: {ids:?}"),
            Self::ClosureMismatch { id } => {
                write!(f, "closure rows of tag {id} disagree with its parent chain")
            }
        }
    }
}

impl Error for TreeViolation {}

/// Walks the whole tree and verifies its invariants.
///
/// # Errors
/// - `Integrity` with the first [`TreeViolation`] found.
/// - Repository errors while reading rows.
pub fn check_tree<R: TagRepository + ?Sized>(repo: &R) -> TagServiceResult<CheckReport> {
    let layout = repo.layout();
    let tags = repo.list_tags()?;
    let by_id: HashMap<TagId, &Tag> = tags.iter().map(|tag| (tag.id(), tag)).collect();

    let mut children: HashMap<TagId, Vec<Tag>> = HashMap::new();
    for tag in &tags {
        if tag.parent_id() == tag.id() {
            return violation(TreeViolation::SelfParent { id: tag.id() });
        }
        let ParentLink::Tag(parent_id) = layout.parent_link(tag.parent_id()) else {
            continue;
        };
        let parent = by_id
            .get(&parent_id)
            .ok_or(TreeViolation::DanglingParent {
                id: tag.id(),
                parent_id,
            })?;
        if !children.contains_key(&parent_id) {
            children.insert(parent_id, repo.children(parent)?);
        }
        let listed = children
            .get(&parent_id)
            .is_some_and(|list| list.iter().any(|child| child.id() == tag.id()));
        if !listed {
            return violation(TreeViolation::ChildNotListed {
                parent_id,
                child_id: tag.id(),
            });
        }
    }

    for tag in &tags {
        let ancestors = walk_parent_chain(layout, &by_id, tag)?;
        if let Some(recorded) = repo.closure_ancestor_ids(tag.id())? {
            if recorded != ancestors {
                return violation(TreeViolation::ClosureMismatch { id: tag.id() });
            }
        }
    }

    if layout == TreeLayout::NestedSet {
        check_intervals(layout, &tags, &mut children, repo)?;
    }

    Ok(CheckReport {
        layout,
        tags_checked: tags.len(),
    })
}

fn violation<T>(value: TreeViolation) -> TagServiceResult<T> {
    Err(TagServiceError::Integrity(value))
}

/// Ancestor ids of `tag` from the in-memory rows.
fn walk_parent_chain(
    layout: TreeLayout,
    by_id: &HashMap<TagId, &Tag>,
    tag: &Tag,
) -> Result<BTreeSet<TagId>, TreeViolation> {
    let mut seen = HashSet::from([tag.id()]);
    let mut ancestors = BTreeSet::new();
    let mut cursor = layout.parent_link(tag.parent_id());
    while let ParentLink::Tag(parent_id) = cursor {
        if !seen.insert(parent_id) {
            return Err(TreeViolation::Cycle { id: tag.id() });
        }
        let parent = by_id.get(&parent_id).ok_or(TreeViolation::DanglingParent {
            id: tag.id(),
            parent_id,
        })?;
        ancestors.insert(parent_id);
        cursor = layout.parent_link(parent.parent_id());
    }
    Ok(ancestors)
}

fn check_intervals<R: TagRepository + ?Sized>(
    layout: TreeLayout,
    tags: &[Tag],
    children: &mut HashMap<TagId, Vec<Tag>>,
    repo: &R,
) -> TagServiceResult<()> {
    let roots: Vec<&Tag> = tags
        .iter()
        .filter(|tag| layout.parent_link(tag.parent_id()) == ParentLink::None)
        .collect();
    let root = match roots.as_slice() {
        [] => return violation(TreeViolation::MissingRoot),
        [root] => *root,
        many => {
            return violation(TreeViolation::MultipleRoots {
                ids: many.iter().map(|tag| tag.id()).collect(),
            })
        }
    };

    let mut pending = vec![root.clone()];
    while let Some(parent) = pending.pop() {
        let parent_interval = interval_of(&parent)?;
        if !parent_interval.is_well_formed() {
            return violation(TreeViolation::InvalidInterval {
                id: parent.id(),
                interval: parent_interval,
            });
        }

        if !children.contains_key(&parent.id()) {
            children.insert(parent.id(), repo.children(&parent)?);
        }
        let mut kids: Vec<(NestedInterval, Tag)> = Vec::new();
        for child in children.get(&parent.id()).into_iter().flatten() {
            kids.push((interval_of(child)?, child.clone()));
        }
        kids.sort_by_key(|(interval, _)| interval.left);

        for (interval, child) in &kids {
            if !interval.is_well_formed() {
                return violation(TreeViolation::InvalidInterval {
                    id: child.id(),
                    interval: *interval,
                });
            }
            if !parent_interval.strictly_contains(*interval) {
                return violation(TreeViolation::ChildOutsideParent {
                    parent_id: parent.id(),
                    child_id: child.id(),
                });
            }
        }

        for pair in kids.windows(2) {
            let ((first, first_tag), (second, second_tag)) = (&pair[0], &pair[1]);
            if first.overlaps(*second) {
                return violation(TreeViolation::OverlappingSiblings {
                    first_id: first_tag.id(),
                    second_id: second_tag.id(),
                });
            }
        }

        let mut expected = parent_interval.left + 1;
        for (interval, _) in &kids {
            if interval.left != expected {
                return violation(TreeViolation::IntervalGap {
                    parent_id: parent.id(),
                    expected,
                    found: interval.left,
                });
            }
            expected = interval.right + 1;
        }
        if expected != parent_interval.right {
            return violation(TreeViolation::IntervalGap {
                parent_id: parent.id(),
                expected,
                found: parent_interval.right,
            });
        }

        pending.extend(kids.into_iter().map(|(_, child)| child));
    }
    Ok(())
}

fn interval_of(tag: &Tag) -> Result<NestedInterval, TreeViolation> {
    tag.interval()
        .ok_or(TreeViolation::MissingInterval { id: tag.id() })
}
