//! Core tag hierarchy logic for photo catalogs.
//! This crate owns the tag tree invariants for both storage layouts.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult, LayoutChoice};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use model::layout::{
    ParentLink, TreeLayout, ROOT_ROW_PARENT_ID, ROOT_TAG_ID, ROOT_TAG_NAME, TOP_LEVEL_PARENT_ID,
};
pub use model::tag::{NestedInterval, NewTag, Tag, TagIcon, TagId, TagValidationError};
pub use repo::property_repo::{PropertyStore, PropertyTable, INTERNAL_TAG_PROPERTY};
pub use repo::tag_repo::{SqliteTagRepository, TagRepoError, TagRepoResult, TagRepository};
pub use service::tag_service::{
    TagErrorKind, TagLookup, TagRef, TagService, TagServiceError, TagServiceResult,
};
pub use service::tree_check::{check_tree, CheckReport, TreeViolation};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
