//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into the tag collection facade.
//! - Verify tree invariants on demand.

pub mod tag_service;
pub mod tree_check;
