//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for the tag tree.
//! - Isolate SQLite query details and layout branching from services.
//!
//! # Invariants
//! - Repository writes must enforce `Tag::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `HasChildren`,
//!   `UnsupportedMutation`) in addition to DB transport errors.

mod interval_allocator;
pub mod property_repo;
pub mod tag_repo;
