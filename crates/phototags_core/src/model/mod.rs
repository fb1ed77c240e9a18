//! Tag hierarchy domain model.
//!
//! # Responsibility
//! - Define the tag record and its typed accessors.
//! - Define the tree layout capability and its "no parent" sentinels.
//!
//! # Invariants
//! - Tags reference their parent by id only; no owning parent pointers.
//! - Nested-set intervals exist only for tags loaded from a nested-set store.

pub mod layout;
pub mod tag;
