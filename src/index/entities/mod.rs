//! Index entities
//!
//! Secondary-index rows over the object store. The store stays the source
//! of truth; these tables exist for the queries it cannot answer.

pub mod chunk;
pub mod object;
pub mod seal;
pub mod seal_parent;
pub mod seal_overwrite;
pub mod timeline;
pub mod tree;
pub mod tree_entry;
