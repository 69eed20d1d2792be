//! B+tree Index: per-table secondary/primary index over row UIDs,
//! keyed by `i64` (spec.md §4.6).

pub mod node;
pub mod tree;

pub use tree::BPlusTree;
