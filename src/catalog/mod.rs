//! Table-layer catalog: schema persistence and the linked list of tables
//! rooted at the `.bt` boot file (spec.md §3.1, §4.7).

pub mod booter;
pub mod field;
pub mod table;
pub mod manager;

pub use field::{CompareOp, Field};
pub use manager::Catalog;
pub use table::{Table, WhereClause};
