//! Generic bounded resource cache (spec.md §4.1) plus the page-level cache
//! built on top of it.

pub mod cache;
pub use cache::{Cache, Finalizer, Loader};

pub mod page;
pub use page::{Page, PageStore};
