//! Write-ahead log: a body-opaque append log with a rolling file checksum
//! and open-time corrupt-tail truncation (spec.md §4.2).

pub mod log;
pub use log::Wal;
