//! This file provides the tunable constants for rsql.
//! Caution: if you change the page or item layout constants below, delete
//! old database files before starting rsql, or recovery will misread them.

pub const _NAME: &str = "rsql";
pub const _VERSION: &str = "0.1.0";

pub const PORT: u16 = 4455;

pub const LOG_LEVEL: &str = "debug";
pub const LOG_PATH: &str = "./logs/rsql.log";

pub const THREAD_MAXNUM: usize = 64;

/// Page size in bytes. Page 1 is the anchor and never stores data items.
pub const PAGE_SIZE_BYTES: usize = 8 * 1024;

/// Default page cache budget, expressed as a page count. The launcher's
/// `--mem SIZE` flag overrides this at runtime.
pub const DEFAULT_PAGE_CACHE_PAGES: usize = (32 * 1024 * 1024) / PAGE_SIZE_BYTES;

/// Number of buckets the data manager's free-space page index partitions
/// pages into; bucket width is `PAGE_SIZE_BYTES / PAGE_INDEX_BUCKETS`.
pub const PAGE_INDEX_BUCKETS: usize = 40;

/// Retries DM.insert attempts against the page index before allocating a
/// fresh page.
pub const PAGE_SELECT_RETRIES: usize = 5;

/// B+tree node fan-out: a leaf or internal node splits once it holds
/// `2 * BALANCE` keys.
pub const BALANCE: usize = 32;

pub const MAX_VARCHAR_SIZE: usize = 65535;
pub const MAX_COL_NAME_SIZE: usize = 64;
pub const MAX_TABLE_NAME_SIZE: usize = 64;

/// Poll backoff while waiting for another thread to finish loading the
/// same cache key.
pub const CACHE_LOAD_BACKOFF: std::time::Duration = std::time::Duration::from_micros(200);
