//! A single variable-length data item: `[valid:1][size:2 BE][payload]`
//! (spec.md §3), plus the before/set/after/un-before protocol DM exposes
//! for in-place updates that preserve the item's total length (used by
//! the version manager to flip an entry's `xmax`).

use crate::common::bytes::{pack_uid, unpack_uid};
use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;
use crate::dm::record::LogRecord;
use crate::page_cache::page::Page;
use crate::wal::Wal;
use std::sync::{Arc, Condvar, Mutex};

const OFFSET_VALID: usize = 0;
const OFFSET_SIZE: usize = 1;
const OFFSET_DATA: usize = 3;

pub fn wrap(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(OFFSET_DATA + payload.len());
    out.push(0); // valid
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn mark_invalid(raw: &mut [u8]) {
    raw[OFFSET_VALID] = 1;
}

pub fn is_valid_raw(raw: &[u8]) -> bool {
    raw[OFFSET_VALID] == 0
}

pub fn item_len(page_data: &[u8], offset: u16) -> usize {
    let off = offset as usize;
    let size = u16::from_be_bytes([page_data[off + OFFSET_SIZE], page_data[off + OFFSET_SIZE + 1]]);
    OFFSET_DATA + size as usize
}

/// A simple exclusive lock with explicit lock/unlock calls (rather than a
/// RAII guard), since `before`/`after` span a WAL append between the two.
struct ManualLock {
    locked: Mutex<bool>,
    cvar: Condvar,
}

impl ManualLock {
    fn new() -> Self {
        ManualLock {
            locked: Mutex::new(false),
            cvar: Condvar::new(),
        }
    }

    fn lock(&self) {
        let mut guard = self.locked.lock().unwrap();
        while *guard {
            guard = self.cvar.wait(guard).unwrap();
        }
        *guard = true;
    }

    fn unlock(&self) {
        let mut guard = self.locked.lock().unwrap();
        *guard = false;
        self.cvar.notify_one();
    }
}

pub struct DataItem {
    uid: u64,
    page: Arc<Mutex<Page>>,
    offset: u16,
    wal: Arc<Wal>,
    lock: ManualLock,
    old_raw: Mutex<Option<Vec<u8>>>,
}

impl DataItem {
    pub fn new(uid: u64, page: Arc<Mutex<Page>>, offset: u16, wal: Arc<Wal>) -> Self {
        DataItem {
            uid,
            page,
            offset,
            wal,
            lock: ManualLock::new(),
            old_raw: Mutex::new(None),
        }
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn page_no(&self) -> u32 {
        unpack_uid(self.uid).0
    }

    fn raw_range(&self, page_data: &[u8]) -> std::ops::Range<usize> {
        let off = self.offset as usize;
        off..off + item_len(page_data, self.offset)
    }

    pub fn is_valid(&self) -> bool {
        let page = self.page.lock().unwrap();
        is_valid_raw(&page.data[self.offset as usize..])
    }

    /// Returns a copy of the item's current payload bytes.
    pub fn data(&self) -> Vec<u8> {
        let page = self.page.lock().unwrap();
        let range = self.raw_range(&page.data);
        page.data[range.start + OFFSET_DATA..range.end].to_vec()
    }

    fn raw(&self) -> Vec<u8> {
        let page = self.page.lock().unwrap();
        let range = self.raw_range(&page.data);
        page.data[range].to_vec()
    }

    /// Begins an in-place modification: takes the exclusive lock, snapshots
    /// the current raw bytes for the undo log, and marks the page dirty.
    pub fn before(&self) {
        self.lock.lock();
        self.page.lock().unwrap().dirty = true;
        *self.old_raw.lock().unwrap() = Some(self.raw());
    }

    /// Rolls back a `before()` without writing anything, releasing the
    /// lock. Used when the caller's modification itself failed.
    pub fn un_before(&self) {
        self.old_raw.lock().unwrap().take();
        self.lock.unlock();
    }

    /// Overwrites the payload in place; the new payload must be the same
    /// length as the current one (spec.md's update-log invariant: old/new
    /// halves are equal length).
    pub fn set_payload(&self, new_payload: &[u8]) -> RsqlResult<()> {
        let mut page = self.page.lock().unwrap();
        let range = self.raw_range(&page.data);
        let current_len = range.end - range.start - OFFSET_DATA;
        if new_payload.len() != current_len {
            return Err(RsqlError::InvalidValues);
        }
        let start = range.start + OFFSET_DATA;
        page.data[start..start + new_payload.len()].copy_from_slice(new_payload);
        Ok(())
    }

    /// Finishes a modification: writes the update log record and releases
    /// the lock. If the WAL append fails, the mutation is rolled back
    /// (same effect as `un_before`) before the lock is released, since the
    /// caller never gets a chance to call `un_before` itself once bytes
    /// have already been written by `set_payload`.
    pub fn after(&self, xid: u64) -> RsqlResult<()> {
        let old_raw = self
            .old_raw
            .lock()
            .unwrap()
            .take()
            .expect("after() called without a matching before()");
        let new_raw = self.raw();
        let log = LogRecord::encode_update(xid, self.uid, &old_raw, &new_raw);
        let result = self.wal.append(&log);
        if result.is_err() {
            let mut page = self.page.lock().unwrap();
            let range = self.raw_range(&page.data);
            page.data[range].copy_from_slice(&old_raw);
        }
        self.lock.unlock();
        result.map(|_| ())
    }
}

pub fn make_uid(page_no: u32, offset: u16) -> u64 {
    pack_uid(page_no, offset)
}
