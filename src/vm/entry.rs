//! The MVCC record layout wrapped around every `DataItem` the version
//! manager owns: `[xmin:8][xmax:8][payload]` (vm/Entry.go). `xmin` is the
//! inserting transaction; `xmax` is the transaction that superseded this
//! version, or `0` while the version is still current.

use crate::common::bytes::{read_u64_be, write_u64_be};
use crate::common::result::RsqlResult;
use crate::dm::{DataItem, DataManager};
use std::sync::Arc;

const OFFSET_XMIN: usize = 0;
const OFFSET_XMAX: usize = 8;
const OFFSET_PAYLOAD: usize = 16;

pub struct Entry {
    uid: u64,
    item: Arc<DataItem>,
}

impl Entry {
    pub fn new(uid: u64, item: Arc<DataItem>) -> Self {
        Entry { uid, item }
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn xmin(&self) -> u64 {
        read_u64_be(&self.item.data()[OFFSET_XMIN..OFFSET_XMAX])
    }

    pub fn xmax(&self) -> u64 {
        read_u64_be(&self.item.data()[OFFSET_XMAX..OFFSET_PAYLOAD])
    }

    pub fn payload(&self) -> Vec<u8> {
        self.item.data()[OFFSET_PAYLOAD..].to_vec()
    }

    /// Flips `xmax` to `xid` in place, through the data manager's
    /// before/set/after protocol so the change is WAL-logged.
    pub fn set_xmax(&self, dm: &DataManager, xid: u64) -> RsqlResult<()> {
        let mut raw = self.item.data();
        raw[OFFSET_XMAX..OFFSET_PAYLOAD].copy_from_slice(&xid.to_be_bytes());
        dm.update(xid, &self.item, &raw)
    }
}

/// Wraps a fresh payload as `xmin = xid`, `xmax = 0`.
pub fn wrap(xid: u64, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(OFFSET_PAYLOAD + payload.len());
    write_u64_be(&mut out, xid);
    write_u64_be(&mut out, 0);
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dm::DataManager;
    use tempfile::tempdir;

    #[test]
    fn wrap_then_read_roundtrips_payload_and_xmin() {
        let dir = tempdir().unwrap();
        let dm = DataManager::create(dir.path().join("db"), 256, 0).unwrap();

        let raw = wrap(7, b"row-one");
        let uid = dm.insert(7, &raw).unwrap();
        let item = dm.read(uid).unwrap().unwrap();
        let entry = Entry::new(uid, item);

        assert_eq!(entry.xmin(), 7);
        assert_eq!(entry.xmax(), 0);
        assert_eq!(entry.payload(), b"row-one");
    }

    #[test]
    fn set_xmax_marks_the_version_superseded() {
        let dir = tempdir().unwrap();
        let dm = DataManager::create(dir.path().join("db"), 256, 0).unwrap();

        let raw = wrap(1, b"deleted-soon");
        let uid = dm.insert(1, &raw).unwrap();
        let item = dm.read(uid).unwrap().unwrap();
        let entry = Entry::new(uid, item);

        entry.set_xmax(&dm, 9).unwrap();
        assert_eq!(entry.xmax(), 9);
        assert_eq!(entry.payload(), b"deleted-soon");
    }
}
