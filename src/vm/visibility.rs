//! Snapshot-isolation visibility predicates (vm/Visibility.go).
//!
//! The upstream repeatable-read predicate tests `XMin != xid` at the
//! point where the structurally identical read-committed predicate tests
//! `XMax != xid`; taken literally that makes a transaction's own deletes
//! invisible to itself under repeatable read. This port uses the
//! `xmax != xid` comparison in both predicates (decided and recorded in
//! SPEC_FULL.md §9).

use crate::common::result::RsqlResult;
use crate::tss::TransactionStateStore;
use crate::vm::entry::Entry;
use crate::vm::transaction::{IsolationLevel, Transaction};

fn read_committed(tss: &TransactionStateStore, txn: &Transaction, entry: &Entry) -> RsqlResult<bool> {
    let xmin = entry.xmin();
    let xmax = entry.xmax();
    if xmin == txn.xid && xmax == 0 {
        return Ok(true);
    }
    if !tss.is_committed(xmin)? {
        return Ok(false);
    }
    if xmax == 0 {
        return Ok(true);
    }
    if xmax == txn.xid {
        return Ok(false);
    }
    Ok(!tss.is_committed(xmax)?)
}

fn repeatable_read(tss: &TransactionStateStore, txn: &Transaction, entry: &Entry) -> RsqlResult<bool> {
    let xmin = entry.xmin();
    let xmax = entry.xmax();
    if xmin == txn.xid && xmax == 0 {
        return Ok(true);
    }
    let xmin_visible = tss.is_committed(xmin)? && xmin < txn.xid && !txn.is_in_snapshot(xmin);
    if !xmin_visible {
        return Ok(false);
    }
    if xmax == 0 {
        return Ok(true);
    }
    if xmax == txn.xid {
        return Ok(false);
    }
    Ok(!tss.is_committed(xmax)? || xmax > txn.xid || txn.is_in_snapshot(xmax))
}

pub fn is_visible(tss: &TransactionStateStore, txn: &Transaction, entry: &Entry) -> RsqlResult<bool> {
    match txn.level {
        IsolationLevel::ReadCommitted => read_committed(tss, txn, entry),
        IsolationLevel::RepeatableRead => repeatable_read(tss, txn, entry),
    }
}

/// True when some transaction this snapshot can't see has already
/// superseded this version: the caller must treat that as a write-write
/// conflict rather than silently acting on a stale read.
pub fn is_version_skip(tss: &TransactionStateStore, txn: &Transaction, entry: &Entry) -> RsqlResult<bool> {
    if txn.level == IsolationLevel::ReadCommitted {
        return Ok(false);
    }
    let xmax = entry.xmax();
    Ok(tss.is_committed(xmax)? && (xmax > txn.xid || txn.is_in_snapshot(xmax)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dm::DataManager;
    use crate::vm::entry::wrap;
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn make_entry(dm: &DataManager, xmin: u64, xmax: u64, payload: &[u8]) -> Entry {
        let mut raw = wrap(xmin, payload);
        raw[8..16].copy_from_slice(&xmax.to_be_bytes());
        let uid = dm.insert(xmin, &raw).unwrap();
        let item = dm.read(uid).unwrap().unwrap();
        Entry::new(uid, item)
    }

    #[test]
    fn read_committed_sees_own_uncommitted_insert() {
        let dir = tempdir().unwrap();
        let dm = DataManager::create(dir.path().join("db"), 256, 0).unwrap();
        let tss = crate::tss::TransactionStateStore::create(dir.path().join("db.xid")).unwrap();
        let xid = tss.begin().unwrap();

        let entry = make_entry(&dm, xid, 0, b"mine");
        let txn = Transaction::new(xid, IsolationLevel::ReadCommitted, &HashSet::new());
        assert!(read_committed(&tss, &txn, &entry).unwrap());
    }

    #[test]
    fn read_committed_hides_uncommitted_insert_from_others() {
        let dir = tempdir().unwrap();
        let dm = DataManager::create(dir.path().join("db"), 256, 0).unwrap();
        let tss = crate::tss::TransactionStateStore::create(dir.path().join("db.xid")).unwrap();
        let writer = tss.begin().unwrap();
        let reader = tss.begin().unwrap();

        let entry = make_entry(&dm, writer, 0, b"not yet committed");
        let txn = Transaction::new(reader, IsolationLevel::ReadCommitted, &HashSet::new());
        assert!(!read_committed(&tss, &txn, &entry).unwrap());
    }

    #[test]
    fn repeatable_read_hides_rows_from_transactions_concurrent_at_begin() {
        let dir = tempdir().unwrap();
        let dm = DataManager::create(dir.path().join("db"), 256, 0).unwrap();
        let tss = crate::tss::TransactionStateStore::create(dir.path().join("db.xid")).unwrap();
        let writer = tss.begin().unwrap();
        let reader = tss.begin().unwrap();
        let snapshot: HashSet<u64> = [writer].into_iter().collect();
        let txn = Transaction::new(reader, IsolationLevel::RepeatableRead, &snapshot);

        tss.commit(writer).unwrap();
        let entry = make_entry(&dm, writer, 0, b"committed after snapshot taken");
        assert!(!repeatable_read(&tss, &txn, &entry).unwrap());
    }

    #[test]
    fn repeatable_read_own_delete_is_invisible_to_self() {
        let dir = tempdir().unwrap();
        let dm = DataManager::create(dir.path().join("db"), 256, 0).unwrap();
        let tss = crate::tss::TransactionStateStore::create(dir.path().join("db.xid")).unwrap();
        let xid = tss.begin().unwrap();
        let txn = Transaction::new(xid, IsolationLevel::RepeatableRead, &HashSet::new());

        let entry = make_entry(&dm, xid, xid, b"deleted by myself");
        assert!(!repeatable_read(&tss, &txn, &entry).unwrap());
    }

    #[test]
    fn is_version_skip_flags_concurrent_delete_outside_snapshot() {
        let dir = tempdir().unwrap();
        let dm = DataManager::create(dir.path().join("db"), 256, 0).unwrap();
        let tss = crate::tss::TransactionStateStore::create(dir.path().join("db.xid")).unwrap();
        let reader = tss.begin().unwrap();
        let deleter = tss.begin().unwrap();
        tss.commit(deleter).unwrap();

        let txn = Transaction::new(reader, IsolationLevel::RepeatableRead, &HashSet::new());
        let entry = make_entry(&dm, reader, deleter, b"row");
        // deleter committed after reader began and wasn't in reader's snapshot.
        assert!(is_version_skip(&tss, &txn, &entry).unwrap());
    }
}
