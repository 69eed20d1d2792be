//! A transaction's view of the database as the version manager sees it:
//! its isolation level, and, for repeatable read, the set of transactions
//! that were already active when it began (vm/Transaction.go).

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
}

pub struct Transaction {
    pub xid: u64,
    pub level: IsolationLevel,
    snapshot: HashSet<u64>,
    auto_aborted: AtomicBool,
}

impl Transaction {
    /// `active` is the set of xids the version manager considers
    /// in-flight at the moment this transaction begins. Read-committed
    /// transactions never consult a snapshot, so it's left empty for them.
    pub fn new(xid: u64, level: IsolationLevel, active: &HashSet<u64>) -> Self {
        let snapshot = match level {
            IsolationLevel::ReadCommitted => HashSet::new(),
            IsolationLevel::RepeatableRead => active.clone(),
        };
        Transaction {
            xid,
            level,
            snapshot,
            auto_aborted: AtomicBool::new(false),
        }
    }

    /// `SUPER_XID` belongs to no one's snapshot.
    pub fn is_in_snapshot(&self, xid: u64) -> bool {
        if xid == crate::tss::SUPER_XID {
            return false;
        }
        self.snapshot.contains(&xid)
    }

    pub fn mark_auto_aborted(&self) {
        self.auto_aborted.store(true, Ordering::SeqCst);
    }

    pub fn was_auto_aborted(&self) -> bool {
        self.auto_aborted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_committed_never_builds_a_snapshot() {
        let active: HashSet<u64> = [1, 2, 3].into_iter().collect();
        let txn = Transaction::new(4, IsolationLevel::ReadCommitted, &active);
        assert!(!txn.is_in_snapshot(1));
    }

    #[test]
    fn repeatable_read_captures_active_set_at_begin() {
        let active: HashSet<u64> = [1, 2].into_iter().collect();
        let txn = Transaction::new(3, IsolationLevel::RepeatableRead, &active);
        assert!(txn.is_in_snapshot(1));
        assert!(txn.is_in_snapshot(2));
        assert!(!txn.is_in_snapshot(5));
    }

    #[test]
    fn super_xid_is_never_in_any_snapshot() {
        let active: HashSet<u64> = [0].into_iter().collect();
        let txn = Transaction::new(3, IsolationLevel::RepeatableRead, &active);
        assert!(!txn.is_in_snapshot(0));
    }
}
