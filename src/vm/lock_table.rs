//! Wait-for graph deadlock detection over per-row locks (vm/LockTable.go).
//!
//! The upstream `hasDeadLock` re-enters the same lock `Add` already holds,
//! which only works because Go's `ReentrantLock` allows recursive
//! acquisition; `std::sync::Mutex` does not, so here the cycle check runs
//! inline inside `acquire`'s own critical section instead of taking a
//! second lock.

use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;
use std::collections::HashMap;
use std::sync::{Condvar, Mutex};

struct Inner {
    /// xid -> uids it currently holds.
    x2u: HashMap<u64, Vec<u64>>,
    /// uid -> xid currently holding it.
    u2x: HashMap<u64, u64>,
    /// uid -> xids waiting on it, in arrival order.
    wait: HashMap<u64, Vec<u64>>,
    /// xid -> uid it is genuinely still waiting on.
    wait_u: HashMap<u64, u64>,
    stamp: u32,
    xid_stamp: HashMap<u64, u32>,
}

impl Inner {
    fn is_in_list(&self, xid: u64, uid: u64) -> bool {
        self.x2u.get(&xid).is_some_and(|uids| uids.contains(&uid))
    }

    fn remove_from_wait_queue(&mut self, uid: u64, xid: u64) {
        if let Some(queue) = self.wait.get_mut(&uid) {
            queue.retain(|&x| x != xid);
            if queue.is_empty() {
                self.wait.remove(&uid);
            }
        }
    }

    /// Hands `uid` to the next genuine waiter in FIFO order, skipping
    /// anyone who is no longer actually waiting (already deadlock-evicted).
    fn select_new_xid(&mut self, uid: u64) {
        self.u2x.remove(&uid);
        loop {
            let Some(queue) = self.wait.get_mut(&uid) else { return };
            if queue.is_empty() {
                self.wait.remove(&uid);
                return;
            }
            let xid = queue.remove(0);
            if queue.is_empty() {
                self.wait.remove(&uid);
            }
            if self.wait_u.remove(&xid).is_some() {
                self.u2x.insert(uid, xid);
                return;
            }
        }
    }

    /// Runs a fresh DFS from every xid holding at least one resource; any
    /// xid on a cycle necessarily holds one, since the cycle closes back
    /// through `u2x`.
    fn has_deadlock(&mut self) -> bool {
        self.xid_stamp.clear();
        self.stamp = 0;
        let roots: Vec<u64> = self.x2u.keys().copied().collect();
        for xid in roots {
            self.stamp += 1;
            if self.dfs(xid) {
                return true;
            }
        }
        false
    }

    fn dfs(&mut self, xid: u64) -> bool {
        if let Some(&stamp) = self.xid_stamp.get(&xid) {
            return stamp == self.stamp;
        }
        self.xid_stamp.insert(xid, self.stamp);
        let Some(&uid) = self.wait_u.get(&xid) else { return false };
        let Some(&holder) = self.u2x.get(&uid) else { return false };
        self.dfs(holder)
    }
}

pub struct LockTable {
    inner: Mutex<Inner>,
    cvar: Condvar,
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTable {
    pub fn new() -> Self {
        LockTable {
            inner: Mutex::new(Inner {
                x2u: HashMap::new(),
                u2x: HashMap::new(),
                wait: HashMap::new(),
                wait_u: HashMap::new(),
                stamp: 0,
                xid_stamp: HashMap::new(),
            }),
            cvar: Condvar::new(),
        }
    }

    /// Blocks until `xid` holds `uid`, or returns `Deadlock` immediately
    /// if granting the wait would close a cycle in the wait-for graph.
    pub fn acquire(&self, xid: u64, uid: u64) -> RsqlResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.is_in_list(xid, uid) {
            return Ok(());
        }
        if !inner.u2x.contains_key(&uid) {
            inner.u2x.insert(uid, xid);
            inner.x2u.entry(xid).or_default().push(uid);
            return Ok(());
        }
        inner.wait.entry(uid).or_default().push(xid);
        inner.wait_u.insert(xid, uid);
        if inner.has_deadlock() {
            inner.wait_u.remove(&xid);
            inner.remove_from_wait_queue(uid, xid);
            return Err(RsqlError::Deadlock);
        }
        loop {
            if inner.u2x.get(&uid) == Some(&xid) {
                inner.x2u.entry(xid).or_default().push(uid);
                return Ok(());
            }
            inner = self.cvar.wait(inner).unwrap();
        }
    }

    /// Releases every uid `xid` holds, waking the next waiter for each.
    pub fn release(&self, xid: u64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(uids) = inner.x2u.remove(&xid) {
            for uid in uids {
                inner.select_new_xid(uid);
            }
        }
        inner.wait_u.remove(&xid);
        drop(inner);
        self.cvar.notify_all();
    }
}
