//! Per-connection transaction state (spec.md §5: "each connection owns
//! exactly one Transaction at a time via BEGIN/COMMIT/ABORT").

use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;

#[derive(Default)]
pub struct Session {
    xid: Option<u64>,
}

impl Session {
    pub fn new() -> Session {
        Session { xid: None }
    }

    pub fn xid(&self) -> Option<u64> {
        self.xid
    }

    pub fn begin(&mut self, xid: u64) -> RsqlResult<()> {
        if self.xid.is_some() {
            return Err(RsqlError::NestedTransaction);
        }
        self.xid = Some(xid);
        Ok(())
    }

    /// Takes the session's explicit transaction, if any, for COMMIT/ABORT.
    pub fn take_xid(&mut self) -> RsqlResult<u64> {
        self.xid.take().ok_or(RsqlError::NoTransaction)
    }
}
