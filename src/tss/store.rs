use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// `xid = 0` is the "super" transaction: always committed, never recorded.
pub const SUPER_XID: u64 = 0;

const HEADER_LEN: u64 = 8;
const FIELD_LEN: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Active,
    Committed,
    Aborted,
}

impl TxStatus {
    fn to_byte(self) -> u8 {
        match self {
            TxStatus::Active => 0,
            TxStatus::Committed => 1,
            TxStatus::Aborted => 2,
        }
    }

    fn from_byte(b: u8) -> RsqlResult<TxStatus> {
        match b {
            0 => Ok(TxStatus::Active),
            1 => Ok(TxStatus::Committed),
            2 => Ok(TxStatus::Aborted),
            _ => Err(RsqlError::BadTransactionFile),
        }
    }
}

/// On-disk layout: `[counter:8 BE][status:1]*`, one status byte per
/// transaction in ascending xid order starting at xid 1.
pub struct TransactionStateStore {
    file: Mutex<File>,
    counter: Mutex<u64>,
    path: PathBuf,
}

impl TransactionStateStore {
    pub fn create<P: AsRef<Path>>(path: P) -> RsqlResult<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(RsqlError::FileExists);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(&0u64.to_be_bytes())?;
        file.sync_all()?;
        info!(path = %path.display(), "created transaction state store");
        Ok(TransactionStateStore {
            file: Mutex::new(file),
            counter: Mutex::new(0),
            path,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> RsqlResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_len = file.metadata()?.len();
        if file_len < HEADER_LEN {
            return Err(RsqlError::BadTransactionFile);
        }
        let mut header = [0u8; 8];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)?;
        let counter = u64::from_be_bytes(header);
        if file_len != HEADER_LEN + counter * FIELD_LEN {
            return Err(RsqlError::BadTransactionFile);
        }
        info!(path = %path.display(), xid_counter = counter, "opened transaction state store");
        Ok(TransactionStateStore {
            file: Mutex::new(file),
            counter: Mutex::new(counter),
            path,
        })
    }

    fn position(xid: u64) -> u64 {
        HEADER_LEN + (xid - 1) * FIELD_LEN
    }

    fn write_status(&self, xid: u64, status: TxStatus) -> RsqlResult<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(Self::position(xid)))?;
        file.write_all(&[status.to_byte()])?;
        file.sync_all()?;
        Ok(())
    }

    fn read_status(&self, xid: u64) -> RsqlResult<TxStatus> {
        let mut file = self.file.lock().unwrap();
        let mut buf = [0u8; 1];
        file.seek(SeekFrom::Start(Self::position(xid)))?;
        file.read_exact(&mut buf)?;
        TxStatus::from_byte(buf[0])
    }

    /// Allocates a fresh xid, records it `Active`, and persists the bumped
    /// counter before returning.
    pub fn begin(&self) -> RsqlResult<u64> {
        let mut counter = self.counter.lock().unwrap();
        let xid = *counter + 1;
        self.write_status(xid, TxStatus::Active)?;
        {
            let mut file = self.file.lock().unwrap();
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&xid.to_be_bytes())?;
            file.sync_all()?;
        }
        *counter = xid;
        debug!(xid, "began transaction");
        Ok(xid)
    }

    pub fn commit(&self, xid: u64) -> RsqlResult<()> {
        debug!(xid, "committed transaction");
        self.write_status(xid, TxStatus::Committed)
    }

    pub fn abort(&self, xid: u64) -> RsqlResult<()> {
        debug!(xid, "aborted transaction");
        self.write_status(xid, TxStatus::Aborted)
    }

    pub fn is_active(&self, xid: u64) -> RsqlResult<bool> {
        if xid == SUPER_XID {
            return Ok(false);
        }
        Ok(self.read_status(xid)? == TxStatus::Active)
    }

    pub fn is_committed(&self, xid: u64) -> RsqlResult<bool> {
        if xid == SUPER_XID {
            return Ok(true);
        }
        Ok(self.read_status(xid)? == TxStatus::Committed)
    }

    pub fn is_aborted(&self, xid: u64) -> RsqlResult<bool> {
        if xid == SUPER_XID {
            return Ok(false);
        }
        Ok(self.read_status(xid)? == TxStatus::Aborted)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
