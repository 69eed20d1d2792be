use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

const HEADER_LEN: u64 = 4;
const RECORD_HEADER_LEN: u64 = 8;
const SEED: i32 = 13331;

fn roll(mut acc: i32, bytes: &[u8]) -> i32 {
    for &b in bytes {
        acc = acc.wrapping_mul(SEED).wrapping_add(b as i32);
    }
    acc
}

/// Reads one `[size:4][checksum:4][body:size]` record starting at `pos`,
/// verifying the per-record checksum. Returns the record's body and its
/// total wire length on success; `None` if the record is missing, cut
/// short, or fails its own checksum (i.e. `pos` marks the start of a
/// corrupt or incomplete tail).
fn scan_one(file: &mut File, pos: u64, file_len: u64) -> RsqlResult<Option<(Vec<u8>, u64)>> {
    if pos + RECORD_HEADER_LEN > file_len {
        return Ok(None);
    }
    let mut header = [0u8; 8];
    file.seek(SeekFrom::Start(pos))?;
    file.read_exact(&mut header)?;
    let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
    let stored_checksum = i32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if pos + RECORD_HEADER_LEN + size > file_len {
        return Ok(None);
    }
    let mut body = vec![0u8; size as usize];
    file.read_exact(&mut body)?;
    if roll(0, &body) != stored_checksum {
        return Ok(None);
    }
    let wire_len = RECORD_HEADER_LEN + size;
    Ok(Some((body, wire_len)))
}

/// Append-only log of opaque, checksummed records. A 4-byte header holds a
/// rolling checksum over every record's full wire bytes; on open the log
/// is scanned from the start and any trailing bytes that don't form a
/// complete, checksum-valid record are discarded.
pub struct Wal {
    file: Mutex<File>,
    path: PathBuf,
    write_checksum: Mutex<i32>,
    read_pos: Mutex<u64>,
}

impl Wal {
    pub fn create<P: AsRef<Path>>(path: P) -> RsqlResult<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(RsqlError::FileExists);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(&0i32.to_be_bytes())?;
        file.sync_all()?;
        info!(path = %path.display(), "created write-ahead log");
        Ok(Wal {
            file: Mutex::new(file),
            path,
            write_checksum: Mutex::new(0),
            read_pos: Mutex::new(HEADER_LEN),
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> RsqlResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_len = file.metadata()?.len();
        if file_len < HEADER_LEN {
            return Err(RsqlError::BadLogFile("file shorter than header".into()));
        }
        let mut header = [0u8; 4];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)?;
        let stored_checksum = i32::from_be_bytes(header);

        let mut pos = HEADER_LEN;
        let mut computed = 0i32;
        loop {
            match scan_one(&mut file, pos, file_len)? {
                Some((body, wire_len)) => {
                    let mut wire = vec![0u8; wire_len as usize];
                    file.seek(SeekFrom::Start(pos))?;
                    file.read_exact(&mut wire)?;
                    computed = roll(computed, &wire);
                    pos += wire_len;
                    let _ = body;
                }
                None => break,
            }
        }

        if pos != file_len {
            warn!(
                path = %path.display(),
                valid_len = pos,
                file_len,
                "truncating corrupt write-ahead log tail"
            );
            file.set_len(pos)?;
        }
        if computed != stored_checksum {
            warn!(
                path = %path.display(),
                "write-ahead log header checksum mismatch after scan, rewriting header"
            );
        }
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&computed.to_be_bytes())?;
        file.sync_all()?;

        info!(path = %path.display(), valid_len = pos, "opened write-ahead log");
        Ok(Wal {
            file: Mutex::new(file),
            path,
            write_checksum: Mutex::new(computed),
            read_pos: Mutex::new(HEADER_LEN),
        })
    }

    /// Appends `body` as a new record and returns its offset (the start of
    /// its `size` field), which callers can use to locate it later.
    pub fn append(&self, body: &[u8]) -> RsqlResult<u64> {
        let record_checksum = roll(0, body);
        let mut wire = Vec::with_capacity(RECORD_HEADER_LEN as usize + body.len());
        wire.extend_from_slice(&(body.len() as u32).to_be_bytes());
        wire.extend_from_slice(&record_checksum.to_be_bytes());
        wire.extend_from_slice(body);

        let mut file = self.file.lock().unwrap();
        let offset = file.metadata()?.len();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&wire)?;
        file.sync_all()?;

        let mut checksum = self.write_checksum.lock().unwrap();
        *checksum = roll(*checksum, &wire);
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&checksum.to_be_bytes())?;
        file.sync_all()?;

        Ok(offset)
    }

    pub fn rewind(&self) {
        *self.read_pos.lock().unwrap() = HEADER_LEN;
    }

    /// Returns the next record's body in append order, or `None` at the
    /// end of the log.
    pub fn next(&self) -> RsqlResult<Option<Vec<u8>>> {
        let mut file = self.file.lock().unwrap();
        let file_len = file.metadata()?.len();
        let mut pos = self.read_pos.lock().unwrap();
        match scan_one(&mut file, *pos, file_len)? {
            Some((body, wire_len)) => {
                *pos += wire_len;
                Ok(Some(body))
            }
            None => Ok(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::tempdir;

    #[test]
    fn append_then_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let wal = Wal::create(&path).unwrap();
        wal.append(b"first").unwrap();
        wal.append(b"second").unwrap();

        wal.rewind();
        assert_eq!(wal.next().unwrap().unwrap(), b"first");
        assert_eq!(wal.next().unwrap().unwrap(), b"second");
        assert!(wal.next().unwrap().is_none());
    }

    #[test]
    fn reopen_preserves_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        {
            let wal = Wal::create(&path).unwrap();
            wal.append(b"alpha").unwrap();
            wal.append(b"beta").unwrap();
        }
        let wal = Wal::open(&path).unwrap();
        wal.rewind();
        assert_eq!(wal.next().unwrap().unwrap(), b"alpha");
        assert_eq!(wal.next().unwrap().unwrap(), b"beta");
        assert!(wal.next().unwrap().is_none());
    }

    #[test]
    fn corrupt_tail_is_truncated_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        {
            let wal = Wal::create(&path).unwrap();
            wal.append(b"good").unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"\x00\x00\x00\x05garbageXX").unwrap();
        }
        let wal = Wal::open(&path).unwrap();
        wal.rewind();
        assert_eq!(wal.next().unwrap().unwrap(), b"good");
        assert!(wal.next().unwrap().is_none());

        let reopened = Wal::open(&path).unwrap();
        reopened.rewind();
        assert_eq!(reopened.next().unwrap().unwrap(), b"good");
    }

    #[test]
    fn open_rejects_file_shorter_than_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        std::fs::write(&path, [0u8, 1]).unwrap();
        assert!(matches!(
            Wal::open(&path),
            Err(RsqlError::BadLogFile(_))
        ));
    }
}
