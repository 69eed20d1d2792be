//! WAL body encoding for the two kinds of log DM writes: insert and
//! update (spec.md §3). The WAL itself never interprets these bytes; DM
//! owns both ends of the encoding.

use crate::common::bytes::{pack_uid, read_u16_be, read_u32_be, read_u64_be, unpack_uid, write_u16_be, write_u32_be, write_u64_be};
use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;

const LOG_TYPE_INSERT: u8 = 0;
const LOG_TYPE_UPDATE: u8 = 1;

#[derive(Debug, Clone)]
pub enum LogRecord {
    Insert {
        xid: u64,
        page_no: u32,
        offset: u16,
        raw: Vec<u8>,
    },
    Update {
        xid: u64,
        page_no: u32,
        offset: u16,
        old_raw: Vec<u8>,
        new_raw: Vec<u8>,
    },
}

impl LogRecord {
    pub fn xid(&self) -> u64 {
        match self {
            LogRecord::Insert { xid, .. } => *xid,
            LogRecord::Update { xid, .. } => *xid,
        }
    }

    pub fn page_no(&self) -> u32 {
        match self {
            LogRecord::Insert { page_no, .. } => *page_no,
            LogRecord::Update { page_no, .. } => *page_no,
        }
    }

    pub fn encode_insert(xid: u64, page_no: u32, offset: u16, raw: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 8 + 4 + 2 + raw.len());
        out.push(LOG_TYPE_INSERT);
        write_u64_be(&mut out, xid);
        write_u32_be(&mut out, page_no);
        write_u16_be(&mut out, offset);
        out.extend_from_slice(raw);
        out
    }

    pub fn encode_update(xid: u64, uid: u64, old_raw: &[u8], new_raw: &[u8]) -> Vec<u8> {
        debug_assert_eq!(old_raw.len(), new_raw.len());
        let mut out = Vec::with_capacity(1 + 8 + 8 + old_raw.len() + new_raw.len());
        out.push(LOG_TYPE_UPDATE);
        write_u64_be(&mut out, xid);
        write_u64_be(&mut out, uid);
        out.extend_from_slice(old_raw);
        out.extend_from_slice(new_raw);
        out
    }

    pub fn decode(bytes: &[u8]) -> RsqlResult<LogRecord> {
        if bytes.is_empty() {
            return Err(RsqlError::BadLogFile("empty log record".into()));
        }
        match bytes[0] {
            LOG_TYPE_INSERT => {
                if bytes.len() < 1 + 8 + 4 + 2 {
                    return Err(RsqlError::BadLogFile("truncated insert record".into()));
                }
                let xid = read_u64_be(&bytes[1..9]);
                let page_no = read_u32_be(&bytes[9..13]);
                let offset = read_u16_be(&bytes[13..15]);
                let raw = bytes[15..].to_vec();
                Ok(LogRecord::Insert {
                    xid,
                    page_no,
                    offset,
                    raw,
                })
            }
            LOG_TYPE_UPDATE => {
                if bytes.len() < 1 + 8 + 8 {
                    return Err(RsqlError::BadLogFile("truncated update record".into()));
                }
                let xid = read_u64_be(&bytes[1..9]);
                let uid = read_u64_be(&bytes[9..17]);
                let (page_no, offset) = unpack_uid(uid);
                let rest = &bytes[17..];
                if rest.len() % 2 != 0 {
                    return Err(RsqlError::BadLogFile("uneven update record halves".into()));
                }
                let half = rest.len() / 2;
                Ok(LogRecord::Update {
                    xid,
                    page_no,
                    offset,
                    old_raw: rest[..half].to_vec(),
                    new_raw: rest[half..].to_vec(),
                })
            }
            other => Err(RsqlError::BadLogFile(format!("unknown log record type {other}"))),
        }
    }
}

/// Re-exported for callers that need to build a UID the same way DM does.
pub fn log_record_uid(page_no: u32, offset: u16) -> u64 {
    pack_uid(page_no, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_roundtrip() {
        let raw = vec![0u8, 0, 3, b'a', b'b', b'c'];
        let bytes = LogRecord::encode_insert(7, 3, 42, &raw);
        match LogRecord::decode(&bytes).unwrap() {
            LogRecord::Insert {
                xid,
                page_no,
                offset,
                raw: got,
            } => {
                assert_eq!(xid, 7);
                assert_eq!(page_no, 3);
                assert_eq!(offset, 42);
                assert_eq!(got, raw);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn update_roundtrip() {
        let uid = log_record_uid(5, 100);
        let old_raw = vec![1u8; 16];
        let new_raw = vec![2u8; 16];
        let bytes = LogRecord::encode_update(9, uid, &old_raw, &new_raw);
        match LogRecord::decode(&bytes).unwrap() {
            LogRecord::Update {
                xid,
                page_no,
                offset,
                old_raw: got_old,
                new_raw: got_new,
            } => {
                assert_eq!(xid, 9);
                assert_eq!(page_no, 5);
                assert_eq!(offset, 100);
                assert_eq!(got_old, old_raw);
                assert_eq!(got_new, new_raw);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn decode_rejects_unknown_type() {
        assert!(LogRecord::decode(&[9, 0, 0]).is_err());
    }
}
