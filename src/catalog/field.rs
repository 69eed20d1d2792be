//! A single column's catalog record (spec.md §3.1, grounded on
//! `original_source/backend/tbm/Field.go`): `[name][kind:1][index_boot_uid:8]`,
//! persisted once at `CREATE TABLE` time and never rewritten afterwards.
//! An indexed field owns a B+tree rooted at `index_boot_uid` (`0` means
//! unindexed); `Table::resolve_where` is the only reader of that tree.

use crate::bpt::BPlusTree;
use crate::common::bytes::{read_u64_be, write_u64_be};
use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;
use crate::common::value::FieldType;
use crate::dm::DataManager;
use crate::tss::SUPER_XID;
use crate::vm::entry;
use std::sync::Arc;

/// A WHERE clause's comparison operator (Field.go's `CalExp`, extended
/// with `<=`/`>=` per spec.md §4.7's grammar).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl CompareOp {
    /// Maps `field <op> value` onto the inclusive `i64` key range the
    /// B+tree should search.
    pub fn range(self, key: i64) -> (i64, i64) {
        match self {
            CompareOp::Lt => (i64::MIN, key.saturating_sub(1)),
            CompareOp::Le => (i64::MIN, key),
            CompareOp::Eq => (key, key),
            CompareOp::Ge => (key, i64::MAX),
            CompareOp::Gt => (key.saturating_add(1), i64::MAX),
        }
    }
}

pub struct Field {
    uid: u64,
    name: String,
    kind: FieldType,
    index_boot_uid: Option<u64>,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldType {
        self.kind
    }

    pub fn is_indexed(&self) -> bool {
        self.index_boot_uid.is_some()
    }

    /// Creates a brand-new field, provisioning a B+tree boot item first
    /// when `indexed` (Field.go's `CreateField`).
    pub fn create(dm: &Arc<DataManager>, name: &str, kind: FieldType, indexed: bool) -> RsqlResult<Field> {
        let index_boot_uid = if indexed { Some(BPlusTree::create(dm.clone())?) } else { None };
        let raw = Self::encode(name, kind, index_boot_uid.unwrap_or(0));
        let wrapped = entry::wrap(SUPER_XID, &raw);
        let uid = dm.insert(SUPER_XID, &wrapped)?;
        Ok(Field { uid, name: name.to_string(), kind, index_boot_uid })
    }

    pub fn load(dm: &Arc<DataManager>, uid: u64) -> RsqlResult<Field> {
        let item = dm.read(uid)?.ok_or(RsqlError::EntryNotFound)?;
        let payload = item.data()[16..].to_vec();
        dm.release(uid);
        let (name, kind, index_uid) = Self::decode(&payload)?;
        Ok(Field {
            uid,
            name,
            kind,
            index_boot_uid: if index_uid == 0 { None } else { Some(index_uid) },
        })
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn open_index(&self, dm: Arc<DataManager>) -> RsqlResult<BPlusTree> {
        let boot_uid = self.index_boot_uid.ok_or_else(|| RsqlError::FieldNotIndexed(self.name.clone()))?;
        BPlusTree::load(dm, boot_uid)
    }

    fn encode(name: &str, kind: FieldType, index_uid: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + name.len() + 1 + 8);
        out.extend_from_slice(&(name.len() as u16).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(kind.tag());
        write_u64_be(&mut out, index_uid);
        out
    }

    fn decode(raw: &[u8]) -> RsqlResult<(String, FieldType, u64)> {
        if raw.len() < 2 {
            return Err(RsqlError::InvalidValues);
        }
        let name_len = u16::from_be_bytes([raw[0], raw[1]]) as usize;
        let mut pos = 2;
        if raw.len() < pos + name_len + 1 + 8 {
            return Err(RsqlError::InvalidValues);
        }
        let name = String::from_utf8(raw[pos..pos + name_len].to_vec()).map_err(|_| RsqlError::InvalidValues)?;
        pos += name_len;
        let kind = FieldType::from_tag(raw[pos])?;
        pos += 1;
        let index_uid = read_u64_be(&raw[pos..pos + 8]);
        Ok((name, kind, index_uid))
    }
}
