//! A table's schema record (spec.md §3.1, grounded on
//! `original_source/backend/tbm/Table.go`): `[name][next_uid:8][field_uid:8]*`,
//! threading the catalog's singly linked list. Row storage itself is
//! owned by the executor (see `execution::executor`); this module only
//! knows how to persist/load the schema and turn a WHERE clause into a
//! set of candidate row UIDs.

use crate::catalog::field::{CompareOp, Field};
use crate::common::bytes::read_u64_be;
use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;
use crate::common::value::{FieldType, Value};
use crate::dm::DataManager;
use crate::tss::SUPER_XID;
use crate::vm::entry;
use std::sync::Arc;

/// A single `field <op> value [AND field <op> value]` WHERE clause.
/// Matches Table.go's `parseWhere`/`calWhere`: both legs must name the
/// *same* field (an AND narrows one field's range; there is no
/// cross-field intersection in this dialect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhereClause {
    pub field: String,
    pub op1: CompareOp,
    pub value1: String,
    pub and_leg: Option<(CompareOp, String)>,
}

pub struct Table {
    uid: u64,
    name: String,
    next_uid: u64,
    fields: Vec<Field>,
}

impl Table {
    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn next_uid(&self) -> u64 {
        self.next_uid
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> RsqlResult<&Field> {
        self.fields
            .iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| RsqlError::FieldNotFound(name.to_string()))
    }

    fn first_indexed_field(&self) -> RsqlResult<&Field> {
        self.fields
            .iter()
            .find(|f| f.is_indexed())
            .ok_or_else(|| RsqlError::Other(format!("table {} has no indexed field", self.name)))
    }

    /// Creates a new table and persists it, chaining it onto the catalog
    /// linked list at `next_uid` (Table.go's `CreateTable`).
    pub fn create(
        dm: &Arc<DataManager>,
        next_uid: u64,
        name: &str,
        field_specs: &[(String, FieldType, bool)],
    ) -> RsqlResult<Table> {
        let mut fields = Vec::with_capacity(field_specs.len());
        for (fname, kind, indexed) in field_specs {
            fields.push(Field::create(dm, fname, *kind, *indexed)?);
        }
        let raw = Self::encode(name, next_uid, &fields);
        let wrapped = entry::wrap(SUPER_XID, &raw);
        let uid = dm.insert(SUPER_XID, &wrapped)?;
        Ok(Table { uid, name: name.to_string(), next_uid, fields })
    }

    pub fn load(dm: &Arc<DataManager>, uid: u64) -> RsqlResult<Table> {
        let item = dm.read(uid)?.ok_or(RsqlError::EntryNotFound)?;
        let payload = item.data()[16..].to_vec();
        dm.release(uid);

        if payload.len() < 2 {
            return Err(RsqlError::InvalidValues);
        }
        let name_len = u16::from_be_bytes([payload[0], payload[1]]) as usize;
        let mut pos = 2;
        if payload.len() < pos + name_len + 8 {
            return Err(RsqlError::InvalidValues);
        }
        let name = String::from_utf8(payload[pos..pos + name_len].to_vec()).map_err(|_| RsqlError::InvalidValues)?;
        pos += name_len;
        let next_uid = read_u64_be(&payload[pos..pos + 8]);
        pos += 8;

        let mut fields = Vec::new();
        while pos + 8 <= payload.len() {
            let field_uid = read_u64_be(&payload[pos..pos + 8]);
            pos += 8;
            fields.push(Field::load(dm, field_uid)?);
        }

        Ok(Table { uid, name, next_uid, fields })
    }

    /// Rewrites this table's stored `next_uid` pointer in place, keeping the
    /// entry's `xmin`/`xmax` header untouched (Catalog::drop_table unlinking
    /// a neighbour from the chain).
    pub fn relink_next(&self, dm: &Arc<DataManager>, new_next_uid: u64) -> RsqlResult<()> {
        let item = dm.read(self.uid)?.ok_or(RsqlError::EntryNotFound)?;
        let mut raw = item.data();
        raw[16..].copy_from_slice(&Self::encode(&self.name, new_next_uid, &self.fields));
        let result = dm.update(SUPER_XID, &item, &raw);
        dm.release(self.uid);
        result
    }

    fn encode(name: &str, next_uid: u64, fields: &[Field]) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + name.len() + 8 + fields.len() * 8);
        out.extend_from_slice(&(name.len() as u16).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&next_uid.to_be_bytes());
        for f in fields {
            out.extend_from_slice(&f.uid().to_be_bytes());
        }
        out
    }

    /// Encodes a row's values in schema field order.
    pub fn encode_row(&self, values: &[Value]) -> RsqlResult<Vec<u8>> {
        if values.len() != self.fields.len() {
            return Err(RsqlError::InvalidValues);
        }
        let mut out = Vec::new();
        for (field, value) in self.fields.iter().zip(values) {
            if value.kind() != field.kind() {
                return Err(RsqlError::InvalidValues);
            }
            out.extend_from_slice(&value.encode());
        }
        Ok(out)
    }

    pub fn decode_row(&self, raw: &[u8]) -> RsqlResult<Vec<Value>> {
        let mut pos = 0;
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let (value, used) = Value::decode(field.kind(), &raw[pos..])?;
            pos += used;
            values.push(value);
        }
        Ok(values)
    }

    /// Resolves a WHERE clause (or its absence) to a set of candidate row
    /// UIDs by consulting exactly one indexed field's B+tree
    /// (Table.go's `parseWhere`/`calWhere`).
    pub fn resolve_where(&self, dm: &Arc<DataManager>, where_clause: Option<&WhereClause>) -> RsqlResult<Vec<u64>> {
        let (field, left, right) = match where_clause {
            None => {
                let field = self.first_indexed_field()?;
                (field, i64::MIN, i64::MAX)
            }
            Some(w) => {
                let field = self.field(&w.field)?;
                if !field.is_indexed() {
                    return Err(RsqlError::FieldNotIndexed(w.field.clone()));
                }
                let v1 = Value::parse(field.kind(), &w.value1)?;
                let (mut l, mut r) = w.op1.range(v1.to_index_key());
                if let Some((op2, text2)) = &w.and_leg {
                    let v2 = Value::parse(field.kind(), text2)?;
                    let (l2, r2) = op2.range(v2.to_index_key());
                    l = l.max(l2);
                    r = r.min(r2);
                }
                (field, l, r)
            }
        };
        let tree = field.open_index(dm.clone())?;
        tree.search_range(left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_table(dir: &std::path::Path) -> (Arc<DataManager>, Table) {
        let dm = DataManager::create(dir.join("db"), 8192, 0).unwrap();
        let specs = vec![
            ("id".to_string(), FieldType::Int64, true),
            ("name".to_string(), FieldType::Str, false),
        ];
        let table = Table::create(&dm, 0, "people", &specs).unwrap();
        (dm, table)
    }

    #[test]
    fn create_then_reload_preserves_schema() {
        let dir = tempdir().unwrap();
        let (dm, table) = make_table(dir.path());
        let reloaded = Table::load(&dm, table.uid()).unwrap();
        assert_eq!(reloaded.name(), "people");
        assert_eq!(reloaded.fields().len(), 2);
        assert_eq!(reloaded.field("id").unwrap().kind(), FieldType::Int64);
        assert!(reloaded.field("id").unwrap().is_indexed());
        assert!(!reloaded.field("name").unwrap().is_indexed());
    }

    #[test]
    fn row_encode_decode_roundtrips() {
        let dir = tempdir().unwrap();
        let (_dm, table) = make_table(dir.path());
        let values = vec![Value::Int64(42), Value::Str("ada".to_string())];
        let raw = table.encode_row(&values).unwrap();
        assert_eq!(table.decode_row(&raw).unwrap(), values);
    }

    #[test]
    fn resolve_where_none_scans_first_indexed_field_in_full() {
        let dir = tempdir().unwrap();
        let (dm, table) = make_table(dir.path());
        let id_field = table.field("id").unwrap();
        let tree = id_field.open_index(dm.clone()).unwrap();
        tree.insert(1, 100).unwrap();
        tree.insert(2, 200).unwrap();

        let uids = table.resolve_where(&dm, None).unwrap();
        assert_eq!(uids, vec![100, 200]);
    }

    #[test]
    fn resolve_where_equality_narrows_to_one_row() {
        let dir = tempdir().unwrap();
        let (dm, table) = make_table(dir.path());
        let tree = table.field("id").unwrap().open_index(dm.clone()).unwrap();
        tree.insert(1, 100).unwrap();
        tree.insert(2, 200).unwrap();

        let where_clause = WhereClause { field: "id".to_string(), op1: CompareOp::Eq, value1: "2".to_string(), and_leg: None };
        let uids = table.resolve_where(&dm, Some(&where_clause)).unwrap();
        assert_eq!(uids, vec![200]);
    }

    #[test]
    fn resolve_where_and_leg_intersects_the_range() {
        let dir = tempdir().unwrap();
        let (dm, table) = make_table(dir.path());
        let tree = table.field("id").unwrap().open_index(dm.clone()).unwrap();
        for i in 0..10i64 {
            tree.insert(i, i as u64 * 10).unwrap();
        }
        let where_clause = WhereClause {
            field: "id".to_string(),
            op1: CompareOp::Gt,
            value1: "2".to_string(),
            and_leg: Some((CompareOp::Lt, "6".to_string())),
        };
        let uids = table.resolve_where(&dm, Some(&where_clause)).unwrap();
        assert_eq!(uids, vec![30, 40, 50]);
    }

    #[test]
    fn resolve_where_on_unindexed_field_errs() {
        let dir = tempdir().unwrap();
        let (dm, table) = make_table(dir.path());
        let where_clause = WhereClause { field: "name".to_string(), op1: CompareOp::Eq, value1: "ada".to_string(), and_leg: None };
        assert!(matches!(table.resolve_where(&dm, Some(&where_clause)), Err(RsqlError::FieldNotIndexed(_))));
    }
}
