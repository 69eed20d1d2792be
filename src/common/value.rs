//! Row-value type shared by the catalog, executor, and B+tree index.
//!
//! A column's type is fixed at `CREATE TABLE` time to one of `FieldType`'s
//! variants; `Value` is the tagged sum of the values that type can hold.
//! Each variant owns its own `encode`/`decode`/`compare` so the executor
//! never inspects a value's type at query time beyond matching on the
//! `FieldType` recorded in the catalog.

use crate::common::bytes::{hash_string_key, read_i64_be};
use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;
use std::cmp::Ordering;

/// The type recorded for a column in the catalog (`Field.kind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int32,
    Int64,
    Str,
}

impl FieldType {
    pub fn tag(self) -> u8 {
        match self {
            FieldType::Int32 => 0,
            FieldType::Int64 => 1,
            FieldType::Str => 2,
        }
    }

    pub fn from_tag(tag: u8) -> RsqlResult<FieldType> {
        match tag {
            0 => Ok(FieldType::Int32),
            1 => Ok(FieldType::Int64),
            2 => Ok(FieldType::Str),
            _ => Err(RsqlError::InvalidFieldType),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::Str => "string",
        }
    }

    pub fn from_name(name: &str) -> RsqlResult<FieldType> {
        match name {
            "int32" => Ok(FieldType::Int32),
            "int64" => Ok(FieldType::Int64),
            "string" => Ok(FieldType::Str),
            _ => Err(RsqlError::InvalidFieldType),
        }
    }
}

/// A concrete row value. `Int32`/`Int64` are fixed-width; `Str` is prefixed
/// by its big-endian length in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Str(String),
}

impl Value {
    pub fn kind(&self) -> FieldType {
        match self {
            Value::Int32(_) => FieldType::Int32,
            Value::Int64(_) => FieldType::Int64,
            Value::Str(_) => FieldType::Str,
        }
    }

    /// Encodes the value's payload (no tag byte; the caller already knows
    /// the column's `FieldType` from the catalog).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Value::Int32(v) => v.to_be_bytes().to_vec(),
            Value::Int64(v) => v.to_be_bytes().to_vec(),
            Value::Str(s) => {
                let mut out = Vec::with_capacity(4 + s.len());
                out.extend_from_slice(&(s.len() as u32).to_be_bytes());
                out.extend_from_slice(s.as_bytes());
                out
            }
        }
    }

    /// Decodes a value of `kind` from `raw`, returning the value and the
    /// number of bytes consumed.
    pub fn decode(kind: FieldType, raw: &[u8]) -> RsqlResult<(Value, usize)> {
        match kind {
            FieldType::Int32 => {
                if raw.len() < 4 {
                    return Err(RsqlError::InvalidValues);
                }
                let mut b = [0u8; 4];
                b.copy_from_slice(&raw[..4]);
                Ok((Value::Int32(i32::from_be_bytes(b)), 4))
            }
            FieldType::Int64 => {
                if raw.len() < 8 {
                    return Err(RsqlError::InvalidValues);
                }
                Ok((Value::Int64(read_i64_be(raw)), 8))
            }
            FieldType::Str => {
                if raw.len() < 4 {
                    return Err(RsqlError::InvalidValues);
                }
                let mut b = [0u8; 4];
                b.copy_from_slice(&raw[..4]);
                let len = u32::from_be_bytes(b) as usize;
                if raw.len() < 4 + len {
                    return Err(RsqlError::InvalidValues);
                }
                let s = String::from_utf8(raw[4..4 + len].to_vec())
                    .map_err(|_| RsqlError::InvalidValues)?;
                Ok((Value::Str(s), 4 + len))
            }
        }
    }

    /// Parses a value from its textual form in a SQL statement, per the
    /// column's declared type.
    pub fn parse(kind: FieldType, text: &str) -> RsqlResult<Value> {
        match kind {
            FieldType::Int32 => text
                .parse::<i32>()
                .map(Value::Int32)
                .map_err(|_| RsqlError::InvalidValues),
            FieldType::Int64 => text
                .parse::<i64>()
                .map(Value::Int64)
                .map_err(|_| RsqlError::InvalidValues),
            FieldType::Str => Ok(Value::Str(text.to_string())),
        }
    }

    pub fn to_display(&self) -> String {
        match self {
            Value::Int32(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::Str(s) => s.clone(),
        }
    }

    /// Maps the value onto the `i64` key space the B+tree indexes over.
    /// Integers map directly; strings go through a rolling hash, matching
    /// the B+tree's routing-key convention (collisions are resolved by
    /// its in-page comparison during lookup, not by this mapping
    /// being injective).
    pub fn to_index_key(&self) -> i64 {
        match self {
            Value::Int32(v) => *v as i64,
            Value::Int64(v) => *v,
            Value::Str(s) => hash_string_key(s),
        }
    }

    pub fn compare(&self, other: &Value) -> RsqlResult<Ordering> {
        match (self, other) {
            (Value::Int32(a), Value::Int32(b)) => Ok(a.cmp(b)),
            (Value::Int64(a), Value::Int64(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            _ => Err(RsqlError::InvalidValues),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int32_roundtrip() {
        let v = Value::Int32(-42);
        let raw = v.encode();
        let (decoded, used) = Value::decode(FieldType::Int32, &raw).unwrap();
        assert_eq!(decoded, v);
        assert_eq!(used, 4);
    }

    #[test]
    fn int64_roundtrip() {
        let v = Value::Int64(i64::MIN);
        let raw = v.encode();
        let (decoded, used) = Value::decode(FieldType::Int64, &raw).unwrap();
        assert_eq!(decoded, v);
        assert_eq!(used, 8);
    }

    #[test]
    fn str_roundtrip() {
        let v = Value::Str("hello rsql".to_string());
        let raw = v.encode();
        let (decoded, used) = Value::decode(FieldType::Str, &raw).unwrap();
        assert_eq!(decoded, v);
        assert_eq!(used, raw.len());
    }

    #[test]
    fn str_roundtrip_with_trailing_bytes() {
        let mut raw = Value::Str("a".to_string()).encode();
        raw.extend_from_slice(&[0xFF, 0xFF]);
        let (decoded, used) = Value::decode(FieldType::Str, &raw).unwrap();
        assert_eq!(decoded, Value::Str("a".to_string()));
        assert_eq!(used, 5);
    }

    #[test]
    fn compare_mismatched_types_errs() {
        let a = Value::Int32(1);
        let b = Value::Int64(1);
        assert!(a.compare(&b).is_err());
    }

    #[test]
    fn parse_from_field_type() {
        assert_eq!(Value::parse(FieldType::Int32, "7").unwrap(), Value::Int32(7));
        assert_eq!(
            Value::parse(FieldType::Str, "x").unwrap(),
            Value::Str("x".to_string())
        );
        assert!(Value::parse(FieldType::Int32, "not a number").is_err());
    }

    #[test]
    fn field_type_name_roundtrip() {
        for ft in [FieldType::Int32, FieldType::Int64, FieldType::Str] {
            assert_eq!(FieldType::from_name(ft.name()).unwrap(), ft);
        }
    }
}
