//! # Runtime Value Representation
//!
//! `Value` is the owned runtime representation of a single cell. Variants
//! mirror the [`DataType`] tags; `Null` marks an absent cell in a nullable
//! column.
//!
//! ## Binary Codec
//!
//! Values serialize little-endian against their owning `ColumnDef`:
//! scalars as their fixed width, text as raw UTF-8 (the record frame
//! carries the length), vectors as `size` densely packed elements. The
//! decoder validates the payload length against the definition, so a
//! stored blob that disagrees with the column header surfaces as an error
//! rather than a silent misread.
//!
//! ## Numeric Promotion
//!
//! Aggregates combine in `f64`; `as_f64` promotes every numeric variant
//! and refuses the rest.

use crate::encoding::{ByteReader, ByteWriter};
use crate::error::DbError;
use crate::types::DataType;

/// Owned runtime value. `Null` is only valid where the column allows it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int1(i8),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Text(String),
    BoolVector(Vec<bool>),
    Int4Vector(Vec<i32>),
    Int8Vector(Vec<i64>),
    Float4Vector(Vec<f32>),
    Float8Vector(Vec<f64>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Data type tag of this value; None for `Null`.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(DataType::Bool),
            Value::Int1(_) => Some(DataType::Int1),
            Value::Int2(_) => Some(DataType::Int2),
            Value::Int4(_) => Some(DataType::Int4),
            Value::Int8(_) => Some(DataType::Int8),
            Value::Float4(_) => Some(DataType::Float4),
            Value::Float8(_) => Some(DataType::Float8),
            Value::Text(_) => Some(DataType::Text),
            Value::BoolVector(_) => Some(DataType::BoolVector),
            Value::Int4Vector(_) => Some(DataType::Int4Vector),
            Value::Int8Vector(_) => Some(DataType::Int8Vector),
            Value::Float4Vector(_) => Some(DataType::Float4Vector),
            Value::Float8Vector(_) => Some(DataType::Float8Vector),
        }
    }

    /// Element count: vector length, or 1 for scalars.
    pub fn logical_size(&self) -> usize {
        match self {
            Value::BoolVector(v) => v.len(),
            Value::Int4Vector(v) => v.len(),
            Value::Int8Vector(v) => v.len(),
            Value::Float4Vector(v) => v.len(),
            Value::Float8Vector(v) => v.len(),
            _ => 1,
        }
    }

    /// Promotes a numeric scalar to `f64` for aggregate combination.
    pub fn as_f64(&self) -> Result<f64, DbError> {
        match self {
            Value::Int1(v) => Ok(*v as f64),
            Value::Int2(v) => Ok(*v as f64),
            Value::Int4(v) => Ok(*v as f64),
            Value::Int8(v) => Ok(*v as f64),
            Value::Float4(v) => Ok(*v as f64),
            Value::Float8(v) => Ok(*v),
            other => Err(DbError::TypeMismatch {
                column: String::new(),
                expected: "numeric scalar",
                actual: other
                    .data_type()
                    .map(|t| t.type_name())
                    .unwrap_or("null"),
            }),
        }
    }

    /// Encodes this value little-endian. `Null` never reaches the store
    /// (absence is a missing record), so encoding it is a caller bug.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        match self {
            Value::Null => unreachable!("null values are not materialized"),
            Value::Bool(v) => w.put_u8(*v as u8),
            Value::Int1(v) => w.put_u8(*v as u8),
            Value::Int2(v) => w.put_bytes(&v.to_le_bytes()),
            Value::Int4(v) => w.put_bytes(&v.to_le_bytes()),
            Value::Int8(v) => w.put_i64(*v),
            Value::Float4(v) => w.put_f32(*v),
            Value::Float8(v) => w.put_f64(*v),
            Value::Text(s) => w.put_bytes(s.as_bytes()),
            Value::BoolVector(v) => {
                for b in v {
                    w.put_u8(*b as u8);
                }
            }
            Value::Int4Vector(v) => {
                for x in v {
                    w.put_bytes(&x.to_le_bytes());
                }
            }
            Value::Int8Vector(v) => {
                for x in v {
                    w.put_i64(*x);
                }
            }
            Value::Float4Vector(v) => {
                for x in v {
                    w.put_f32(*x);
                }
            }
            Value::Float8Vector(v) => {
                for x in v {
                    w.put_f64(*x);
                }
            }
        }
        w.into_vec()
    }

    /// Decodes a stored payload for a column of the given type and size.
    pub fn decode(bytes: &[u8], data_type: DataType, size: usize) -> eyre::Result<Value> {
        if let Some(elem) = data_type.element_size() {
            let expected = elem * if data_type.is_vector() { size } else { 1 };
            eyre::ensure!(
                bytes.len() == expected,
                "payload length {} does not match {} x {} for {}",
                bytes.len(),
                elem,
                if data_type.is_vector() { size } else { 1 },
                data_type.type_name()
            );
        }
        let mut r = ByteReader::new(bytes);
        let value = match data_type {
            DataType::Bool => Value::Bool(r.get_u8()? != 0),
            DataType::Int1 => Value::Int1(r.get_u8()? as i8),
            DataType::Int2 => {
                let b = r.get_bytes(2)?;
                Value::Int2(i16::from_le_bytes([b[0], b[1]]))
            }
            DataType::Int4 => {
                let b = r.get_bytes(4)?;
                Value::Int4(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            DataType::Int8 => Value::Int8(r.get_i64()?),
            DataType::Float4 => Value::Float4(r.get_f32()?),
            DataType::Float8 => Value::Float8(r.get_f64()?),
            DataType::Text => Value::Text(
                std::str::from_utf8(bytes)
                    .map_err(|e| eyre::eyre!("invalid UTF-8 in text payload: {}", e))?
                    .to_string(),
            ),
            DataType::BoolVector => {
                let mut v = Vec::with_capacity(size);
                for _ in 0..size {
                    v.push(r.get_u8()? != 0);
                }
                Value::BoolVector(v)
            }
            DataType::Int4Vector => {
                let mut v = Vec::with_capacity(size);
                for _ in 0..size {
                    let b = r.get_bytes(4)?;
                    v.push(i32::from_le_bytes([b[0], b[1], b[2], b[3]]));
                }
                Value::Int4Vector(v)
            }
            DataType::Int8Vector => {
                let mut v = Vec::with_capacity(size);
                for _ in 0..size {
                    v.push(r.get_i64()?);
                }
                Value::Int8Vector(v)
            }
            DataType::Float4Vector => {
                let mut v = Vec::with_capacity(size);
                for _ in 0..size {
                    v.push(r.get_f32()?);
                }
                Value::Float4Vector(v)
            }
            DataType::Float8Vector => {
                let mut v = Vec::with_capacity(size);
                for _ in 0..size {
                    v.push(r.get_f64()?);
                }
                Value::Float8Vector(v)
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_codec_roundtrip() {
        let cases = [
            (Value::Bool(true), DataType::Bool),
            (Value::Int1(-5), DataType::Int1),
            (Value::Int2(-300), DataType::Int2),
            (Value::Int4(1 << 20), DataType::Int4),
            (Value::Int8(-(1 << 40)), DataType::Int8),
            (Value::Float4(1.5), DataType::Float4),
            (Value::Float8(-2.25), DataType::Float8),
            (Value::Text("héllo".into()), DataType::Text),
        ];
        for (value, dt) in cases {
            let bytes = value.encode();
            let decoded = Value::decode(&bytes, dt, 1).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn vector_codec_roundtrip() {
        let v = Value::Float4Vector(vec![1.0, 0.0, -0.5, 3.25]);
        let bytes = v.encode();
        assert_eq!(bytes.len(), 16);
        assert_eq!(Value::decode(&bytes, DataType::Float4Vector, 4).unwrap(), v);

        let v = Value::Int8Vector(vec![7, -7]);
        let bytes = v.encode();
        assert_eq!(Value::decode(&bytes, DataType::Int8Vector, 2).unwrap(), v);
    }

    #[test]
    fn length_mismatch_rejected() {
        let bytes = Value::Float4Vector(vec![1.0, 2.0]).encode();
        assert!(Value::decode(&bytes, DataType::Float4Vector, 4).is_err());
    }

    #[test]
    fn numeric_promotion() {
        assert_eq!(Value::Int2(3).as_f64().unwrap(), 3.0);
        assert_eq!(Value::Float4(0.5).as_f64().unwrap(), 0.5);
        assert!(Value::Text("x".into()).as_f64().is_err());
        assert!(Value::Null.as_f64().is_err());
    }
}
