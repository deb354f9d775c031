//! # Column Definitions
//!
//! Immutable column descriptors pairing a [`DataType`] with its metadata:
//! the logical size (element count for vectors, 1 for scalars) and the
//! nullability flag. The descriptor owns validation: every value entering
//! a column passes [`ColumnDef::validate`] first, so the storage layer can
//! trust type and shape downstream.

use crate::error::DbError;
use crate::types::{DataType, Value};

/// Immutable column descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    name: String,
    data_type: DataType,
    size: usize,
    nullable: bool,
}

impl ColumnDef {
    /// Scalar column of the given type.
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            size: 1,
            nullable,
        }
    }

    /// Fixed-width vector column with `size` elements.
    pub fn vector(
        name: impl Into<String>,
        data_type: DataType,
        size: usize,
        nullable: bool,
    ) -> Self {
        debug_assert!(data_type.is_vector());
        Self {
            name: name.into(),
            data_type,
            size,
            nullable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Element count: vector dimension, or 1 for scalars.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    /// Renames the definition (projection aliases).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Rejects wrong-type, wrong-shape, and null-in-non-nullable values.
    pub fn validate(&self, value: &Value) -> Result<(), DbError> {
        match value {
            Value::Null => {
                if self.nullable {
                    Ok(())
                } else {
                    Err(DbError::NullInNonNullable {
                        column: self.name.clone(),
                    })
                }
            }
            v => {
                let actual = v.data_type().expect("non-null value has a type");
                if actual != self.data_type {
                    return Err(DbError::TypeMismatch {
                        column: self.name.clone(),
                        expected: self.data_type.type_name(),
                        actual: actual.type_name(),
                    });
                }
                if self.data_type.is_vector() && v.logical_size() != self.size {
                    return Err(DbError::ShapeMismatch {
                        expected: self.size,
                        actual: v.logical_size(),
                    });
                }
                Ok(())
            }
        }
    }

    /// Zero value of this column's type.
    pub fn default_value(&self) -> Value {
        match self.data_type {
            DataType::Bool => Value::Bool(false),
            DataType::Int1 => Value::Int1(0),
            DataType::Int2 => Value::Int2(0),
            DataType::Int4 => Value::Int4(0),
            DataType::Int8 => Value::Int8(0),
            DataType::Float4 => Value::Float4(0.0),
            DataType::Float8 => Value::Float8(0.0),
            DataType::Text => Value::Text(String::new()),
            DataType::BoolVector => Value::BoolVector(vec![false; self.size]),
            DataType::Int4Vector => Value::Int4Vector(vec![0; self.size]),
            DataType::Int8Vector => Value::Int8Vector(vec![0; self.size]),
            DataType::Float4Vector => Value::Float4Vector(vec![0.0; self.size]),
            DataType::Float8Vector => Value::Float8Vector(vec![0.0; self.size]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_validation() {
        let def = ColumnDef::new("id", DataType::Int8, false);
        def.validate(&Value::Int8(42)).unwrap();
        assert!(matches!(
            def.validate(&Value::Null),
            Err(DbError::NullInNonNullable { .. })
        ));
        assert!(matches!(
            def.validate(&Value::Int4(1)),
            Err(DbError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn nullable_accepts_null() {
        let def = ColumnDef::new("score", DataType::Float8, true);
        def.validate(&Value::Null).unwrap();
    }

    #[test]
    fn vector_shape_checked() {
        let def = ColumnDef::vector("vec", DataType::Float4Vector, 4, false);
        def.validate(&Value::Float4Vector(vec![0.0; 4])).unwrap();
        assert!(matches!(
            def.validate(&Value::Float4Vector(vec![0.0; 3])),
            Err(DbError::ShapeMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn defaults_match_definition() {
        let def = ColumnDef::vector("vec", DataType::Float8Vector, 3, false);
        let default = def.default_value();
        def.validate(&default).unwrap();
        assert_eq!(default, Value::Float8Vector(vec![0.0; 3]));
    }
}
