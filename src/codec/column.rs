//! Column definitions
//!
//! Fixed-width encoding and validity predicates for a single column.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, TallyError};

use super::Value;

/// Primitive kinds a column may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Long,
    Int,
    Double,
    Byte,
    Text,
}

impl ColumnType {
    fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ColumnType::Long, Value::Long(_))
                | (ColumnType::Int, Value::Int(_))
                | (ColumnType::Double, Value::Double(_))
                | (ColumnType::Byte, Value::Byte(_))
                | (ColumnType::Text, Value::Text(_))
        )
    }
}

/// A validity predicate applied before serialization
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Value may not be null
    NonNull,
    /// Numeric value must be >= 0
    NonNegative,
    /// Numeric value must be > 0
    Positive,
    /// Ordinal must be below the number of enum variants
    EnumOrdinal { variants: u8 },
    /// Text may hold at most this many characters
    MaxLength(usize),
}

/// Definition of one table column
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    name: String,
    kind: ColumnType,
    constraints: Vec<Constraint>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
            constraints: Vec::new(),
        }
    }

    /// Add a constraint to this column
    pub fn with(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn non_null(self) -> Self {
        self.with(Constraint::NonNull)
    }

    pub fn non_negative(self) -> Self {
        self.with(Constraint::NonNegative)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnType {
        self.kind
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Check a value against the column type and every constraint.
    ///
    /// Null passes every predicate except `NonNull`.
    pub fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            if self.constraints.contains(&Constraint::NonNull) {
                return Err(self.violation("must not be null"));
            }
            return Ok(());
        }

        if !self.kind.accepts(value) {
            return Err(self.violation(&format!(
                "expected {:?}, got {:?}",
                self.kind, value
            )));
        }

        for constraint in &self.constraints {
            let ok = match constraint {
                Constraint::NonNull => true,
                Constraint::NonNegative => value.as_f64().map_or(true, |v| v >= 0.0),
                Constraint::Positive => value.as_f64().map_or(true, |v| v > 0.0),
                Constraint::EnumOrdinal { variants } => value
                    .as_i64()
                    .map_or(true, |v| v >= 0 && v < i64::from(*variants)),
                Constraint::MaxLength(max) => {
                    value.as_str().map_or(true, |s| s.chars().count() <= *max)
                }
            };
            if !ok {
                return Err(self.violation(&format!("{:?} violated by {:?}", constraint, value)));
            }
        }

        Ok(())
    }

    /// Append the encoded value to `buf`.
    ///
    /// Null has no encoding; the record serializer carries it in the bitmap.
    pub fn serialize(&self, value: &Value, buf: &mut BytesMut) -> Result<()> {
        self.validate(value)?;

        match value {
            Value::Null => return Err(self.violation("null has no column encoding")),
            Value::Long(v) => buf.put_i64(*v),
            Value::Int(v) => buf.put_i32(*v),
            Value::Double(v) => buf.put_f64(*v),
            Value::Byte(v) => buf.put_u8(*v),
            Value::Text(s) => {
                let len = u32::try_from(s.len())
                    .map_err(|_| self.violation("text longer than u32::MAX bytes"))?;
                buf.put_u32(len);
                buf.put_slice(s.as_bytes());
            }
        }

        Ok(())
    }

    /// Read one non-null value of this column's type from `buf`
    pub fn deserialize(&self, buf: &mut impl Buf) -> Result<Value> {
        let value = match self.kind {
            ColumnType::Long => {
                self.ensure(buf, 8)?;
                Value::Long(buf.get_i64())
            }
            ColumnType::Int => {
                self.ensure(buf, 4)?;
                Value::Int(buf.get_i32())
            }
            ColumnType::Double => {
                self.ensure(buf, 8)?;
                Value::Double(buf.get_f64())
            }
            ColumnType::Byte => {
                self.ensure(buf, 1)?;
                Value::Byte(buf.get_u8())
            }
            ColumnType::Text => {
                self.ensure(buf, 4)?;
                let len = buf.get_u32() as usize;
                self.ensure(buf, len)?;
                let bytes = buf.copy_to_bytes(len);
                let text = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    TallyError::Serialization(format!("column {}: {}", self.name, e))
                })?;
                Value::Text(text)
            }
        };

        Ok(value)
    }

    fn ensure(&self, buf: &impl Buf, needed: usize) -> Result<()> {
        if buf.remaining() < needed {
            return Err(TallyError::Serialization(format!(
                "column {}: need {} bytes, {} remaining",
                self.name,
                needed,
                buf.remaining()
            )));
        }
        Ok(())
    }

    fn violation(&self, detail: &str) -> TallyError {
        TallyError::InvalidArgument(format!("column {}: {}", self.name, detail))
    }
}
