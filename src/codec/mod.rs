//! Record Codec Module
//!
//! Typed column definitions and null-bitmap record framing.
//!
//! ## Responsibilities
//! - Define the value model shared by every table
//! - Validate values against per-column constraints
//! - Encode/decode records to the on-disk partition format
//!
//! ## Record Format
//! ```text
//! ┌──────────────────┬────────────┬────────────┬─────┐
//! │ Null bitmap      │ Column a   │ Column c   │ ... │
//! │ (u8 or u32, BE)  │ (non-null) │ (non-null) │     │
//! └──────────────────┴────────────┴────────────┴─────┘
//! ```
//! Bit `i` of the bitmap is set when column `i` is null; null columns
//! contribute no bytes. The format carries no version tag, so the column
//! list and bitmap width must match between writer and reader.

mod column;
mod record;

use std::cmp::Ordering;

pub use column::{ColumnInfo, ColumnType, Constraint};
pub use record::{BitmapWidth, RecordSerializer};

/// A single record: one value per declared column
pub type Record = Vec<Value>;

/// A dynamically typed column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Column is unset
    Null,
    /// 64-bit signed integer
    Long(i64),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit float
    Double(f64),
    /// Single byte, also used for enum ordinals
    Byte(u8),
    /// UTF-8 string
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the value (Long, Int and Byte)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Byte(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Total order used for clustering.
    ///
    /// Null sorts first, then numbers, then text. Numbers compare by exact
    /// value whatever their width, so integers beyond 2^53 stay ordered
    /// against doubles. `-0.0` equals `0.0`; NaN sorts at the end matching
    /// its sign.
    pub fn key_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => {
                unsigned_zero(*a).total_cmp(&unsigned_zero(*b))
            }
            (Value::Double(a), b) if b.rank() == 1 => {
                int_float_cmp(b.as_i64().unwrap_or_default(), *a).reverse()
            }
            (a, Value::Double(b)) if a.rank() == 1 => {
                int_float_cmp(a.as_i64().unwrap_or_default(), *b)
            }
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => a.rank().cmp(&b.rank()),
            },
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Text(_) => 2,
            _ => 1,
        }
    }
}

fn unsigned_zero(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

/// Exact comparison of an integer with a double
fn int_float_cmp(int: i64, float: f64) -> Ordering {
    // 2^63, the first double above i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if float.is_nan() {
        return if float.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if float >= LIMIT {
        return Ordering::Less;
    }
    if float < -LIMIT {
        return Ordering::Greater;
    }

    let whole = float.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal if float > whole => Ordering::Less,
        Ordering::Equal if float < whole => Ordering::Greater,
        ordering => ordering,
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Byte(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
