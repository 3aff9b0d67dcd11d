//! Record serializer
//!
//! Null-bitmap framing over an ordered list of columns.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, TallyError};

use super::{ColumnInfo, Record, Value};

/// Width of the null bitmap written in front of every record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapWidth {
    /// One byte, up to 8 columns
    Byte,
    /// One big-endian u32, up to 32 columns
    Word,
}

impl BitmapWidth {
    /// Max number of columns this width can describe
    pub fn capacity(self) -> usize {
        match self {
            BitmapWidth::Byte => 8,
            BitmapWidth::Word => 32,
        }
    }

    /// Encoded size of the bitmap in bytes
    pub fn size(self) -> usize {
        match self {
            BitmapWidth::Byte => 1,
            BitmapWidth::Word => 4,
        }
    }

    /// Narrowest width able to describe `columns` columns
    pub fn for_columns(columns: usize) -> Result<Self> {
        if columns <= BitmapWidth::Byte.capacity() {
            Ok(BitmapWidth::Byte)
        } else if columns <= BitmapWidth::Word.capacity() {
            Ok(BitmapWidth::Word)
        } else {
            Err(TallyError::InvalidArgument(format!(
                "{} columns exceed the 32-column bitmap",
                columns
            )))
        }
    }
}

/// Serializer for the records of one table
#[derive(Debug, Clone)]
pub struct RecordSerializer {
    columns: Vec<ColumnInfo>,
    width: BitmapWidth,
}

impl RecordSerializer {
    /// Create a serializer using the narrowest bitmap for the column count
    pub fn new(columns: Vec<ColumnInfo>) -> Result<Self> {
        let width = BitmapWidth::for_columns(columns.len())?;
        Ok(Self { columns, width })
    }

    /// Create a serializer with an explicit bitmap width
    pub fn with_width(columns: Vec<ColumnInfo>, width: BitmapWidth) -> Result<Self> {
        if columns.len() > width.capacity() {
            return Err(TallyError::InvalidArgument(format!(
                "{} columns do not fit a {:?} bitmap",
                columns.len(),
                width
            )));
        }
        Ok(Self { columns, width })
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn width(&self) -> BitmapWidth {
        self.width
    }

    /// Number of columns per record
    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    /// Check arity and every column predicate
    pub fn validate(&self, record: &Record) -> Result<()> {
        if record.len() != self.columns.len() {
            return Err(TallyError::InvalidArgument(format!(
                "record has {} values, table has {} columns",
                record.len(),
                self.columns.len()
            )));
        }
        for (column, value) in self.columns.iter().zip(record) {
            column.validate(value)?;
        }
        Ok(())
    }

    /// Append one framed record to `buf`.
    ///
    /// The record is validated in full before any byte is written.
    pub fn serialize(&self, record: &Record, buf: &mut BytesMut) -> Result<()> {
        self.validate(record)?;

        let mut bitmap: u32 = 0;
        for (i, value) in record.iter().enumerate() {
            if value.is_null() {
                bitmap |= 1 << i;
            }
        }

        match self.width {
            BitmapWidth::Byte => buf.put_u8(bitmap as u8),
            BitmapWidth::Word => buf.put_u32(bitmap),
        }

        for (column, value) in self.columns.iter().zip(record) {
            if !value.is_null() {
                column.serialize(value, buf)?;
            }
        }

        Ok(())
    }

    /// Read one framed record from `buf`
    pub fn deserialize(&self, buf: &mut impl Buf) -> Result<Record> {
        if buf.remaining() < self.width.size() {
            return Err(TallyError::Serialization(format!(
                "truncated null bitmap: {} bytes remaining",
                buf.remaining()
            )));
        }

        let bitmap = match self.width {
            BitmapWidth::Byte => u32::from(buf.get_u8()),
            BitmapWidth::Word => buf.get_u32(),
        };

        let unused_bits = if self.columns.len() >= 32 {
            0
        } else {
            !0u32 << self.columns.len()
        };
        if bitmap & unused_bits != 0 {
            return Err(TallyError::Serialization(format!(
                "null bitmap {:#x} marks columns beyond arity {}",
                bitmap,
                self.columns.len()
            )));
        }

        let mut record = vec![Value::Null; self.columns.len()];
        for (i, column) in self.columns.iter().enumerate() {
            if bitmap & (1 << i) == 0 {
                record[i] = column.deserialize(buf)?;
            }
        }

        Ok(record)
    }

    /// Encode a sequence of records back to back
    pub fn encode_all(&self, records: &[Record]) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        for record in records {
            self.serialize(record, &mut buf)?;
        }
        Ok(buf.freeze())
    }

    /// Decode every record in `bytes`
    pub fn decode_all(&self, mut bytes: Bytes) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        while bytes.has_remaining() {
            records.push(self.deserialize(&mut bytes)?);
        }
        Ok(records)
    }
}
