//! In-memory row representation for extracted snapshot data.

use arrow::array::{
    Array, BooleanArray, Date32Array, Float32Array, Float64Array, Int8Array, Int16Array,
    Int32Array, Int64Array, LargeStringArray, StringArray, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray, TimestampSecondArray, UInt8Array,
    UInt16Array, UInt32Array,
};
use arrow::datatypes::{DataType, TimeUnit};

use crate::error::ExtractError;

/// A single cell value, typed loosely enough to cover the projections.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Read the value at `row` from an Arrow array.
    ///
    /// Timestamps and dates are carried as their raw integer representation;
    /// the warehouse columns for them are declared `BIGINT`.
    pub fn from_array(column: &str, array: &dyn Array, row: usize) -> Result<Self, ExtractError> {
        if array.is_null(row) {
            return Ok(Value::Null);
        }

        macro_rules! read {
            ($ty:ty, $variant:ident, $cast:ty) => {
                Ok(Value::$variant(
                    array
                        .as_any()
                        .downcast_ref::<$ty>()
                        .expect("type checked by match")
                        .value(row) as $cast,
                ))
            };
        }

        match array.data_type() {
            DataType::Boolean => Ok(Value::Bool(
                array
                    .as_any()
                    .downcast_ref::<BooleanArray>()
                    .expect("type checked by match")
                    .value(row),
            )),
            DataType::Int8 => read!(Int8Array, Int, i64),
            DataType::Int16 => read!(Int16Array, Int, i64),
            DataType::Int32 => read!(Int32Array, Int, i64),
            DataType::Int64 => read!(Int64Array, Int, i64),
            DataType::UInt8 => read!(UInt8Array, Int, i64),
            DataType::UInt16 => read!(UInt16Array, Int, i64),
            DataType::UInt32 => read!(UInt32Array, Int, i64),
            DataType::Float32 => read!(Float32Array, Float, f64),
            DataType::Float64 => read!(Float64Array, Float, f64),
            DataType::Date32 => read!(Date32Array, Int, i64),
            DataType::Timestamp(TimeUnit::Second, _) => read!(TimestampSecondArray, Int, i64),
            DataType::Timestamp(TimeUnit::Millisecond, _) => {
                read!(TimestampMillisecondArray, Int, i64)
            }
            DataType::Timestamp(TimeUnit::Microsecond, _) => {
                read!(TimestampMicrosecondArray, Int, i64)
            }
            DataType::Timestamp(TimeUnit::Nanosecond, _) => {
                read!(TimestampNanosecondArray, Int, i64)
            }
            DataType::Utf8 => Ok(Value::Text(
                array
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .expect("type checked by match")
                    .value(row)
                    .to_string(),
            )),
            DataType::LargeUtf8 => Ok(Value::Text(
                array
                    .as_any()
                    .downcast_ref::<LargeStringArray>()
                    .expect("type checked by match")
                    .value(row)
                    .to_string(),
            )),
            other => Err(ExtractError::UnsupportedType {
                column: column.to_string(),
                data_type: other.to_string(),
            }),
        }
    }

    /// Render the value as a composite-key fragment.
    ///
    /// Fragments are variant-tagged so a text value can never collide with
    /// a null or a number that renders to the same characters.
    pub fn key_fragment(&self) -> String {
        match self {
            Value::Null => "n:".to_string(),
            Value::Bool(b) => format!("b:{b}"),
            Value::Int(i) => format!("i:{i}"),
            Value::Float(f) => format!("f:{f}"),
            Value::Text(s) => format!("t:{s}"),
        }
    }
}

/// Projected rows for one logical table from one snapshot.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    /// Column names in projection order.
    pub columns: Vec<String>,
    /// Row values, one inner vector per row, in column order.
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}
