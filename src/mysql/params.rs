use chrono::{Datelike, Timelike};
use mysql_async::{Params, Value};

use crate::types::SqlValue;

/// Convert bound parameters into positional driver parameters.
#[must_use]
pub fn convert_params(params: &[SqlValue]) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params.iter().map(Value::from).collect())
    }
}

impl From<&SqlValue> for Value {
    fn from(value: &SqlValue) -> Self {
        match value {
            SqlValue::Int(i) => Value::Int(*i),
            SqlValue::Float(f) => Value::Double(*f),
            SqlValue::Text(s) => Value::Bytes(s.as_bytes().to_vec()),
            SqlValue::Bool(b) => Value::Int(i64::from(*b)),
            SqlValue::Timestamp(ts) => match u16::try_from(ts.year()) {
                Ok(year) => Value::Date(
                    year,
                    // month, day and clock fields are always in u8 range
                    u8::try_from(ts.month()).unwrap_or_default(),
                    u8::try_from(ts.day()).unwrap_or_default(),
                    u8::try_from(ts.hour()).unwrap_or_default(),
                    u8::try_from(ts.minute()).unwrap_or_default(),
                    u8::try_from(ts.second()).unwrap_or_default(),
                    ts.nanosecond() / 1_000,
                ),
                Err(_) => Value::Bytes(ts.format("%Y-%m-%d %H:%M:%S").to_string().into_bytes()),
            },
            SqlValue::Blob(bytes) => Value::Bytes(bytes.clone()),
            SqlValue::Null => Value::NULL,
        }
    }
}
