use chrono::NaiveDate;
use mysql_async::{Row as MysqlRow, Value};

use crate::error::MysqlPluginError;
use crate::results::RowCursor;
use crate::types::SqlValue;

/// Cursor over one fully received result set.
pub struct MysqlRows {
    columns: Vec<String>,
    rows: std::vec::IntoIter<MysqlRow>,
    current: Option<MysqlRow>,
}

impl MysqlRows {
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<MysqlRow>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
            current: None,
        }
    }
}

impl RowCursor for MysqlRows {
    fn columns(&self) -> Result<Vec<String>, MysqlPluginError> {
        Ok(self.columns.clone())
    }

    fn advance(&mut self) -> bool {
        self.current = self.rows.next();
        self.current.is_some()
    }

    fn scan(&mut self) -> Result<Vec<SqlValue>, MysqlPluginError> {
        let row = self
            .current
            .as_mut()
            .ok_or_else(|| MysqlPluginError::ScanError("no current row".into()))?;
        (0..row.len())
            .map(|i| {
                row.take::<Value, _>(i)
                    .map(mysql_extract_value)
                    .ok_or_else(|| MysqlPluginError::ScanError(format!("column {i} is unavailable")))
            })
            .collect()
    }

    fn finish(&mut self) -> Result<(), MysqlPluginError> {
        Ok(())
    }
}

/// Map a driver value onto the closed `SqlValue` set.
///
/// Character and binary data arrive as bytes and stay `Blob`; the scanner decides
/// between JSON and text. Zero dates and durations have no timestamp form and are
/// returned as their MySQL text.
#[must_use]
pub fn mysql_extract_value(value: Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Bytes(bytes) => SqlValue::Blob(bytes),
        Value::Int(i) => SqlValue::Int(i),
        Value::UInt(u) => i64::try_from(u).map_or_else(|_| SqlValue::Text(u.to_string()), SqlValue::Int),
        // Widen through the shortest decimal form so FLOAT 1.1 stays 1.1.
        Value::Float(f) => SqlValue::Float(f.to_string().parse().unwrap_or_else(|_| f64::from(f))),
        Value::Double(d) => SqlValue::Float(d),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                .and_then(|d| {
                    d.and_hms_micro_opt(
                        u32::from(hour),
                        u32::from(minute),
                        u32::from(second),
                        micros,
                    )
                })
                .map_or_else(
                    || {
                        SqlValue::Text(format!(
                            "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
                        ))
                    },
                    SqlValue::Timestamp,
                )
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if negative { "-" } else { "" };
            let total_hours = u64::from(days) * 24 + u64::from(hours);
            if micros == 0 {
                SqlValue::Text(format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}"))
            } else {
                SqlValue::Text(format!(
                    "{sign}{total_hours:02}:{minutes:02}:{seconds:02}.{micros:06}"
                ))
            }
        }
    }
}
