use chrono::{NaiveDateTime, NaiveTime};
use serde_json::{Map, Number, Value as JsonValue};

use crate::error::MysqlPluginError;
use crate::types::SqlValue;

/// One result row: column name to normalized value, in column order.
pub type Row = Map<String, JsonValue>;

/// Forward-only cursor over a result set.
///
/// The scanner drives it the same way for every backend: read the column names once,
/// then `advance`/`scan` until exhausted, then check `finish` for a deferred error.
pub trait RowCursor {
    /// Column names of the result set.
    ///
    /// # Errors
    /// Returns `MysqlPluginError` if column metadata is unavailable.
    fn columns(&self) -> Result<Vec<String>, MysqlPluginError>;

    /// Move to the next row. Returns `false` once the cursor is exhausted.
    fn advance(&mut self) -> bool;

    /// Values of the current row, one per column.
    ///
    /// # Errors
    /// Returns `MysqlPluginError` if the row cannot be decoded.
    fn scan(&mut self) -> Result<Vec<SqlValue>, MysqlPluginError>;

    /// Terminal error check after iteration ends.
    ///
    /// # Errors
    /// Returns the error that stopped iteration, if any.
    fn finish(&mut self) -> Result<(), MysqlPluginError>;
}

/// Drain a cursor into rows, normalizing every value.
///
/// Any error aborts the whole read; rows collected so far are dropped.
///
/// # Errors
/// Returns `MysqlPluginError::ScanError` (with context) for metadata, per-row or
/// terminal cursor failures.
pub fn scan_rows<C: RowCursor + ?Sized>(cursor: &mut C) -> Result<Vec<Row>, MysqlPluginError> {
    let columns = cursor
        .columns()
        .map_err(|e| scan_failure("failed to get columns", e))?;

    let mut results = Vec::new();
    while cursor.advance() {
        let values = cursor
            .scan()
            .map_err(|e| scan_failure("failed to scan row", e))?;
        if values.len() != columns.len() {
            return Err(MysqlPluginError::ScanError(format!(
                "failed to scan row: expected {} columns, got {}",
                columns.len(),
                values.len()
            )));
        }

        let mut row = Row::with_capacity(columns.len());
        for (name, value) in columns.iter().zip(values) {
            row.insert(name.clone(), normalize_value(value));
        }
        results.push(row);
    }

    cursor
        .finish()
        .map_err(|e| scan_failure("error iterating rows", e))?;
    Ok(results)
}

fn scan_failure(context: &str, err: MysqlPluginError) -> MysqlPluginError {
    match err {
        MysqlPluginError::ScanError(msg) => MysqlPluginError::ScanError(format!("{context}: {msg}")),
        other => MysqlPluginError::ScanError(format!("{context}: {other}")),
    }
}

/// Convert a scanned value into its canonical JSON form.
#[must_use]
pub fn normalize_value(value: SqlValue) -> JsonValue {
    match value {
        SqlValue::Int(i) => JsonValue::from(i),
        SqlValue::Float(f) => Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number),
        SqlValue::Text(s) => JsonValue::String(s),
        SqlValue::Bool(b) => JsonValue::Bool(b),
        SqlValue::Timestamp(ts) => JsonValue::String(format_timestamp(&ts)),
        SqlValue::Blob(bytes) => decode_blob(bytes),
        SqlValue::Null => JsonValue::Null,
    }
}

/// `YYYY-MM-DD` for values exactly at midnight, `YYYY-MM-DD HH:MM:SS` otherwise.
#[must_use]
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    if ts.time() == NaiveTime::MIN {
        ts.format("%Y-%m-%d").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

// Only structured JSON replaces the bytes; a VARCHAR holding "123" stays a string.
fn decode_blob(bytes: Vec<u8>) -> JsonValue {
    match serde_json::from_slice::<JsonValue>(&bytes) {
        Ok(decoded @ (JsonValue::Object(_) | JsonValue::Array(_))) => decoded,
        _ => match String::from_utf8(bytes) {
            Ok(text) => JsonValue::String(text),
            Err(e) => JsonValue::String(String::from_utf8_lossy(e.as_bytes()).into_owned()),
        },
    }
}

/// Read a text column.
pub(crate) fn column_str<'r>(row: &'r Row, column: &str) -> Option<&'r str> {
    row.get(column).and_then(JsonValue::as_str)
}

/// Read a column as an integer, accepting numbers or numeric text.
pub(crate) fn column_i64(row: &Row, column: &str) -> Option<i64> {
    match row.get(column)? {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    struct FakeRows {
        cols: Vec<String>,
        data: Vec<Vec<SqlValue>>,
        pos: usize,
        err: Option<String>,
    }

    impl FakeRows {
        fn new(cols: &[&str], data: Vec<Vec<SqlValue>>) -> Self {
            Self {
                cols: cols.iter().map(ToString::to_string).collect(),
                data,
                pos: 0,
                err: None,
            }
        }
    }

    impl RowCursor for FakeRows {
        fn columns(&self) -> Result<Vec<String>, MysqlPluginError> {
            Ok(self.cols.clone())
        }

        fn advance(&mut self) -> bool {
            if self.pos < self.data.len() {
                self.pos += 1;
                true
            } else {
                false
            }
        }

        fn scan(&mut self) -> Result<Vec<SqlValue>, MysqlPluginError> {
            Ok(self.data[self.pos - 1].clone())
        }

        fn finish(&mut self) -> Result<(), MysqlPluginError> {
            match &self.err {
                Some(msg) => Err(MysqlPluginError::ExecutionError(msg.clone())),
                None => Ok(()),
            }
        }
    }

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 7)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .unwrap()
    }

    #[test]
    fn scans_and_normalizes_values() {
        let mut rows = FakeRows::new(
            &["id", "name", "created_at", "born"],
            vec![vec![
                SqlValue::Int(1),
                SqlValue::Blob(b"Alice".to_vec()),
                SqlValue::Timestamp(ts(15, 30, 0)),
                SqlValue::Timestamp(ts(0, 0, 0)),
            ]],
        );
        let res = scan_rows(&mut rows).unwrap();
        assert_eq!(res.len(), 1);
        assert_eq!(res[0]["id"], json!(1));
        assert_eq!(res[0]["name"], json!("Alice"));
        assert_eq!(res[0]["created_at"], json!("2025-03-07 15:30:00"));
        assert_eq!(res[0]["born"], json!("2025-03-07"));
        let keys: Vec<&String> = res[0].keys().collect();
        assert_eq!(keys, ["id", "name", "created_at", "born"]);
    }

    #[test]
    fn one_second_past_midnight_keeps_time() {
        assert_eq!(format_timestamp(&ts(0, 0, 1)), "2025-03-07 00:00:01");
    }

    #[test]
    fn blobs_decode_structured_json_only() {
        assert_eq!(
            normalize_value(SqlValue::Blob(br#"{"a":[1,2]}"#.to_vec())),
            json!({"a": [1, 2]})
        );
        assert_eq!(normalize_value(SqlValue::Blob(b"[1]".to_vec())), json!([1]));
        assert_eq!(normalize_value(SqlValue::Blob(b"123".to_vec())), json!("123"));
        assert_eq!(normalize_value(SqlValue::Blob(b"{oops".to_vec())), json!("{oops"));
    }

    #[test]
    fn shape_mismatch_discards_everything() {
        let mut rows = FakeRows::new(
            &["a", "b"],
            vec![
                vec![SqlValue::Int(1), SqlValue::Int(2)],
                vec![SqlValue::Int(3)],
            ],
        );
        let err = scan_rows(&mut rows).unwrap_err();
        assert!(matches!(err, MysqlPluginError::ScanError(_)));
    }

    #[test]
    fn terminal_error_aborts_read() {
        let mut rows = FakeRows::new(&["a"], vec![vec![SqlValue::Int(1)]]);
        rows.err = Some("connection lost".into());
        let err = scan_rows(&mut rows).unwrap_err();
        assert!(err.to_string().contains("error iterating rows: "));
        assert!(err.to_string().contains("connection lost"));
    }
}
