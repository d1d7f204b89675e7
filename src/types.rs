use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

/// Values exchanged with the database, both as bound parameters and as scanned
/// column values.
///
/// This is the closed set the row scanner has to handle; every backend converts its
/// native value type into one of these variants:
/// ```rust
/// use mysql_rest_plugin::prelude::*;
///
/// let params = vec![
///     SqlValue::Int(1),
///     SqlValue::Text("alice".into()),
///     SqlValue::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Date or datetime value
    Timestamp(NaiveDateTime),
    /// Opaque bytes (MySQL also reports character data this way)
    Blob(Vec<u8>),
    /// NULL value
    Null,
}

impl SqlValue {
    /// Convert a caller-supplied JSON value into a bindable parameter.
    ///
    /// Objects and arrays are bound as their JSON text. Unsigned integers that do
    /// not fit into `i64` are bound as decimal text and left for MySQL to coerce.
    #[must_use]
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => SqlValue::Null,
            JsonValue::Bool(b) => SqlValue::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else if n.is_u64() {
                    SqlValue::Text(n.to_string())
                } else {
                    n.as_f64().map_or(SqlValue::Null, SqlValue::Float)
                }
            }
            JsonValue::String(s) => SqlValue::Text(s.clone()),
            JsonValue::Array(_) | JsonValue::Object(_) => SqlValue::Text(value.to_string()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

/// Generic type vocabulary exposed in schema output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericType {
    Integer,
    Number,
    String,
}

impl GenericType {
    /// Map a native MySQL column or parameter type name to the generic vocabulary.
    ///
    /// Display widths and modifiers are ignored (`int(11) unsigned` is an integer).
    /// Binary, temporal and every unknown type collapse to `string`.
    #[must_use]
    pub fn from_native(type_name: &str) -> Self {
        let base = type_name
            .trim()
            .split(|c: char| !c.is_ascii_alphabetic())
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match base.as_str() {
            "int" | "integer" | "tinyint" | "smallint" | "mediumint" | "bigint" | "bit"
            | "year" => GenericType::Integer,
            "float" | "double" | "real" | "decimal" | "numeric" | "dec" | "fixed" => {
                GenericType::Number
            }
            _ => GenericType::String,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            GenericType::Integer => "integer",
            GenericType::Number => "number",
            GenericType::String => "string",
        }
    }
}
