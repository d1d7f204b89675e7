//! Schema introspection: tables and views of the active schema as JSON-schema-like
//! object descriptors, plus the routine catalog as input/output descriptor pairs.

use serde_json::{Map, Value as JsonValue, json};

use crate::cache::CACHE_TABLE;
use crate::catalog::{RoutineCatalog, RoutineInfo};
use crate::error::MysqlPluginError;
use crate::executor::Session;
use crate::results::{Row, column_str, scan_rows};
use crate::types::{GenericType, SqlValue};

/// Base tables and views of the active schema.
pub const TABLES_QUERY: &str = "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
WHERE TABLE_SCHEMA = DATABASE() ORDER BY TABLE_NAME";

/// Columns of one relation, in declaration order.
pub const COLUMNS_QUERY: &str = "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE, COLUMN_DEFAULT, COLUMN_KEY \
FROM INFORMATION_SCHEMA.COLUMNS \
WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION";

/// One column as reported by `INFORMATION_SCHEMA.COLUMNS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub key: String,
}

impl ColumnInfo {
    /// # Errors
    /// Returns `MysqlPluginError::ScanError` if the row has no column name.
    pub fn from_row(row: &Row) -> Result<Self, MysqlPluginError> {
        let name = column_str(row, "COLUMN_NAME")
            .ok_or_else(|| MysqlPluginError::ScanError("column row without COLUMN_NAME".into()))?;
        let default = match row.get("COLUMN_DEFAULT") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };
        Ok(Self {
            name: name.to_string(),
            data_type: column_str(row, "DATA_TYPE").unwrap_or_default().to_string(),
            nullable: column_str(row, "IS_NULLABLE").is_some_and(|v| v.eq_ignore_ascii_case("YES")),
            default,
            key: column_str(row, "COLUMN_KEY").unwrap_or_default().to_string(),
        })
    }

    #[must_use]
    pub fn is_primary_key(&self) -> bool {
        self.key.eq_ignore_ascii_case("PRI")
    }

    /// Callers must supply a value: not nullable, no default, not a primary key.
    #[must_use]
    pub fn is_required(&self) -> bool {
        !self.nullable && self.default.is_none() && !self.is_primary_key()
    }
}

/// Descriptor for one table or view.
#[must_use]
pub fn table_schema(columns: &[ColumnInfo]) -> JsonValue {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for column in columns {
        let mut property = Map::new();
        property.insert(
            "type".into(),
            json!(GenericType::from_native(&column.data_type).as_str()),
        );
        if column.nullable {
            property.insert("x-nullable".into(), JsonValue::Bool(true));
        }
        if column.is_primary_key() {
            property.insert("readOnly".into(), JsonValue::Bool(true));
        }
        if column.is_required() {
            required.push(JsonValue::String(column.name.clone()));
        }
        properties.insert(column.name.clone(), JsonValue::Object(property));
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// `[inputSchema, outputSchema]` for one routine. Procedures have an empty output
/// schema.
#[must_use]
pub fn routine_schema(routine: &RoutineInfo) -> JsonValue {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in &routine.params {
        properties.insert(
            param.name.clone(),
            json!({"type": GenericType::from_native(&param.data_type).as_str()}),
        );
        required.push(JsonValue::String(param.name.clone()));
    }
    let input = json!({
        "type": "object",
        "properties": properties,
        "required": required,
    });
    let output = match &routine.return_type {
        Some(return_type) => json!({
            "type": "object",
            "properties": {
                "result": {"type": GenericType::from_native(return_type).as_str()}
            }
        }),
        None => json!({}),
    };
    json!([input, output])
}

/// `{"tables": …, "rpc": …}` for the active schema.
///
/// The cache table is internal and never listed.
///
/// # Errors
/// Returns the failing metadata query's error with context.
pub async fn load_schema<S: Session + ?Sized>(
    session: &mut S,
    catalog: &RoutineCatalog,
) -> Result<JsonValue, MysqlPluginError> {
    let mut cursor = session
        .query(TABLES_QUERY, &[])
        .await
        .map_err(|e| e.with_context("failed to list tables"))?;
    let table_rows = scan_rows(&mut cursor)?;

    let mut tables = Map::new();
    for row in &table_rows {
        let Some(table) = column_str(row, "TABLE_NAME") else {
            continue;
        };
        if table == CACHE_TABLE {
            continue;
        }
        let mut cursor = session
            .query(COLUMNS_QUERY, &[SqlValue::from(table)])
            .await
            .map_err(|e| e.with_context(&format!("failed to list columns of {table}")))?;
        let columns = scan_rows(&mut cursor)?
            .iter()
            .map(ColumnInfo::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        tables.insert(table.to_string(), table_schema(&columns));
    }

    let mut rpc = Map::new();
    for routine in catalog.iter() {
        rpc.insert(routine.name.clone(), routine_schema(routine));
    }

    Ok(json!({"tables": tables, "rpc": rpc}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ParameterMode, RoutineParameter};

    fn column(name: &str, data_type: &str, nullable: bool, default: Option<&str>, key: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default: default.map(Into::into),
            key: key.into(),
        }
    }

    #[test]
    fn table_descriptor_flags() {
        let schema = table_schema(&[
            column("id", "int", false, None, "PRI"),
            column("name", "varchar", true, None, ""),
            column("created_at", "timestamp", false, None, ""),
            column("status", "varchar", false, Some("new"), ""),
            column("amount", "decimal", false, Some("0"), ""),
        ]);
        assert_eq!(
            schema,
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "integer", "readOnly": true},
                    "name": {"type": "string", "x-nullable": true},
                    "created_at": {"type": "string"},
                    "status": {"type": "string"},
                    "amount": {"type": "number"},
                },
                "required": ["created_at"],
            })
        );
    }

    #[test]
    fn routine_descriptors() {
        let param = |name: &str, ty: &str, ordinal| RoutineParameter {
            name: name.into(),
            data_type: ty.into(),
            mode: ParameterMode::In,
            ordinal,
        };
        let function = RoutineInfo {
            name: "fnTest".into(),
            params: vec![param("x", "int", 1)],
            return_type: Some("int".into()),
        };
        assert_eq!(
            routine_schema(&function),
            json!([
                {"type": "object", "properties": {"x": {"type": "integer"}}, "required": ["x"]},
                {"type": "object", "properties": {"result": {"type": "integer"}}},
            ])
        );

        let procedure = RoutineInfo {
            name: "doStuff".into(),
            params: vec![param("p1", "varchar", 1), param("p2", "int", 2)],
            return_type: None,
        };
        let schema = routine_schema(&procedure);
        assert_eq!(schema[0]["required"], json!(["p1", "p2"]));
        assert_eq!(schema[1], json!({}));
    }

    #[test]
    fn column_rows_parse() {
        let row = json!({
            "COLUMN_NAME": "id",
            "DATA_TYPE": "int",
            "IS_NULLABLE": "NO",
            "COLUMN_DEFAULT": null,
            "COLUMN_KEY": "PRI",
        });
        let info = ColumnInfo::from_row(row.as_object().unwrap()).unwrap();
        assert!(info.is_primary_key());
        assert!(!info.nullable);
        assert!(!info.is_required());
    }
}
