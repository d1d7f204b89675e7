//! Filter compiler: turns a nested filter map into a SQL boolean expression and its
//! ordered parameters.
//!
//! Filter shape:
//! ```json
//! { "status": "open", "id": { ">=": 10, "<": 20 }, "deleted_at": null }
//! ```
//! Fields are rendered in sorted order and, within a field, operators are rendered
//! in sorted order, so the same filter always yields the same SQL text and argument
//! sequence.

use serde_json::{Map, Value as JsonValue};

use crate::error::MysqlPluginError;
use crate::types::SqlValue;

/// Caller-supplied filter: column (or column expression) to value or operator map.
pub type Filter = Map<String, JsonValue>;

/// A compiled filter. `condition` is empty when the filter had no predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    pub condition: String,
    pub params: Vec<SqlValue>,
}

impl WhereClause {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.condition.is_empty()
    }

    /// The clause as it is appended to a statement: `" WHERE …"` or nothing.
    #[must_use]
    pub fn to_sql_suffix(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.condition)
        }
    }
}

/// Compile a filter map.
///
/// # Errors
/// Returns `MysqlPluginError::ValidationError` for unknown operators, an empty
/// operator object, `IN` without a non-empty array, or `IS` with a non-null operand.
pub fn build_where_clause(filter: &Filter) -> Result<WhereClause, MysqlPluginError> {
    let mut fields: Vec<&String> = filter.keys().collect();
    fields.sort();

    let mut predicates = Vec::new();
    let mut params = Vec::new();
    for field in fields {
        match &filter[field.as_str()] {
            JsonValue::Object(ops) => {
                if ops.is_empty() {
                    return Err(MysqlPluginError::ValidationError(format!(
                        "empty operator set for field {field}"
                    )));
                }
                let mut op_names: Vec<&String> = ops.keys().collect();
                op_names.sort();
                for op in op_names {
                    predicates.push(render_predicate(field, op, &ops[op.as_str()], &mut params)?);
                }
            }
            JsonValue::Null => predicates.push(format!("{field} IS NULL")),
            value => {
                predicates.push(format!("{field} = ?"));
                params.push(SqlValue::from_json(value));
            }
        }
    }

    Ok(WhereClause {
        condition: predicates.join(" AND "),
        params,
    })
}

fn render_predicate(
    field: &str,
    op: &str,
    operand: &JsonValue,
    params: &mut Vec<SqlValue>,
) -> Result<String, MysqlPluginError> {
    let normalized = op.trim().to_ascii_uppercase();
    match normalized.as_str() {
        "=" | "!=" | "<>" | "<" | "<=" | ">" | ">=" | "LIKE" | "NOT LIKE" => {
            params.push(SqlValue::from_json(operand));
            Ok(format!("{field} {normalized} ?"))
        }
        "IN" | "NOT IN" => {
            let items = operand.as_array().filter(|a| !a.is_empty()).ok_or_else(|| {
                MysqlPluginError::ValidationError(format!(
                    "operator {normalized} on field {field} requires a non-empty array"
                ))
            })?;
            let placeholders = vec!["?"; items.len()].join(", ");
            params.extend(items.iter().map(SqlValue::from_json));
            Ok(format!("{field} {normalized} ({placeholders})"))
        }
        "IS" | "IS NOT" => {
            let is_null = match operand {
                JsonValue::Null => true,
                JsonValue::String(s) => s.eq_ignore_ascii_case("null"),
                _ => false,
            };
            if is_null {
                Ok(format!("{field} {normalized} NULL"))
            } else {
                Err(MysqlPluginError::ValidationError(format!(
                    "operator {normalized} on field {field} only accepts null"
                )))
            }
        }
        _ => Err(MysqlPluginError::ValidationError(format!(
            "unsupported operator {op} on field {field}"
        ))),
    }
}

/// Rewrite case-insensitive `ILIKE` predicates for an engine without `ILIKE`.
///
/// `{"name": {"ilike": "%Bob%", "!=": "x"}}` becomes
/// `{"name": {"!=": "x"}, "LOWER(name)": {"LIKE": "%bob%"}}`: the column is wrapped
/// in `LOWER()` and the operand is lower-cased before binding. Other operators on
/// the same field are kept as they were. If the filter already holds a
/// `LOWER(name)` entry, the rewritten predicate is added to its operators.
///
/// # Errors
/// Returns `MysqlPluginError::ValidationError` if a field carries `ILIKE` more than
/// once, or if the rewritten `LIKE` would replace one already on `LOWER(name)`.
pub fn rewrite_ilike(filter: &Filter) -> Result<Filter, MysqlPluginError> {
    let mut rewritten = Filter::with_capacity(filter.len());
    for (field, value) in filter {
        let JsonValue::Object(ops) = value else {
            merge_entry(&mut rewritten, field, value.clone())?;
            continue;
        };
        if !ops.keys().any(|op| is_ilike(op)) {
            merge_entry(&mut rewritten, field, value.clone())?;
            continue;
        }

        let mut remaining = Map::new();
        let mut lowered = None;
        for (op, operand) in ops {
            if !is_ilike(op) {
                remaining.insert(op.clone(), operand.clone());
                continue;
            }
            if lowered.is_some() {
                return Err(MysqlPluginError::ValidationError(format!(
                    "operator ILIKE given more than once on field {field}"
                )));
            }
            lowered = Some(match operand {
                JsonValue::String(s) => JsonValue::String(s.to_lowercase()),
                other => other.clone(),
            });
        }
        if !remaining.is_empty() {
            merge_entry(&mut rewritten, field, JsonValue::Object(remaining))?;
        }
        if let Some(operand) = lowered {
            let mut like = Map::new();
            like.insert("LIKE".to_string(), operand);
            merge_entry(&mut rewritten, &format!("LOWER({field})"), JsonValue::Object(like))?;
        }
    }
    Ok(rewritten)
}

fn is_ilike(op: &str) -> bool {
    op.trim().eq_ignore_ascii_case("ILIKE")
}

/// Insert `value` under `field`, combining operator sets when the field is
/// already present.
fn merge_entry(filter: &mut Filter, field: &str, value: JsonValue) -> Result<(), MysqlPluginError> {
    let Some(existing) = filter.get_mut(field) else {
        filter.insert(field.to_string(), value);
        return Ok(());
    };

    let mut ops = into_operators(existing.take());
    for (op, operand) in into_operators(value) {
        let normalized = op.trim().to_ascii_uppercase();
        if ops.keys().any(|o| o.trim().eq_ignore_ascii_case(&normalized)) {
            return Err(MysqlPluginError::ValidationError(format!(
                "operator {normalized} given more than once on field {field}"
            )));
        }
        ops.insert(op, operand);
    }
    *existing = JsonValue::Object(ops);
    Ok(())
}

fn into_operators(value: JsonValue) -> Map<String, JsonValue> {
    let mut ops = Map::new();
    match value {
        JsonValue::Object(existing) => return existing,
        JsonValue::Null => {
            ops.insert("IS".to_string(), JsonValue::Null);
        }
        scalar => {
            ops.insert("=".to_string(), scalar);
        }
    }
    ops
}
