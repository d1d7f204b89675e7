//! SQL assembly for the CRUD/RPC surface.
//!
//! Every builder is pure: it returns a [`QueryAndParams`] and never touches a
//! session, so the exact text and argument order can be checked directly.

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::catalog::RoutineInfo;
use crate::error::MysqlPluginError;
use crate::query::QueryAndParams;
use crate::types::SqlValue;
use crate::where_clause::{Filter, build_where_clause, rewrite_ilike};

/// Arguments of a table read.
///
/// Non-positive `limit`/`offset` values leave the clause out.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReadQuery {
    pub select: Vec<String>,
    #[serde(rename = "where")]
    pub filter: Filter,
    pub ordering: Vec<String>,
    pub group_by: Vec<String>,
    pub limit: i64,
    pub offset: i64,
}

impl ReadQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn order_by<I, S>(mut self, ordering: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ordering = ordering.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn group_by<I, S>(mut self, group_by: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = group_by.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// `SELECT … FROM … [WHERE] [GROUP BY] [ORDER BY] [LIMIT] [OFFSET]`, in that order.
///
/// # Errors
/// Returns `MysqlPluginError::ValidationError` if the filter does not compile.
pub fn build_select(table: &str, read: &ReadQuery) -> Result<QueryAndParams, MysqlPluginError> {
    let fields = if read.select.is_empty() {
        "*".to_string()
    } else {
        read.select.join(", ")
    };
    let clause = rewrite_ilike(&read.filter)
        .and_then(|filter| build_where_clause(&filter))
        .map_err(|e| e.with_context("failed to build WHERE clause"))?;

    let mut sql = format!("SELECT {fields} FROM {table}{}", clause.to_sql_suffix());
    if !read.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&read.group_by.join(", "));
    }
    if !read.ordering.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&read.ordering.join(", "));
    }
    if read.limit > 0 {
        sql.push_str(&format!(" LIMIT {}", read.limit));
    }
    if read.offset > 0 {
        sql.push_str(&format!(" OFFSET {}", read.offset));
    }
    Ok(QueryAndParams::new(sql, clause.params))
}

/// One `INSERT` for one row, columns in sorted order.
///
/// # Errors
/// Returns `MysqlPluginError::ValidationError` for a row without columns.
pub fn build_insert(
    table: &str,
    row: &Map<String, JsonValue>,
) -> Result<QueryAndParams, MysqlPluginError> {
    if row.is_empty() {
        return Err(MysqlPluginError::ValidationError(format!(
            "cannot insert an empty row into {table}"
        )));
    }
    let (columns, params) = sorted_columns(row);
    let placeholders = vec!["?"; columns.len()].join(", ");
    Ok(QueryAndParams::new(
        format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        ),
        params,
    ))
}

/// `UPDATE … SET` with sorted columns; SET values bind before filter values.
///
/// # Errors
/// Returns `MysqlPluginError::ValidationError` for empty `data` or a filter that
/// does not compile.
pub fn build_update(
    table: &str,
    data: &Map<String, JsonValue>,
    filter: &Filter,
) -> Result<QueryAndParams, MysqlPluginError> {
    if data.is_empty() {
        return Err(MysqlPluginError::ValidationError(format!(
            "no columns to update in {table}"
        )));
    }
    let (columns, mut params) = sorted_columns(data);
    let assignments: Vec<String> = columns.iter().map(|c| format!("{c} = ?")).collect();
    let clause = rewrite_ilike(filter)
        .and_then(|filter| build_where_clause(&filter))
        .map_err(|e| e.with_context("failed to build WHERE clause"))?;
    params.extend(clause.params.iter().cloned());

    Ok(QueryAndParams::new(
        format!(
            "UPDATE {table} SET {}{}",
            assignments.join(", "),
            clause.to_sql_suffix()
        ),
        params,
    ))
}

/// `DELETE FROM …` with the compiled filter.
///
/// # Errors
/// Returns `MysqlPluginError::ValidationError` if the filter does not compile.
pub fn build_delete(table: &str, filter: &Filter) -> Result<QueryAndParams, MysqlPluginError> {
    let clause = rewrite_ilike(filter)
        .and_then(|filter| build_where_clause(&filter))
        .map_err(|e| e.with_context("failed to build WHERE clause"))?;
    Ok(QueryAndParams::new(
        format!("DELETE FROM {table}{}", clause.to_sql_suffix()),
        clause.params,
    ))
}

/// Call form for a catalogued routine: `SELECT f(?, …) AS result` for functions,
/// `CALL p(?, …)` for procedures. Arguments are validated before any SQL is built.
///
/// # Errors
/// Returns `MysqlPluginError::ValidationError` for missing or unexpected arguments.
pub fn build_routine_call(
    routine: &RoutineInfo,
    args: &Map<String, JsonValue>,
) -> Result<QueryAndParams, MysqlPluginError> {
    let params = routine.bind_arguments(args)?;
    let placeholders = vec!["?"; params.len()].join(", ");
    let sql = if routine.is_function() {
        format!("SELECT {}({placeholders}) AS result", routine.name)
    } else {
        format!("CALL {}({placeholders})", routine.name)
    };
    Ok(QueryAndParams::new(sql, params))
}

fn sorted_columns(row: &Map<String, JsonValue>) -> (Vec<&str>, Vec<SqlValue>) {
    let mut columns: Vec<&str> = row.keys().map(String::as_str).collect();
    columns.sort_unstable();
    let params = columns.iter().map(|c| SqlValue::from_json(&row[*c])).collect();
    (columns, params)
}
