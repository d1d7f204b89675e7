//! Caller context propagation.
//!
//! A request's context map (auth claims, request metadata) is flattened into
//! `_`-joined keys and written into MySQL user variables on the session that will
//! run the request, so triggers and routines can read `@erctx_claims_sub` or
//! `@request_claims_sub`.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value as JsonValue};

use crate::error::MysqlPluginError;
use crate::executor::Session;
use crate::query::QueryAndParams;
use crate::types::SqlValue;

/// Caller-supplied nested context.
pub type ContextMap = Map<String, JsonValue>;

const PRIMARY_PREFIX: &str = "erctx_";
const REQUEST_PREFIX: &str = "request_";
const TIMEZONE_KEY: &str = "timezone";

static INVALID_KEY_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9_]").unwrap_or_else(|e| panic!("invalid key pattern: {e}"))
});

/// Flatten a context map into sorted `(key, value)` pairs.
///
/// Nested objects join their keys with `_`; characters that are not valid in a
/// user-variable name become `_`. Strings bind as text, numbers and booleans as
/// their text form, arrays as JSON text and `null` as SQL NULL.
///
/// Keys that flatten to the same name (`x-id` and `x_id`, or `{"a": {"b": ..}}`
/// and `a_b`) collapse into one variable holding the value that comes later in
/// the map.
///
/// # Errors
/// Returns `MysqlPluginError::ContextError` if a key is empty.
pub fn flatten_context(ctx: &ContextMap) -> Result<Vec<(String, SqlValue)>, MysqlPluginError> {
    let mut flat = BTreeMap::new();
    flatten_into("", ctx, &mut flat)?;
    Ok(flat.into_iter().collect())
}

fn flatten_into(
    prefix: &str,
    map: &ContextMap,
    out: &mut BTreeMap<String, SqlValue>,
) -> Result<(), MysqlPluginError> {
    for (raw_key, value) in map {
        let key = INVALID_KEY_CHARS.replace_all(raw_key, "_");
        if key.is_empty() {
            return Err(MysqlPluginError::ContextError(if prefix.is_empty() {
                "empty context key".to_string()
            } else {
                format!("empty context key under {prefix}")
            }));
        }
        let full_key = if prefix.is_empty() {
            key.into_owned()
        } else {
            format!("{prefix}_{key}")
        };

        if let JsonValue::Object(nested) = value {
            flatten_into(&full_key, nested, out)?;
            continue;
        }

        let bound = match value {
            JsonValue::Null => SqlValue::Null,
            JsonValue::String(s) => SqlValue::Text(s.clone()),
            JsonValue::Bool(b) => SqlValue::Text(b.to_string()),
            JsonValue::Number(n) => SqlValue::Text(n.to_string()),
            other => SqlValue::Text(other.to_string()),
        };
        if out.contains_key(&full_key) {
            tracing::debug!(key = %full_key, "context key repeated after flattening; later value kept");
        }
        out.insert(full_key, bound);
    }
    Ok(())
}

/// Build the `SET` statement for a context, or `None` when there is nothing to set.
///
/// Every flattened key is assigned twice (`@erctx_<key>` and `@request_<key>`), in
/// sorted key order. A non-empty top-level `timezone` string also sets the
/// session `time_zone`, as the last assignment.
///
/// # Errors
/// Returns `MysqlPluginError::ContextError` if the context cannot be flattened.
pub fn build_set_statement(ctx: &ContextMap) -> Result<Option<QueryAndParams>, MysqlPluginError> {
    let flat = flatten_context(ctx)?;
    if flat.is_empty() {
        return Ok(None);
    }

    let mut assignments = Vec::with_capacity(flat.len() * 2 + 1);
    let mut params = Vec::with_capacity(flat.len() * 2 + 1);
    for (key, value) in flat {
        assignments.push(format!("@{PRIMARY_PREFIX}{key} = ?"));
        assignments.push(format!("@{REQUEST_PREFIX}{key} = ?"));
        params.push(value.clone());
        params.push(value);
    }
    if let Some(JsonValue::String(tz)) = ctx.get(TIMEZONE_KEY) {
        if !tz.is_empty() {
            assignments.push("time_zone = ?".to_string());
            params.push(SqlValue::Text(tz.clone()));
        }
    }

    Ok(Some(QueryAndParams::new(
        format!("SET {}", assignments.join(", ")),
        params,
    )))
}

/// Write the context into session variables on `session`.
///
/// A missing context, or one that flattens to nothing, issues no statement.
///
/// # Errors
/// Returns `MysqlPluginError::ContextError` if the context is malformed or the
/// session rejects the statement. The caller owns any rollback.
pub async fn inject_context<S: Session + ?Sized>(
    session: &mut S,
    ctx: Option<&ContextMap>,
) -> Result<(), MysqlPluginError> {
    let Some(ctx) = ctx else {
        return Ok(());
    };
    let statement =
        build_set_statement(ctx).map_err(|e| e.with_context("failed to format context"))?;
    let Some(statement) = statement else {
        return Ok(());
    };

    tracing::debug!(vars = statement.params.len(), "injecting request context");
    session
        .execute(&statement.query, &statement.params)
        .await
        .map_err(|e| MysqlPluginError::ContextError(format!("failed to execute SET command: {e}")))?;
    Ok(())
}

/// Whether a mutation's side effects should persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxPreference {
    #[default]
    Commit,
    Rollback,
}

impl TxPreference {
    /// Resolve the preference from `ctx.prefer.tx`; absent or empty means commit.
    ///
    /// # Errors
    /// Returns `MysqlPluginError::ValidationError` for any value other than
    /// `commit` or `rollback` (case-insensitive).
    pub fn from_context(ctx: Option<&ContextMap>) -> Result<Self, MysqlPluginError> {
        let requested = ctx
            .and_then(|c| c.get("prefer"))
            .and_then(JsonValue::as_object)
            .and_then(|prefer| prefer.get("tx"))
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match requested {
            None => Ok(TxPreference::Commit),
            Some(v) if v.eq_ignore_ascii_case("commit") => Ok(TxPreference::Commit),
            Some(v) if v.eq_ignore_ascii_case("rollback") => Ok(TxPreference::Rollback),
            Some(v) => Err(MysqlPluginError::ValidationError(format!(
                "invalid tx preference: {v}"
            ))),
        }
    }
}
