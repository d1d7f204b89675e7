use crate::types::SqlValue;

/// A SQL string and its bound parameters bundled together.
///
/// Every statement the plugin issues is assembled into one of these first, so the
/// generated text and argument order can be asserted without a database:
/// ```rust
/// use mysql_rest_plugin::prelude::*;
///
/// let qp = QueryAndParams::new(
///     "INSERT INTO t (id, name) VALUES (?, ?)",
///     vec![SqlValue::Int(1), SqlValue::Text("alice".into())],
/// );
/// assert_eq!(qp.params.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAndParams {
    /// The SQL query string
    pub query: String,
    /// The parameters to be bound to the query, in placeholder order
    pub params: Vec<SqlValue>,
}

impl QueryAndParams {
    /// Create a new `QueryAndParams` with the given query string and parameters
    pub fn new(query: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }
}
