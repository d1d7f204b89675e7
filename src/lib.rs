//! MySQL plugin that turns schema-agnostic CRUD/RPC calls into parameterized SQL.
//!
//! Every call runs on one pooled connection. The caller's context map is copied into
//! `@erctx_*` / `@request_*` session variables first, so triggers and stored
//! routines can read who is asking. Mutations run in a transaction that the
//! context may ask to roll back (`prefer.tx = "rollback"`) for dry runs.

pub mod cache;
pub mod catalog;
pub mod context;
pub mod error;
pub mod executor;
pub mod mysql;
pub mod plugin;
pub mod prelude;
pub mod query;
pub mod query_builder;
pub mod results;
pub mod schema;
pub mod server;
pub mod transaction;
pub mod tx_outcome;
pub mod types;
pub mod where_clause;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cache::CachePlugin;
pub use context::{ContextMap, TxPreference};
pub use error::MysqlPluginError;
pub use executor::{Backend, Session};
pub use mysql::{MysqlBackend, MysqlOptions};
pub use plugin::{DbPlugin, MysqlPlugin};
pub use query::QueryAndParams;
pub use query_builder::ReadQuery;
pub use results::Row;
pub use server::serve;
pub use types::{GenericType, SqlValue};
