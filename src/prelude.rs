//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and traits
//! to make it easier to drive the plugin from a host or a test.

pub use crate::cache::CachePlugin;
pub use crate::catalog::{ParameterMode, RoutineCatalog, RoutineInfo, RoutineParameter};
pub use crate::context::{ContextMap, TxPreference};
pub use crate::error::MysqlPluginError;
pub use crate::executor::{Backend, Session};
pub use crate::mysql::{MysqlBackend, MysqlOptions};
pub use crate::plugin::{DbPlugin, MysqlPlugin};
pub use crate::query::QueryAndParams;
pub use crate::query_builder::ReadQuery;
pub use crate::results::{Row, RowCursor};
pub use crate::types::{GenericType, SqlValue};
pub use crate::where_clause::Filter;
