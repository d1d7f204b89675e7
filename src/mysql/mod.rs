// MySQL module - the mysql_async backend behind the plugin
//
// - config: connection URI parsing, pool tuning and engine options
// - params: parameter conversion from SqlValue to mysql_async values
// - query: result extraction and the row cursor
// - executor: pooled backend and per-request session

pub mod config;
pub mod executor;
pub mod params;
pub mod query;

pub use config::{CHARSET_STATEMENT, MysqlOptions};
pub use executor::{MysqlBackend, MysqlSession};
pub use params::convert_params;
pub use query::{MysqlRows, mysql_extract_value};
