use async_trait::async_trait;

use crate::error::MysqlPluginError;
use crate::mysql::MysqlOptions;
use crate::results::RowCursor;
use crate::types::SqlValue;

/// One pooled connection, held for the duration of a single logical operation.
///
/// Context injection and the statement it is meant for must run through the same
/// `Session`, since session variables are only visible on the connection that set
/// them. Dropping the session hands the connection back to the pool.
#[async_trait]
pub trait Session: Send {
    type Cursor: RowCursor + Send;

    /// Executes a single statement (INSERT, UPDATE, DELETE, SET, DDL) and returns the number of rows affected.
    async fn execute(&mut self, query: &str, params: &[SqlValue])
    -> Result<u64, MysqlPluginError>;

    /// Executes a statement that produces rows (SELECT, CALL) and returns a cursor over the first result set.
    async fn query(
        &mut self,
        query: &str,
        params: &[SqlValue],
    ) -> Result<Self::Cursor, MysqlPluginError>;

    async fn begin(&mut self) -> Result<(), MysqlPluginError>;

    async fn commit(&mut self) -> Result<(), MysqlPluginError>;

    async fn rollback(&mut self) -> Result<(), MysqlPluginError>;
}

/// Source of sessions: a connection pool plus its lifecycle.
#[async_trait]
pub trait Backend: Clone + Send + Sync + 'static {
    type Session: Session + 'static;

    /// Build the pool described by `options`. No connection is required to exist yet.
    ///
    /// # Errors
    /// Returns `MysqlPluginError::ConfigError` if the options cannot be turned into a pool.
    async fn connect(options: &MysqlOptions) -> Result<Self, MysqlPluginError>;

    /// Check out one connection from the pool.
    async fn acquire(&self) -> Result<Self::Session, MysqlPluginError>;

    /// Verify connectivity by round-tripping to the server.
    async fn ping(&self) -> Result<(), MysqlPluginError>;

    /// Close the pool once every checked-out session has been returned.
    async fn disconnect(self) -> Result<(), MysqlPluginError>;
}
