use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Pool, Row as MysqlRow};

use crate::error::MysqlPluginError;
use crate::executor::{Backend, Session};
use crate::types::SqlValue;

use super::config::MysqlOptions;
use super::params::convert_params;
use super::query::MysqlRows;

/// `mysql_async` pool.
///
/// Connections are reset when they go back to the pool, so session variables set
/// for one request are never visible to the next.
#[derive(Clone, Debug)]
pub struct MysqlBackend {
    pool: Pool,
}

#[async_trait]
impl Backend for MysqlBackend {
    type Session = MysqlSession;

    async fn connect(options: &MysqlOptions) -> Result<Self, MysqlPluginError> {
        let opts = options.to_opts()?;
        Ok(Self {
            pool: Pool::new(opts),
        })
    }

    async fn acquire(&self) -> Result<Self::Session, MysqlPluginError> {
        let conn = self.pool.get_conn().await.map_err(|e| {
            MysqlPluginError::ConnectionError(format!("failed to get DB connection: {e}"))
        })?;
        Ok(MysqlSession { conn })
    }

    async fn ping(&self) -> Result<(), MysqlPluginError> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| MysqlPluginError::ConnectionError(format!("failed to ping MySQL: {e}")))?;
        conn.ping()
            .await
            .map_err(|e| MysqlPluginError::ConnectionError(format!("failed to ping MySQL: {e}")))
    }

    async fn disconnect(self) -> Result<(), MysqlPluginError> {
        self.pool.disconnect().await.map_err(|e| {
            MysqlPluginError::ConnectionError(format!("failed to close MySQL pool: {e}"))
        })
    }
}

/// One checked-out connection. Dropping it returns the connection to the pool.
#[derive(Debug)]
pub struct MysqlSession {
    conn: Conn,
}

#[async_trait]
impl Session for MysqlSession {
    type Cursor = MysqlRows;

    async fn execute(
        &mut self,
        query: &str,
        params: &[SqlValue],
    ) -> Result<u64, MysqlPluginError> {
        self.conn.exec_drop(query, convert_params(params)).await?;
        Ok(self.conn.affected_rows())
    }

    // Always the binary protocol, so temporal columns arrive as dates, not text.
    async fn query(
        &mut self,
        query: &str,
        params: &[SqlValue],
    ) -> Result<Self::Cursor, MysqlPluginError> {
        let mut result = self.conn.exec_iter(query, convert_params(params)).await?;
        let columns: Vec<String> = result
            .columns()
            .map(|cols| cols.iter().map(|c| c.name_str().into_owned()).collect())
            .unwrap_or_default();
        let rows: Vec<MysqlRow> = result.collect().await?;
        // CALL produces a trailing status result; drain it so the connection is reusable.
        result.drop_result().await?;
        Ok(MysqlRows::new(columns, rows))
    }

    async fn begin(&mut self) -> Result<(), MysqlPluginError> {
        self.conn.query_drop("START TRANSACTION").await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), MysqlPluginError> {
        self.conn.query_drop("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), MysqlPluginError> {
        self.conn.query_drop("ROLLBACK").await?;
        Ok(())
    }
}
