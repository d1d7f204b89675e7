//! Key/value cache stored in the `kv_cache` table.
//!
//! Entries expire at `expires_at`; reads never return an expired entry even if the
//! cleanup task has not removed it yet.

use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::error::MysqlPluginError;
use crate::executor::{Backend, Session};
use crate::plugin::MysqlPlugin;
use crate::results::RowCursor;
use crate::types::SqlValue;

pub const CACHE_TABLE: &str = "kv_cache";

pub const CREATE_CACHE_TABLE: &str = "CREATE TABLE IF NOT EXISTS kv_cache (\
cache_key VARCHAR(255) PRIMARY KEY, \
cache_value TEXT, \
expires_at DATETIME)";

pub const CACHE_SET: &str = "INSERT INTO kv_cache (cache_key, cache_value, expires_at) \
VALUES (?, ?, NOW() + INTERVAL ? SECOND) \
ON DUPLICATE KEY UPDATE cache_value = VALUES(cache_value), expires_at = VALUES(expires_at)";

pub const CACHE_GET: &str =
    "SELECT cache_value FROM kv_cache WHERE cache_key = ? AND expires_at > NOW()";

pub const CACHE_CLEANUP: &str = "DELETE FROM kv_cache WHERE expires_at <= NOW()";

/// Expiring key/value storage.
#[async_trait]
pub trait CachePlugin: Send + Sync {
    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), MysqlPluginError>;

    /// Fetch a live entry.
    ///
    /// # Errors
    /// Returns `MysqlPluginError::CacheMiss` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<String, MysqlPluginError>;
}

/// Create the cache table if it does not exist yet.
///
/// # Errors
/// Returns the session's error if the DDL fails.
pub async fn ensure_cache_table<S: Session + ?Sized>(session: &mut S) -> Result<(), MysqlPluginError> {
    session.execute(CREATE_CACHE_TABLE, &[]).await?;
    Ok(())
}

/// Delete every expired entry; returns how many were removed.
///
/// # Errors
/// Returns the backend's error if no session is available or the delete fails.
pub async fn cleanup_expired<B: Backend>(backend: &B) -> Result<u64, MysqlPluginError> {
    let mut session = backend.acquire().await?;
    session.execute(CACHE_CLEANUP, &[]).await
}

/// Purge expired entries every `period` until the task is aborted.
/// Failures are logged and retried on the next tick.
pub fn spawn_cache_cleanup<B: Backend>(backend: B, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match cleanup_expired(&backend).await {
                Ok(removed) => tracing::debug!(removed, "expired cache entries removed"),
                Err(e) => tracing::warn!(error = %e, "cache cleanup failed"),
            }
        }
    })
}

fn ttl_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

#[async_trait]
impl<B: Backend> CachePlugin for MysqlPlugin<B> {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), MysqlPluginError> {
        let mut session = self.backend()?.acquire().await?;
        session
            .execute(
                CACHE_SET,
                &[
                    SqlValue::from(key),
                    SqlValue::from(value),
                    SqlValue::Int(ttl_seconds(ttl)),
                ],
            )
            .await
            .map_err(|e| e.with_context("failed to set cache entry"))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<String, MysqlPluginError> {
        let mut session = self.backend()?.acquire().await?;
        let mut cursor = session
            .query(CACHE_GET, &[SqlValue::from(key)])
            .await
            .map_err(|e| e.with_context("failed to get cache entry"))?;

        if !cursor.advance() {
            cursor
                .finish()
                .map_err(|e| e.with_context("failed to get cache entry"))?;
            return Err(MysqlPluginError::CacheMiss);
        }
        // The stored text is returned as-is, without JSON decoding.
        let value = cursor
            .scan()
            .map_err(|e| e.with_context("failed to read cache entry"))?
            .into_iter()
            .next()
            .unwrap_or(SqlValue::Null);
        Ok(match value {
            SqlValue::Text(s) => s,
            SqlValue::Blob(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            SqlValue::Null => String::new(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Bool(b) => b.to_string(),
            SqlValue::Timestamp(ts) => ts.to_string(),
        })
    }
}
