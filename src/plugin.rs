use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use tokio::task::JoinHandle;

use crate::cache::{ensure_cache_table, spawn_cache_cleanup};
use crate::catalog::{RoutineCatalog, load_routines};
use crate::context::{ContextMap, inject_context};
use crate::error::MysqlPluginError;
use crate::executor::{Backend, Session};
use crate::mysql::{CHARSET_STATEMENT, MysqlBackend, MysqlOptions};
use crate::query_builder::{ReadQuery, build_delete, build_routine_call, build_select, build_update};
use crate::results::{Row, scan_rows};
use crate::schema::load_schema;
use crate::transaction::{CallRoutine, ExecuteStatement, InsertRows, run_in_transaction};
use crate::where_clause::Filter;

/// How often expired cache entries are purged when `autoCleanup` is on.
pub const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// The CRUD/RPC surface a host drives.
#[async_trait]
pub trait DbPlugin: Send + Sync {
    /// Parse `uri`, open and verify the pool, prepare the session defaults and
    /// load the routine catalog. On failure the previous state is kept.
    async fn init_connection(&mut self, uri: &str) -> Result<(), MysqlPluginError>;

    async fn table_get(
        &self,
        table: &str,
        read: &ReadQuery,
        ctx: Option<&ContextMap>,
    ) -> Result<Vec<Row>, MysqlPluginError>;

    /// Insert every row in one transaction and report the rows as given.
    async fn table_create(
        &self,
        table: &str,
        rows: Vec<Row>,
        ctx: Option<&ContextMap>,
    ) -> Result<Vec<Row>, MysqlPluginError>;

    async fn table_update(
        &self,
        table: &str,
        data: &Map<String, JsonValue>,
        filter: &Filter,
        ctx: Option<&ContextMap>,
    ) -> Result<u64, MysqlPluginError>;

    async fn table_delete(
        &self,
        table: &str,
        filter: &Filter,
        ctx: Option<&ContextMap>,
    ) -> Result<u64, MysqlPluginError>;

    /// Call a catalogued routine by exact name.
    async fn call_function(
        &self,
        name: &str,
        args: &Map<String, JsonValue>,
        ctx: Option<&ContextMap>,
    ) -> Result<JsonValue, MysqlPluginError>;

    async fn get_schema(&self, ctx: Option<&ContextMap>) -> Result<JsonValue, MysqlPluginError>;
}

struct Attached<B: Backend> {
    backend: B,
    routines: RoutineCatalog,
    cleanup: Option<JoinHandle<()>>,
}

impl<B: Backend> Drop for Attached<B> {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup.take() {
            handle.abort();
        }
    }
}

/// MySQL implementation of [`DbPlugin`], generic over the session source so the
/// SQL it issues can be checked against a recording backend.
pub struct MysqlPlugin<B: Backend = MysqlBackend> {
    state: Option<Attached<B>>,
}

impl<B: Backend> Default for MysqlPlugin<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> MysqlPlugin<B> {
    /// A plugin with no connection; every operation fails until initialized.
    #[must_use]
    pub fn new() -> Self {
        Self { state: None }
    }

    /// A plugin bound to `backend` with an empty routine catalog and no startup
    /// statements.
    #[must_use]
    pub fn with_backend(backend: B) -> Self {
        Self {
            state: Some(Attached {
                backend,
                routines: RoutineCatalog::new(),
                cleanup: None,
            }),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.is_some()
    }

    /// Run the initialization sequence on an already-built backend:
    /// ping (bounded by `options.timeout`), charset, cache table, routine catalog.
    ///
    /// State is replaced only after every step succeeded.
    ///
    /// # Errors
    /// Returns the first failing step's error with context.
    pub async fn attach(
        &mut self,
        backend: B,
        options: &MysqlOptions,
    ) -> Result<(), MysqlPluginError> {
        match tokio::time::timeout(options.timeout, backend.ping()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(MysqlPluginError::ConnectionError(format!(
                    "failed to ping MySQL: timed out after {}s",
                    options.timeout.as_secs_f64()
                )));
            }
        }

        let mut session = backend.acquire().await?;
        session
            .execute(CHARSET_STATEMENT, &[])
            .await
            .map_err(|e| e.with_context("failed to set charset"))?;
        ensure_cache_table(&mut session)
            .await
            .map_err(|e| e.with_context("failed to create cache table"))?;
        let routines = load_routines(&mut session)
            .await
            .map_err(|e| e.with_context("failed to load routines"))?;
        drop(session);

        let cleanup = options
            .auto_cleanup
            .then(|| spawn_cache_cleanup(backend.clone(), CACHE_CLEANUP_INTERVAL));
        tracing::info!(
            target_db = %options.target(),
            routines = routines.len(),
            auto_cleanup = options.auto_cleanup,
            "MySQL connection initialized"
        );
        self.state = Some(Attached {
            backend,
            routines,
            cleanup,
        });
        Ok(())
    }

    /// Rebuild the routine catalog from the server.
    ///
    /// # Errors
    /// Returns `MysqlPluginError::CatalogError` on failure; the previous catalog is kept.
    pub async fn reload_routines(&mut self) -> Result<(), MysqlPluginError> {
        let state = self.attached_mut()?;
        let mut session = state.backend.acquire().await?;
        let routines = load_routines(&mut session).await?;
        drop(session);
        state.routines = routines;
        Ok(())
    }

    /// Replace the routine catalog directly.
    ///
    /// # Errors
    /// Returns `MysqlPluginError::ConnectionError` if the plugin has no backend.
    pub fn set_routines(&mut self, routines: RoutineCatalog) -> Result<(), MysqlPluginError> {
        self.attached_mut()?.routines = routines;
        Ok(())
    }

    /// # Errors
    /// Returns `MysqlPluginError::ConnectionError` if the plugin has no backend.
    pub fn routines(&self) -> Result<&RoutineCatalog, MysqlPluginError> {
        Ok(&self.attached()?.routines)
    }

    /// Stop background work and close the pool.
    ///
    /// # Errors
    /// Returns the backend's error if the pool does not close cleanly.
    pub async fn close(&mut self) -> Result<(), MysqlPluginError> {
        let Some(mut state) = self.state.take() else {
            return Ok(());
        };
        if let Some(handle) = state.cleanup.take() {
            handle.abort();
        }
        let backend = state.backend.clone();
        drop(state);
        backend.disconnect().await
    }

    pub(crate) fn backend(&self) -> Result<&B, MysqlPluginError> {
        Ok(&self.attached()?.backend)
    }

    fn attached(&self) -> Result<&Attached<B>, MysqlPluginError> {
        self.state
            .as_ref()
            .ok_or_else(|| MysqlPluginError::ConnectionError("connection not initialized".into()))
    }

    fn attached_mut(&mut self) -> Result<&mut Attached<B>, MysqlPluginError> {
        self.state
            .as_mut()
            .ok_or_else(|| MysqlPluginError::ConnectionError("connection not initialized".into()))
    }
}

#[async_trait]
impl<B: Backend> DbPlugin for MysqlPlugin<B> {
    async fn init_connection(&mut self, uri: &str) -> Result<(), MysqlPluginError> {
        let options = MysqlOptions::from_uri(uri)?;
        let backend = B::connect(&options)
            .await
            .map_err(|e| e.with_context("failed to open MySQL connection"))?;
        if let Err(err) = self.attach(backend.clone(), &options).await {
            if let Err(close_err) = backend.disconnect().await {
                tracing::warn!(error = %close_err, "failed to close pool after init failure");
            }
            return Err(err);
        }
        Ok(())
    }

    async fn table_get(
        &self,
        table: &str,
        read: &ReadQuery,
        ctx: Option<&ContextMap>,
    ) -> Result<Vec<Row>, MysqlPluginError> {
        let statement = build_select(table, read)?;
        let mut session = self.backend()?.acquire().await?;
        inject_context(&mut session, ctx).await?;

        tracing::debug!(sql = %statement.query, "select");
        let mut cursor = session
            .query(&statement.query, &statement.params)
            .await
            .map_err(|e| e.with_context("failed to execute query"))?;
        scan_rows(&mut cursor)
    }

    async fn table_create(
        &self,
        table: &str,
        rows: Vec<Row>,
        ctx: Option<&ContextMap>,
    ) -> Result<Vec<Row>, MysqlPluginError> {
        let op = InsertRows::new(table, rows)?;
        let mut session = self.backend()?.acquire().await?;
        run_in_transaction(&mut session, ctx, &op).await
    }

    async fn table_update(
        &self,
        table: &str,
        data: &Map<String, JsonValue>,
        filter: &Filter,
        ctx: Option<&ContextMap>,
    ) -> Result<u64, MysqlPluginError> {
        let op = ExecuteStatement::update(build_update(table, data, filter)?);
        let mut session = self.backend()?.acquire().await?;
        run_in_transaction(&mut session, ctx, &op).await
    }

    async fn table_delete(
        &self,
        table: &str,
        filter: &Filter,
        ctx: Option<&ContextMap>,
    ) -> Result<u64, MysqlPluginError> {
        let op = ExecuteStatement::delete(build_delete(table, filter)?);
        let mut session = self.backend()?.acquire().await?;
        run_in_transaction(&mut session, ctx, &op).await
    }

    async fn call_function(
        &self,
        name: &str,
        args: &Map<String, JsonValue>,
        ctx: Option<&ContextMap>,
    ) -> Result<JsonValue, MysqlPluginError> {
        let state = self.attached()?;
        let routine = state
            .routines
            .get(name)
            .ok_or_else(|| MysqlPluginError::ValidationError(format!("routine {name} not found")))?;
        let op = CallRoutine::new(build_routine_call(routine, args)?, routine.is_function());

        let mut session = state.backend.acquire().await?;
        run_in_transaction(&mut session, ctx, &op).await
    }

    async fn get_schema(&self, ctx: Option<&ContextMap>) -> Result<JsonValue, MysqlPluginError> {
        let state = self.attached()?;
        let mut session = state.backend.acquire().await?;
        inject_context(&mut session, ctx).await?;
        load_schema(&mut session, &state.routines).await
    }
}
