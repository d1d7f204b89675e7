//! Transaction coordinator.
//!
//! Every mutation runs as `begin → inject context → operation → commit | rollback`
//! on one session. The operation's output type decides what the caller sees when the
//! context asks for a rollback (see [`TxOutcome`]).

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::context::{ContextMap, TxPreference, inject_context};
use crate::error::MysqlPluginError;
use crate::executor::Session;
use crate::query::QueryAndParams;
use crate::query_builder::build_insert;
use crate::results::{Row, scan_rows};
use crate::tx_outcome::TxOutcome;

/// A unit of work executed inside an open transaction.
#[async_trait]
pub trait TxOperation<S: Session>: Send + Sync {
    type Output: TxOutcome + Send;

    /// Run against the transaction's session. Errors carry their own context.
    async fn run(&self, session: &mut S) -> Result<Self::Output, MysqlPluginError>;
}

/// Run `op` in one transaction on `session`.
///
/// Exactly one of commit or rollback is issued once the transaction has begun.
///
/// # Errors
/// Returns the begin, preference, injection or operation error after rolling back,
/// or the commit error (with the rollback error, if the follow-up rollback failed
/// too).
pub async fn run_in_transaction<S, Op>(
    session: &mut S,
    ctx: Option<&ContextMap>,
    op: &Op,
) -> Result<Op::Output, MysqlPluginError>
where
    S: Session,
    Op: TxOperation<S>,
{
    session
        .begin()
        .await
        .map_err(|e| e.with_context("failed to begin transaction"))?;

    let preference = match prepare_session(session, ctx).await {
        Ok(preference) => preference,
        Err(err) => {
            rollback_after_failure(session).await;
            return Err(err);
        }
    };

    let output = match op.run(session).await {
        Ok(output) => output,
        Err(err) => {
            rollback_after_failure(session).await;
            return Err(err);
        }
    };

    match preference {
        TxPreference::Rollback => {
            session
                .rollback()
                .await
                .map_err(|e| e.with_context("failed to roll back transaction"))?;
            tracing::debug!("transaction rolled back on request");
            Ok(output.discarded())
        }
        TxPreference::Commit => match session.commit().await {
            Ok(()) => Ok(output),
            Err(commit_err) => match session.rollback().await {
                Ok(()) => Err(commit_err.with_context("failed to commit transaction")),
                Err(rollback_err) => Err(MysqlPluginError::ExecutionError(format!(
                    "failed to commit transaction: {commit_err}; rollback also failed: {rollback_err}"
                ))),
            },
        },
    }
}

async fn prepare_session<S: Session>(
    session: &mut S,
    ctx: Option<&ContextMap>,
) -> Result<TxPreference, MysqlPluginError> {
    let preference = TxPreference::from_context(ctx)?;
    inject_context(session, ctx).await?;
    Ok(preference)
}

async fn rollback_after_failure<S: Session>(session: &mut S) {
    if let Err(e) = session.rollback().await {
        tracing::warn!(error = %e, "rollback after failed operation did not succeed");
    }
}

/// Insert rows one statement per row; reports the caller's rows back.
#[derive(Debug, Clone)]
pub struct InsertRows {
    rows: Vec<Row>,
    statements: Vec<QueryAndParams>,
}

impl InsertRows {
    /// Build every statement up front so bad input fails before the transaction.
    ///
    /// # Errors
    /// Returns `MysqlPluginError::ValidationError` if any row has no columns.
    pub fn new(table: &str, rows: Vec<Row>) -> Result<Self, MysqlPluginError> {
        let statements = rows
            .iter()
            .map(|row| build_insert(table, row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows, statements })
    }
}

#[async_trait]
impl<S: Session> TxOperation<S> for InsertRows {
    type Output = Vec<Row>;

    async fn run(&self, session: &mut S) -> Result<Self::Output, MysqlPluginError> {
        for statement in &self.statements {
            tracing::debug!(sql = %statement.query, "insert");
            session
                .execute(&statement.query, &statement.params)
                .await
                .map_err(|e| e.with_context("failed to execute insert"))?;
        }
        Ok(self.rows.clone())
    }
}

/// A single UPDATE or DELETE reporting the affected row count.
#[derive(Debug, Clone)]
pub struct ExecuteStatement {
    statement: QueryAndParams,
    action: &'static str,
}

impl ExecuteStatement {
    #[must_use]
    pub fn update(statement: QueryAndParams) -> Self {
        Self {
            statement,
            action: "update",
        }
    }

    #[must_use]
    pub fn delete(statement: QueryAndParams) -> Self {
        Self {
            statement,
            action: "delete",
        }
    }
}

#[async_trait]
impl<S: Session> TxOperation<S> for ExecuteStatement {
    type Output = u64;

    async fn run(&self, session: &mut S) -> Result<Self::Output, MysqlPluginError> {
        tracing::debug!(sql = %self.statement.query, "{}", self.action);
        session
            .execute(&self.statement.query, &self.statement.params)
            .await
            .map_err(|e| e.with_context(&format!("failed to execute {}", self.action)))
    }
}

/// A stored routine call.
///
/// Functions yield the scalar `result` column of the first row (`null` when there is
/// none); procedures yield the rows of their first result set as an array.
#[derive(Debug, Clone)]
pub struct CallRoutine {
    statement: QueryAndParams,
    is_function: bool,
}

impl CallRoutine {
    #[must_use]
    pub fn new(statement: QueryAndParams, is_function: bool) -> Self {
        Self {
            statement,
            is_function,
        }
    }
}

#[async_trait]
impl<S: Session> TxOperation<S> for CallRoutine {
    type Output = JsonValue;

    async fn run(&self, session: &mut S) -> Result<Self::Output, MysqlPluginError> {
        tracing::debug!(sql = %self.statement.query, "call routine");
        let mut cursor = session
            .query(&self.statement.query, &self.statement.params)
            .await
            .map_err(|e| e.with_context("failed to call routine"))?;
        let rows = scan_rows(&mut cursor)
            .map_err(|e| e.with_context("failed to scan routine result"))?;

        if self.is_function {
            Ok(rows
                .into_iter()
                .next()
                .and_then(|mut row| row.remove("result"))
                .unwrap_or(JsonValue::Null))
        } else {
            Ok(JsonValue::Array(rows.into_iter().map(JsonValue::Object).collect()))
        }
    }
}

