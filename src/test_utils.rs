//! Recording backend for tests.
//!
//! `MockBackend` plays back an ordered list of expectations: every statement,
//! transaction boundary and ping must arrive in the declared order with the exact
//! SQL text and arguments. Anything else fails the call with an `ExecutionError`
//! describing the mismatch and is reported again by [`MockBackend::verify`].
//!
//! ```rust
//! use mysql_rest_plugin::prelude::*;
//! use mysql_rest_plugin::test_utils::MockBackend;
//!
//! let mock = MockBackend::new();
//! mock.expect_begin();
//! mock.expect_exec("DELETE FROM items WHERE status = ?", vec![SqlValue::from("old")], 2);
//! mock.expect_commit();
//! ```

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::MysqlPluginError;
use crate::executor::{Backend, Session};
use crate::mysql::MysqlOptions;
use crate::results::RowCursor;
use crate::types::SqlValue;

/// Result set returned by an expected query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockRows {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    position: usize,
    terminal_error: Option<String>,
}

impl MockRows {
    #[must_use]
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    /// Append one row of values, in column order.
    #[must_use]
    pub fn row(mut self, values: Vec<SqlValue>) -> Self {
        self.rows.push(values);
        self
    }

    /// Fail with `message` once iteration ends.
    #[must_use]
    pub fn with_terminal_error(mut self, message: impl Into<String>) -> Self {
        self.terminal_error = Some(message.into());
        self
    }
}

impl RowCursor for MockRows {
    fn columns(&self) -> Result<Vec<String>, MysqlPluginError> {
        Ok(self.columns.clone())
    }

    fn advance(&mut self) -> bool {
        if self.position < self.rows.len() {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn scan(&mut self) -> Result<Vec<SqlValue>, MysqlPluginError> {
        self.position
            .checked_sub(1)
            .and_then(|i| self.rows.get(i))
            .cloned()
            .ok_or_else(|| MysqlPluginError::ScanError("no current row".into()))
    }

    fn finish(&mut self) -> Result<(), MysqlPluginError> {
        match &self.terminal_error {
            Some(message) => Err(MysqlPluginError::ExecutionError(message.clone())),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
enum Expectation {
    Ping {
        delay: Option<Duration>,
        result: Result<(), String>,
    },
    Begin,
    Commit(Result<(), String>),
    Rollback(Result<(), String>),
    Exec {
        sql: String,
        params: Vec<SqlValue>,
        result: Result<u64, String>,
    },
    Query {
        sql: String,
        params: Vec<SqlValue>,
        result: Result<MockRows, String>,
    },
}

impl Expectation {
    fn describe(&self) -> String {
        match self {
            Self::Ping { .. } => "ping".into(),
            Self::Begin => "begin".into(),
            Self::Commit(_) => "commit".into(),
            Self::Rollback(_) => "rollback".into(),
            Self::Exec { sql, params, .. } => format!("exec `{sql}` with {params:?}"),
            Self::Query { sql, params, .. } => format!("query `{sql}` with {params:?}"),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    expected: VecDeque<Expectation>,
    failures: Vec<String>,
    sessions: usize,
}

/// Ordered-expectation backend. Clones share the same expectations.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, expectation: Expectation) {
        self.lock().expected.push_back(expectation);
    }

    pub fn expect_ping(&self) {
        self.push(Expectation::Ping {
            delay: None,
            result: Ok(()),
        });
    }

    /// Ping that succeeds only after `delay`.
    pub fn expect_slow_ping(&self, delay: Duration) {
        self.push(Expectation::Ping {
            delay: Some(delay),
            result: Ok(()),
        });
    }

    pub fn expect_ping_error(&self, message: impl Into<String>) {
        self.push(Expectation::Ping {
            delay: None,
            result: Err(message.into()),
        });
    }

    pub fn expect_begin(&self) {
        self.push(Expectation::Begin);
    }

    pub fn expect_commit(&self) {
        self.push(Expectation::Commit(Ok(())));
    }

    pub fn expect_commit_error(&self, message: impl Into<String>) {
        self.push(Expectation::Commit(Err(message.into())));
    }

    pub fn expect_rollback(&self) {
        self.push(Expectation::Rollback(Ok(())));
    }

    pub fn expect_rollback_error(&self, message: impl Into<String>) {
        self.push(Expectation::Rollback(Err(message.into())));
    }

    pub fn expect_exec(&self, sql: impl Into<String>, params: Vec<SqlValue>, affected: u64) {
        self.push(Expectation::Exec {
            sql: sql.into(),
            params,
            result: Ok(affected),
        });
    }

    pub fn expect_exec_error(
        &self,
        sql: impl Into<String>,
        params: Vec<SqlValue>,
        message: impl Into<String>,
    ) {
        self.push(Expectation::Exec {
            sql: sql.into(),
            params,
            result: Err(message.into()),
        });
    }

    pub fn expect_query(&self, sql: impl Into<String>, params: Vec<SqlValue>, rows: MockRows) {
        self.push(Expectation::Query {
            sql: sql.into(),
            params,
            result: Ok(rows),
        });
    }

    pub fn expect_query_error(
        &self,
        sql: impl Into<String>,
        params: Vec<SqlValue>,
        message: impl Into<String>,
    ) {
        self.push(Expectation::Query {
            sql: sql.into(),
            params,
            result: Err(message.into()),
        });
    }

    /// Number of sessions handed out so far.
    #[must_use]
    pub fn sessions_acquired(&self) -> usize {
        self.lock().sessions
    }

    /// Check that every expectation was met and nothing unexpected happened.
    ///
    /// # Errors
    /// Returns a report of mismatched calls and unmet expectations.
    pub fn verify(&self) -> Result<(), String> {
        let state = self.lock();
        if state.failures.is_empty() && state.expected.is_empty() {
            return Ok(());
        }
        let mut report = String::new();
        for failure in &state.failures {
            let _ = writeln!(report, "mismatch: {failure}");
        }
        for pending in &state.expected {
            let _ = writeln!(report, "unmet: {}", pending.describe());
        }
        Err(report)
    }

    fn next(&self, actual: &str) -> Result<Expectation, MysqlPluginError> {
        let mut state = self.lock();
        match state.expected.pop_front() {
            Some(expectation) => Ok(expectation),
            None => {
                let message = format!("unexpected {actual}: no expectations left");
                state.failures.push(message.clone());
                Err(MysqlPluginError::ExecutionError(message))
            }
        }
    }

    fn mismatch(&self, expected: &Expectation, actual: &str) -> MysqlPluginError {
        let message = format!("expected {}, got {actual}", expected.describe());
        self.lock().failures.push(message.clone());
        MysqlPluginError::ExecutionError(message)
    }

    fn check_statement(
        &self,
        expected: &Expectation,
        want_sql: &str,
        want_params: &[SqlValue],
        sql: &str,
        params: &[SqlValue],
        actual: &str,
    ) -> Result<(), MysqlPluginError> {
        if want_sql == sql && want_params == params {
            Ok(())
        } else {
            Err(self.mismatch(expected, actual))
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    type Session = MockSession;

    /// A fresh backend without expectations: every later call fails.
    async fn connect(_options: &MysqlOptions) -> Result<Self, MysqlPluginError> {
        Ok(Self::new())
    }

    async fn acquire(&self) -> Result<Self::Session, MysqlPluginError> {
        self.lock().sessions += 1;
        Ok(MockSession {
            backend: self.clone(),
        })
    }

    async fn ping(&self) -> Result<(), MysqlPluginError> {
        let expectation = self.next("ping")?;
        match expectation {
            Expectation::Ping { delay, result } => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                result.map_err(MysqlPluginError::ConnectionError)
            }
            other => Err(self.mismatch(&other, "ping")),
        }
    }

    async fn disconnect(self) -> Result<(), MysqlPluginError> {
        Ok(())
    }
}

/// Session handed out by [`MockBackend`].
#[derive(Debug)]
pub struct MockSession {
    backend: MockBackend,
}

#[async_trait]
impl Session for MockSession {
    type Cursor = MockRows;

    async fn execute(&mut self, query: &str, params: &[SqlValue]) -> Result<u64, MysqlPluginError> {
        let actual = format!("exec `{query}` with {params:?}");
        let expectation = self.backend.next(&actual)?;
        match &expectation {
            Expectation::Exec {
                sql,
                params: want,
                result,
            } => {
                self.backend
                    .check_statement(&expectation, sql, want, query, params, &actual)?;
                result.clone().map_err(MysqlPluginError::ExecutionError)
            }
            _ => Err(self.backend.mismatch(&expectation, &actual)),
        }
    }

    async fn query(
        &mut self,
        query: &str,
        params: &[SqlValue],
    ) -> Result<Self::Cursor, MysqlPluginError> {
        let actual = format!("query `{query}` with {params:?}");
        let expectation = self.backend.next(&actual)?;
        match &expectation {
            Expectation::Query {
                sql,
                params: want,
                result,
            } => {
                self.backend
                    .check_statement(&expectation, sql, want, query, params, &actual)?;
                result.clone().map_err(MysqlPluginError::ExecutionError)
            }
            _ => Err(self.backend.mismatch(&expectation, &actual)),
        }
    }

    async fn begin(&mut self) -> Result<(), MysqlPluginError> {
        match self.backend.next("begin")? {
            Expectation::Begin => Ok(()),
            other => Err(self.backend.mismatch(&other, "begin")),
        }
    }

    async fn commit(&mut self) -> Result<(), MysqlPluginError> {
        match self.backend.next("commit")? {
            Expectation::Commit(result) => result.map_err(MysqlPluginError::ExecutionError),
            other => Err(self.backend.mismatch(&other, "commit")),
        }
    }

    async fn rollback(&mut self) -> Result<(), MysqlPluginError> {
        match self.backend.next("rollback")? {
            Expectation::Rollback(result) => result.map_err(MysqlPluginError::ExecutionError),
            other => Err(self.backend.mismatch(&other, "rollback")),
        }
    }
}
