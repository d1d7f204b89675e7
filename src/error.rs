use thiserror::Error;

#[derive(Debug, Error)]
pub enum MysqlPluginError {
    #[error(transparent)]
    MysqlError(#[from] mysql_async::Error),

    #[error(transparent)]
    UrlError(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Routine catalog error: {0}")]
    CatalogError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Context error: {0}")]
    ContextError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Row scan error: {0}")]
    ScanError(String),

    /// Cache lookup found no live entry. Not an operational failure.
    #[error("cache key not found")]
    CacheMiss,

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),
}

impl MysqlPluginError {
    /// Prefix the message with one line of context while keeping the error kind.
    ///
    /// Driver errors have no string payload to extend, so they are surfaced as
    /// `ExecutionError` with the engine text preserved after the prefix.
    #[must_use]
    pub fn with_context(self, context: &str) -> Self {
        match self {
            Self::MysqlError(e) => Self::ExecutionError(format!("{context}: {e}")),
            Self::UrlError(e) => Self::ConfigError(format!("{context}: {e}")),
            Self::ConfigError(msg) => Self::ConfigError(format!("{context}: {msg}")),
            Self::ConnectionError(msg) => Self::ConnectionError(format!("{context}: {msg}")),
            Self::CatalogError(msg) => Self::CatalogError(format!("{context}: {msg}")),
            Self::ValidationError(msg) => Self::ValidationError(format!("{context}: {msg}")),
            Self::ContextError(msg) => Self::ContextError(format!("{context}: {msg}")),
            Self::ExecutionError(msg) => Self::ExecutionError(format!("{context}: {msg}")),
            Self::ScanError(msg) => Self::ScanError(format!("{context}: {msg}")),
            Self::Unimplemented(msg) => Self::Unimplemented(format!("{context}: {msg}")),
            Self::CacheMiss => Self::CacheMiss,
        }
    }

    /// Short machine-readable name of the error kind, used on the wire.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MysqlError(_) | Self::ExecutionError(_) => "execution",
            Self::UrlError(_) | Self::ConfigError(_) => "config",
            Self::ConnectionError(_) => "connection",
            Self::CatalogError(_) => "catalog",
            Self::ValidationError(_) => "validation",
            Self::ContextError(_) => "context",
            Self::ScanError(_) => "scan",
            Self::CacheMiss => "not_found",
            Self::Unimplemented(_) => "unimplemented",
        }
    }

    #[must_use]
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::CacheMiss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_kind_and_original_text() {
        let err = MysqlPluginError::ExecutionError("stored procedure error".into())
            .with_context("failed to call routine");
        assert_eq!(err.kind(), "execution");
        assert!(err.to_string().contains("failed to call routine: stored procedure error"));

        let miss = MysqlPluginError::CacheMiss.with_context("cache get");
        assert!(miss.is_cache_miss());
    }
}
