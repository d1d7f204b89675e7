use std::time::Duration;

use mysql_async::{Opts, OptsBuilder, PoolConstraints, PoolOpts};
use url::Url;

use crate::error::MysqlPluginError;

/// Character set and collation every connection uses.
pub const CHARSET_STATEMENT: &str = "SET NAMES utf8mb4 COLLATE utf8mb4_general_ci";

const SCHEME_PREFIX: &str = "mysql://";

/// Connection options parsed from a `mysql://` URI.
///
/// Pool tuning parameters are removed from the URI; everything else is handed to
/// the driver untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysqlOptions {
    /// Engine URL with the tuning parameters stripped.
    pub url: String,
    pub max_open_conns: usize,
    pub max_idle_conns: usize,
    pub conn_max_lifetime: Duration,
    pub conn_max_idle_time: Duration,
    /// Bound on the initialization ping.
    pub timeout: Duration,
    pub auto_cleanup: bool,
}

impl MysqlOptions {
    pub const DEFAULT_MAX_OPEN_CONNS: usize = 100;
    pub const DEFAULT_MAX_IDLE_CONNS: usize = 20;
    pub const DEFAULT_CONN_MAX_LIFETIME: Duration = Duration::from_secs(5 * 60);
    pub const DEFAULT_CONN_MAX_IDLE_TIME: Duration = Duration::from_secs(10 * 60);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Options for `url` with default pool tuning.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_open_conns: Self::DEFAULT_MAX_OPEN_CONNS,
            max_idle_conns: Self::DEFAULT_MAX_IDLE_CONNS,
            conn_max_lifetime: Self::DEFAULT_CONN_MAX_LIFETIME,
            conn_max_idle_time: Self::DEFAULT_CONN_MAX_IDLE_TIME,
            timeout: Self::DEFAULT_TIMEOUT,
            auto_cleanup: false,
        }
    }

    /// Parse a connection URI of the form
    /// `mysql://[user[:password]@]host[:port]/database?param=value…`.
    ///
    /// Recognized parameters: `maxOpenConns`, `maxIdleConns`, `connMaxLifetime`
    /// (minutes), `connMaxIdleTime` (minutes), `timeout` (seconds), `autoCleanup`
    /// (`1`/`true`). `parseTime` is accepted and dropped.
    ///
    /// # Errors
    /// Returns `MysqlPluginError::ConfigError` for a non-`mysql://` scheme, an
    /// unparsable URI, or a tuning parameter that is not a positive integer.
    pub fn from_uri(uri: &str) -> Result<Self, MysqlPluginError> {
        if !uri.starts_with(SCHEME_PREFIX) {
            return Err(MysqlPluginError::ConfigError(format!(
                "invalid MySQL URI: expected scheme {SCHEME_PREFIX}"
            )));
        }
        let mut url = Url::parse(uri)
            .map_err(|e| MysqlPluginError::from(e).with_context("invalid MySQL URI"))?;

        let mut options = Self::new(String::new());
        let mut passthrough = Vec::new();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "maxOpenConns" => options.max_open_conns = parse_positive(&key, &value)?,
                "maxIdleConns" => options.max_idle_conns = parse_positive(&key, &value)?,
                "connMaxLifetime" => {
                    options.conn_max_lifetime = minutes(parse_positive(&key, &value)?);
                }
                "connMaxIdleTime" => {
                    options.conn_max_idle_time = minutes(parse_positive(&key, &value)?);
                }
                "timeout" => {
                    options.timeout = Duration::from_secs(parse_positive(&key, &value)?);
                }
                "autoCleanup" => {
                    options.auto_cleanup = value == "1" || value.eq_ignore_ascii_case("true");
                }
                "parseTime" => {}
                _ => passthrough.push((key.into_owned(), value.into_owned())),
            }
        }
        options.max_idle_conns = options.max_idle_conns.min(options.max_open_conns);

        url.set_query(None);
        if !passthrough.is_empty() {
            url.query_pairs_mut().extend_pairs(&passthrough);
        }
        options.url = url.into();
        Ok(options)
    }

    #[must_use]
    pub fn with_max_open_conns(mut self, max_open_conns: usize) -> Self {
        self.max_open_conns = max_open_conns;
        self
    }

    #[must_use]
    pub fn with_max_idle_conns(mut self, max_idle_conns: usize) -> Self {
        self.max_idle_conns = max_idle_conns;
        self
    }

    #[must_use]
    pub fn with_conn_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.conn_max_lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn with_conn_max_idle_time(mut self, idle_time: Duration) -> Self {
        self.conn_max_idle_time = idle_time;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_auto_cleanup(mut self, auto_cleanup: bool) -> Self {
        self.auto_cleanup = auto_cleanup;
        self
    }

    /// `host[:port]/database` for log lines; credentials are never included.
    #[must_use]
    pub fn target(&self) -> String {
        match Url::parse(&self.url) {
            Ok(url) => {
                let host = url.host_str().unwrap_or("localhost");
                match url.port() {
                    Some(port) => format!("{host}:{port}{}", url.path()),
                    None => format!("{host}{}", url.path()),
                }
            }
            Err(_) => "<invalid url>".to_string(),
        }
    }

    /// Driver options: the engine URL plus pool limits and the charset init command.
    ///
    /// # Errors
    /// Returns `MysqlPluginError::ConfigError` if the driver rejects the URL or the
    /// pool limits.
    pub fn to_opts(&self) -> Result<Opts, MysqlPluginError> {
        let base = Opts::from_url(&self.url).map_err(|e| {
            MysqlPluginError::ConfigError(format!("invalid MySQL connection options: {e}"))
        })?;
        let constraints = PoolConstraints::new(self.max_idle_conns, self.max_open_conns)
            .ok_or_else(|| {
                MysqlPluginError::ConfigError(format!(
                    "invalid pool size: maxIdleConns={} maxOpenConns={}",
                    self.max_idle_conns, self.max_open_conns
                ))
            })?;
        let pool_opts = PoolOpts::default()
            .with_constraints(constraints)
            .with_abs_conn_ttl(Some(self.conn_max_lifetime))
            .with_inactive_connection_ttl(self.conn_max_idle_time);

        Ok(OptsBuilder::from_opts(base)
            .pool_opts(pool_opts)
            .init(vec![CHARSET_STATEMENT])
            .into())
    }
}

fn parse_positive<T>(key: &str, value: &str) -> Result<T, MysqlPluginError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => Ok(parsed),
        _ => Err(MysqlPluginError::ConfigError(format!(
            "invalid {key} value: {value}"
        ))),
    }
}

fn minutes(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(60))
}
