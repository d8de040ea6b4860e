//! Database handle lifecycle: DSN expansion, startup probe and the
//! long-lived pool the record store reads through.
//!
//! Setup runs in two explicit steps. [`probe`] opens one disposable
//! connection, pings it and closes it again. [`retain`] builds the pool that
//! is kept for the lifetime of the plugin. A failed probe means no pool is
//! ever built.

use crate::config::SqlConfig;
use crate::error::SetupError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, Connection};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// Connection cap used when `max_open_connections` is zero or negative
pub const UNBOUNDED_CONNECTIONS: u32 = 1024;

/// Idle connections are reaped after this long when `max_idle_connections`
/// is zero or negative
pub const IDLE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Expand `$VAR` and `${VAR}` using the process environment.
/// Unset variables expand to the empty string.
pub fn expand_env(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

/// Expand `$VAR` and `${VAR}` using `lookup`
pub fn expand_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) if end > 0 => {
                    out.push_str(&lookup(&braced[..end]).unwrap_or_default());
                    rest = &braced[end + 1..];
                }
                // `${}` or an unterminated `${` stay as written
                _ => {
                    out.push('$');
                    rest = after;
                }
            }
            continue;
        }

        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        if name_len == 0 {
            out.push('$');
            rest = after;
        } else {
            out.push_str(&lookup(&after[..name_len]).unwrap_or_default());
            rest = &after[name_len..];
        }
    }

    out.push_str(rest);
    out
}

/// Expand the configured DSN and let the driver parse it
pub fn connect_options(config: &SqlConfig) -> Result<SqliteConnectOptions, SetupError> {
    let dsn = expand_env(&config.dsn);
    debug!("Opening sqlite3 database: {}", dsn);
    SqliteConnectOptions::from_str(&dsn).map_err(|e| SetupError::Connection(e.to_string()))
}

/// Pool tuning handed to sqlx, derived from the configuration without
/// re-validating it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolLimits {
    pub max_connections: u32,
    pub max_lifetime: Option<Duration>,
    pub idle_timeout: Option<Duration>,
}

impl PoolLimits {
    pub fn from_config(config: &SqlConfig) -> Self {
        let max_connections = u32::try_from(config.max_open_connections)
            .ok()
            .filter(|&n| n > 0)
            .unwrap_or(UNBOUNDED_CONNECTIONS);

        let max_lifetime = Some(config.max_lifetime).filter(|d| !d.is_zero());

        let idle_timeout = if config.max_idle_connections <= 0 {
            Some(IDLE_DRAIN_TIMEOUT)
        } else {
            None
        };

        Self {
            max_connections,
            max_lifetime,
            idle_timeout,
        }
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(0)
            .max_lifetime(self.max_lifetime)
            .idle_timeout(self.idle_timeout)
    }
}

/// Open a single disposable connection, ping it and close it.
///
/// Bounded by `probe_timeout` so an unreachable store cannot hang startup.
pub async fn probe(
    options: &SqliteConnectOptions,
    probe_timeout: Duration,
) -> Result<(), SetupError> {
    let attempt = async {
        let mut conn = options.connect().await?;
        conn.ping().await?;
        conn.close().await
    };

    match timeout(probe_timeout, attempt).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SetupError::Connectivity(e.to_string())),
        Err(_) => Err(SetupError::Connectivity(format!(
            "ping timed out after {:?}",
            probe_timeout
        ))),
    }
}

/// Build the long-lived pool. Connections are opened on first use.
pub fn retain(options: SqliteConnectOptions, limits: &PoolLimits) -> SqlitePool {
    limits.pool_options().connect_lazy_with(options)
}

/// The shared handle owned by the plugin instance
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
    limits: PoolLimits,
}

impl DatabasePool {
    /// Probe the database, then build the pool that is kept
    pub async fn open(config: &SqlConfig) -> Result<Self, SetupError> {
        let options = connect_options(config)?;
        probe(&options, config.probe_timeout).await?;

        let limits = PoolLimits::from_config(config);
        let pool = retain(options, &limits);
        info!(
            "sqlite3 database reachable, pool ready (max_connections={}, max_lifetime={:?}, idle_timeout={:?})",
            limits.max_connections, limits.max_lifetime, limits.idle_timeout
        );

        Ok(Self { pool, limits })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn limits(&self) -> &PoolLimits {
        &self.limits
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Close all connections. Pending acquires fail afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("sqlite3 pool closed");
    }
}
