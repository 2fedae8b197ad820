//! Connection configuration with per-entry-point defaults.
//!
//! There are two ways to build a [`Config`], each with its own default set:
//!
//! | Field       | `Config::default()` | `Config::from_env()`        |
//! |-------------|---------------------|-----------------------------|
//! | host        | `localhost`         | `DB_HOST` or `localhost`    |
//! | port        | 5432                | `DB_PORT` or 5432           |
//! | user        | `postgres`          | `DB_USER` or `postgres`     |
//! | password    | `postgres`          | `DB_PASSWORD` or `postgres` |
//! | dbname      | `postgres`          | `DB_NAME` or `postgres`     |
//! | sslmode     | `disable`           | `DB_SSLMODE` or `disable`   |
//! | timeout     | 5 s                 | `DB_TIMEOUT` (s) or 30 s    |
//! | max_conns   | 10                  | `DB_MAX_CONNS` or 50        |
//!
//! Unparseable numeric environment values fall back to the default rather
//! than failing; a malformed `sslmode` is rejected at connect time, before
//! any I/O.

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::error::DbError;

/// Connection parameters for a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct Config {
    /// Database server hostname.
    pub host: String,

    /// Database server port.
    pub port: u16,

    /// Role to authenticate as.
    pub user: String,

    /// Password for `user`.
    pub password: String,

    /// Database to connect to.
    pub dbname: String,

    /// SSL mode string: one of `disable`, `allow`, `prefer`, `require`,
    /// `verify-ca`, `verify-full`.
    pub sslmode: String,

    /// Deadline covering pool creation plus the initial ping, and the
    /// per-operation acquire timeout afterwards.
    pub timeout: Duration,

    /// Maximum number of pooled connections.
    pub max_conns: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            dbname: "postgres".to_string(),
            sslmode: "disable".to_string(),
            timeout: Duration::from_secs(5),
            max_conns: 10,
        }
    }
}

impl Config {
    /// Builds a configuration from `DB_*` environment variables.
    ///
    /// Defaults are tuned for deployed environments (30 s timeout, 50
    /// connections) rather than the tighter direct-construction defaults.
    pub fn from_env() -> Self {
        Self {
            host: env_string("DB_HOST", "localhost"),
            port: env_parse("DB_PORT", 5432),
            user: env_string("DB_USER", "postgres"),
            password: env_string("DB_PASSWORD", "postgres"),
            dbname: env_string("DB_NAME", "postgres"),
            sslmode: env_string("DB_SSLMODE", "disable"),
            timeout: Duration::from_secs(env_parse("DB_TIMEOUT", 30)),
            max_conns: env_parse("DB_MAX_CONNS", 50),
        }
    }

    /// Turns the configuration into driver connect options.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if `sslmode` is not a recognized mode.
    pub(crate) fn connect_options(&self) -> Result<PgConnectOptions, DbError> {
        let ssl_mode = parse_ssl_mode(&self.sslmode)?;

        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.dbname)
            .ssl_mode(ssl_mode))
    }
}

fn parse_ssl_mode(mode: &str) -> Result<PgSslMode, DbError> {
    match mode {
        "disable" => Ok(PgSslMode::Disable),
        "allow" => Ok(PgSslMode::Allow),
        "prefer" => Ok(PgSslMode::Prefer),
        "require" => Ok(PgSslMode::Require),
        "verify-ca" => Ok(PgSslMode::VerifyCa),
        "verify-full" => Ok(PgSslMode::VerifyFull),
        other => Err(DbError::Config(format!("unknown sslmode: {other}"))),
    }
}

fn env_string(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

fn env_parse<T: FromStr + Copy>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(fallback)
}
