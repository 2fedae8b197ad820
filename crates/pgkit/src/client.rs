//! Pooled client lifecycle and the transaction runner.

use std::sync::{PoisonError, RwLock};

use futures::future::BoxFuture;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Connection, Postgres, Transaction};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::DbError;

/// A pooled PostgreSQL client.
///
/// Construction does no I/O; [`connect`](Client::connect) builds the pool and
/// verifies reachability. The pool is the only shared mutable resource and is
/// internally synchronized — a `Client` can be shared across tasks by
/// reference, and each operation checks out a connection exclusively for its
/// duration.
pub struct Client {
    cfg: Config,
    pool: RwLock<Option<PgPool>>,
}

impl Client {
    /// Creates an unconnected client from explicit configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            pool: RwLock::new(None),
        }
    }

    /// Creates an unconnected client from `DB_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(Config::from_env())
    }

    /// Establishes the connection pool and pings the database.
    ///
    /// The configured timeout bounds pool creation and the initial ping as a
    /// single deadline; on any failure no pool is retained. Nothing is
    /// retried.
    ///
    /// # Errors
    ///
    /// - [`DbError::Config`] if the configuration cannot be parsed.
    /// - [`DbError::Connect`] if the pool cannot be created.
    /// - [`DbError::Ping`] if the database is unreachable once the pool exists.
    /// - [`DbError::ConnectTimeout`] if the whole sequence exceeds the timeout.
    pub async fn connect(&self) -> Result<(), DbError> {
        let options = self.cfg.connect_options()?;

        debug!(
            host = %self.cfg.host,
            port = self.cfg.port,
            dbname = %self.cfg.dbname,
            "connecting to PostgreSQL"
        );

        let connect_and_ping = async {
            let pool = PgPoolOptions::new()
                .max_connections(self.cfg.max_conns)
                .acquire_timeout(self.cfg.timeout)
                .connect_with(options)
                .await
                .map_err(DbError::Connect)?;

            let mut conn = pool.acquire().await.map_err(DbError::Ping)?;
            conn.ping().await.map_err(DbError::Ping)?;
            drop(conn);

            Ok::<PgPool, DbError>(pool)
        };

        let pool = tokio::time::timeout(self.cfg.timeout, connect_and_ping)
            .await
            .map_err(|_| DbError::ConnectTimeout(self.cfg.timeout))
            .and_then(|result| result)
            .inspect_err(|e| error!(error = %e, "failed to connect to PostgreSQL"))?;

        *self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(pool);

        info!(
            host = %self.cfg.host,
            port = self.cfg.port,
            dbname = %self.cfg.dbname,
            "connected to PostgreSQL"
        );
        Ok(())
    }

    /// Verifies the database is reachable through the pool.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotConnected`] before [`connect`](Client::connect),
    /// or [`DbError::Ping`] if the round trip fails.
    pub async fn ping(&self) -> Result<(), DbError> {
        let pool = self.pool()?;
        let mut conn = pool.acquire().await.map_err(DbError::Ping)?;
        conn.ping().await.map_err(|e| {
            error!(error = %e, "failed to ping database");
            DbError::Ping(e)
        })?;
        debug!("database ping ok");
        Ok(())
    }

    /// Closes the pool and releases all connections.
    ///
    /// Idempotent: a no-op on a never-connected or already-closed client.
    pub async fn close(&self) {
        let pool = self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(pool) = pool {
            pool.close().await;
            debug!("closed connection pool");
        }
    }

    /// Returns a handle to the underlying pool for ad hoc driver use.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotConnected`] before [`connect`](Client::connect).
    pub fn pool(&self) -> Result<PgPool, DbError> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DbError::NotConnected)
    }

    /// Runs `work` inside a transaction with all-or-nothing semantics.
    ///
    /// Exactly one of commit or rollback is attempted per invocation and the
    /// transaction is never left open on return:
    ///
    /// - begin fails → [`DbError::BeginTransaction`], `work` never runs;
    /// - `work` fails and rollback succeeds → the work error, unchanged;
    /// - `work` fails and rollback fails → [`DbError::RollbackFailed`]
    ///   carrying both;
    /// - `work` succeeds but commit fails → [`DbError::CommitTransaction`].
    ///
    /// If the returned future is dropped mid-flight, the driver rolls the
    /// open transaction back when the connection is returned to the pool;
    /// `work` must not assume partial effects were committed.
    ///
    /// ```rust,ignore
    /// client
    ///     .run_in_transaction(|tx| {
    ///         Box::pin(async move {
    ///             sqlx::query("INSERT INTO audit (entry) VALUES ($1)")
    ///                 .bind("created")
    ///                 .execute(&mut **tx)
    ///                 .await
    ///                 .map_err(|e| DbError::Query { operation: "insert audit", source: e })?;
    ///             Ok(())
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn run_in_transaction<F>(&self, work: F) -> Result<(), DbError>
    where
        F: for<'t> FnOnce(
            &'t mut Transaction<'static, Postgres>,
        ) -> BoxFuture<'t, Result<(), DbError>>,
    {
        let pool = self.pool()?;

        debug!("beginning transaction");
        let mut tx = pool.begin().await.map_err(|e| {
            error!(error = %e, "failed to begin transaction");
            DbError::BeginTransaction(e)
        })?;

        if let Err(work_err) = work(&mut tx).await {
            return match tx.rollback().await {
                Ok(()) => {
                    error!(error = %work_err, "transaction failed, rolled back");
                    Err(work_err)
                }
                Err(rollback_err) => {
                    error!(
                        error = %work_err,
                        rollback_error = %rollback_err,
                        "transaction failed and rollback failed"
                    );
                    Err(DbError::RollbackFailed {
                        work: Box::new(work_err),
                        rollback: rollback_err,
                    })
                }
            };
        }

        tx.commit().await.map_err(|e| {
            error!(error = %e, "failed to commit transaction");
            DbError::CommitTransaction(e)
        })?;

        debug!("transaction committed");
        Ok(())
    }
}
