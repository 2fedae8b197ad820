//! Query and statement execution against the pool.
//!
//! Statements are built with `sqlx::query(..).bind(..)` and handed to the
//! client, which logs them, runs them against the pool, and wraps failures
//! with the operation name. Batches run on a single checked-out connection
//! in submission order and abort at the first failing statement.

use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Execute, Postgres};
use tracing::{debug, error};

use crate::client::Client;
use crate::error::DbError;

/// A bound statement ready to execute, as produced by `sqlx::query`.
pub type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

impl Client {
    /// Runs a query expected to return exactly one row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Query`] on driver failure, including the
    /// zero-rows and more-than-one-row cases.
    pub async fn query_one(&self, query: PgQuery<'_>) -> Result<PgRow, DbError> {
        let pool = self.pool()?;
        let sql = query.sql();
        debug!(sql, "executing query_one");

        query.fetch_one(&pool).await.map_err(|source| {
            error!(sql, error = %source, "query_one failed");
            DbError::Query {
                operation: "query_one",
                source,
            }
        })
    }

    /// Runs a query expected to return zero or one rows.
    pub async fn query_opt(&self, query: PgQuery<'_>) -> Result<Option<PgRow>, DbError> {
        let pool = self.pool()?;
        let sql = query.sql();
        debug!(sql, "executing query_opt");

        query.fetch_optional(&pool).await.map_err(|source| {
            error!(sql, error = %source, "query_opt failed");
            DbError::Query {
                operation: "query_opt",
                source,
            }
        })
    }

    /// Runs a query and collects every result row.
    ///
    /// The connection is returned to the pool before this resolves; there is
    /// no cursor for the caller to close.
    pub async fn query_many(&self, query: PgQuery<'_>) -> Result<Vec<PgRow>, DbError> {
        let pool = self.pool()?;
        let sql = query.sql();
        debug!(sql, "executing query_many");

        let rows = query.fetch_all(&pool).await.map_err(|source| {
            error!(sql, error = %source, "query_many failed");
            DbError::Query {
                operation: "query_many",
                source,
            }
        })?;

        debug!(sql, rows = rows.len(), "query_many complete");
        Ok(rows)
    }

    /// Runs a single statement and returns the number of rows affected.
    pub async fn exec(&self, query: PgQuery<'_>) -> Result<u64, DbError> {
        let pool = self.pool()?;
        let sql = query.sql();
        debug!(sql, "executing exec");

        let result = query.execute(&pool).await.map_err(|source| {
            error!(sql, error = %source, "exec failed");
            DbError::Query {
                operation: "exec",
                source,
            }
        })?;

        debug!(sql, rows_affected = result.rows_affected(), "exec complete");
        Ok(result.rows_affected())
    }

    /// Runs a sequence of statements on one checked-out connection, in
    /// submission order, stopping at the first failure.
    ///
    /// Statements are independent — there is no implicit transaction, so the
    /// effects of statements before the failing one remain visible.
    /// Statements after it never execute. An empty batch succeeds without
    /// touching the database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Batch`] carrying the zero-based index of the first
    /// failing statement.
    pub async fn exec_batch(&self, steps: Vec<PgQuery<'_>>) -> Result<(), DbError> {
        let pool = self.pool()?;
        debug!(statements = steps.len(), "executing batch");

        if steps.is_empty() {
            return Ok(());
        }

        let mut conn = pool.acquire().await.map_err(|source| DbError::Query {
            operation: "exec_batch acquire",
            source,
        })?;

        for (index, step) in steps.into_iter().enumerate() {
            let sql = step.sql();
            if let Err(source) = step.execute(&mut *conn).await {
                error!(index, sql, error = %source, "batch statement failed");
                return Err(DbError::Batch { index, source });
            }
        }

        debug!("batch complete");
        Ok(())
    }
}
