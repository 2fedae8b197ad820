//! Error types for the pgkit client.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur across the client, executor, transaction runner,
/// and migration manager.
///
/// Every variant names the operation that failed; batch and migration errors
/// additionally carry the statement index or migration version. Nothing in
/// this crate panics on failure — every error is returned to the caller.
#[derive(Debug, Error)]
pub enum DbError {
    /// The connection configuration could not be turned into driver options.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failed to create the connection pool.
    #[error("failed to create connection pool: {0}")]
    Connect(#[source] sqlx::Error),

    /// Failed to ping the database.
    #[error("failed to ping database: {0}")]
    Ping(#[source] sqlx::Error),

    /// Pool creation plus the initial ping exceeded the configured timeout.
    #[error("timed out after {0:?} while connecting to database")]
    ConnectTimeout(Duration),

    /// An operation was attempted before `connect()` (or after `close()`).
    #[error("connection pool is not initialized")]
    NotConnected,

    /// A query or statement failed.
    #[error("{operation} failed: {source}")]
    Query {
        /// The client operation that issued the statement.
        operation: &'static str,
        /// The underlying driver error.
        source: sqlx::Error,
    },

    /// A statement within a batch failed. Statements after `index` were
    /// not executed.
    #[error("batch statement {index} failed: {source}")]
    Batch {
        /// Zero-based position of the failing statement in the batch.
        index: usize,
        /// The underlying driver error.
        source: sqlx::Error,
    },

    /// Failed to begin a transaction; the work function was never invoked.
    #[error("failed to begin transaction: {0}")]
    BeginTransaction(#[source] sqlx::Error),

    /// Failed to commit a transaction.
    #[error("failed to commit transaction: {0}")]
    CommitTransaction(#[source] sqlx::Error),

    /// The work function failed and the subsequent rollback failed too.
    /// Both failures are preserved so callers can tell this apart from a
    /// work failure with a clean rollback (which returns the work error
    /// unchanged).
    #[error("transaction failed: {work}; rollback also failed: {rollback}")]
    RollbackFailed {
        /// The error returned by the work function.
        work: Box<DbError>,
        /// The error from the rollback attempt.
        rollback: sqlx::Error,
    },

    /// The migrations directory could not be read.
    #[error("failed to read migrations directory {path}: {source}")]
    MigrationDir {
        /// The directory that was being scanned.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A migration file could not be read.
    #[error("failed to read migration file {path}: {source}")]
    MigrationFile {
        /// The file that was being loaded.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Applying a migration failed; the schema change and its ledger row
    /// were both rolled back.
    #[error("failed to apply migration {version}: {source}")]
    MigrationApply {
        /// Version of the migration that failed.
        version: i32,
        /// The underlying transaction error.
        source: Box<DbError>,
    },

    /// Rolling back a migration failed; the reverse SQL and the ledger
    /// row deletion were both undone.
    #[error("failed to roll back migration {version}: {source}")]
    MigrationRollback {
        /// Version of the migration that failed to roll back.
        version: i32,
        /// The underlying transaction error.
        source: Box<DbError>,
    },

    /// `rollback_last` was called on an empty ledger.
    #[error("no migrations have been applied; nothing to roll back")]
    NoMigrationsApplied,

    /// `rollback_last` found no reverse SQL for the latest applied version.
    /// No SQL was executed and the ledger row was left in place.
    #[error("no rollback registered for migration {version}")]
    NoRollbackRegistered {
        /// The version missing from the caller-supplied rollback table.
        version: i32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_rollback_error_carries_both_failures() {
        let err = DbError::RollbackFailed {
            work: Box::new(DbError::Query {
                operation: "exec",
                source: sqlx::Error::PoolClosed,
            }),
            rollback: sqlx::Error::PoolClosed,
        };

        let message = err.to_string();
        assert!(message.contains("transaction failed"), "message: {message}");
        assert!(
            message.contains("rollback also failed"),
            "message: {message}"
        );

        // Both halves must stay reachable for callers that need to
        // distinguish the composite case from a clean rollback.
        match err {
            DbError::RollbackFailed { work, .. } => {
                assert!(matches!(*work, DbError::Query { operation: "exec", .. }))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn batch_error_reports_zero_based_index() {
        let err = DbError::Batch {
            index: 2,
            source: sqlx::Error::PoolClosed,
        };
        assert!(err.to_string().starts_with("batch statement 2 failed"));
    }

    #[test]
    fn rollback_bookkeeping_errors_are_distinct() {
        let empty = DbError::NoMigrationsApplied;
        let missing = DbError::NoRollbackRegistered { version: 7 };

        assert_eq!(
            empty.to_string(),
            "no migrations have been applied; nothing to roll back"
        );
        assert_eq!(missing.to_string(), "no rollback registered for migration 7");
    }
}
