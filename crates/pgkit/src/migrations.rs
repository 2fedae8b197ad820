//! Version-tracked schema migrations.
//!
//! Forward migrations are SQL files named `{version}_{description}.sql`,
//! discovered with [`load_from_dir`] and applied in ascending version order.
//! Applied versions are recorded in the `_pgkit_migrations` ledger table,
//! which is the single source of truth — it is re-read on every run, and a
//! migration runs exactly once. Each apply is one transaction: the migration
//! body and its ledger row share fate.
//!
//! Rollback is deliberately asymmetric: reverse SQL is supplied by the
//! caller at rollback time rather than discovered from files, and only the
//! most recently applied migration can be rolled back per call.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::{Executor, Row};
use tracing::{debug, info};

use crate::client::Client;
use crate::error::DbError;

const LEDGER_TABLE: &str = "_pgkit_migrations";

const CREATE_LEDGER: &str = "CREATE TABLE IF NOT EXISTS _pgkit_migrations (
    id BIGSERIAL PRIMARY KEY,
    version INT NOT NULL UNIQUE,
    description TEXT NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)";

/// A single schema migration.
///
/// Identity is the version number alone — there is no content checksum, so
/// editing an already-applied file goes undetected.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique, ascending version parsed from the filename.
    pub version: i32,

    /// Filename without its `.sql` extension.
    pub description: String,

    /// The migration body, verbatim file content.
    pub sql: String,

    /// When the migration was discovered on disk.
    pub discovered_at: DateTime<Utc>,
}

/// Applies and rolls back migrations through a [`Client`].
///
/// Owns no persistent state of its own; everything lives in the ledger.
pub struct MigrationManager<'a> {
    client: &'a Client,
}

impl<'a> MigrationManager<'a> {
    /// Creates a manager over a connected client.
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Idempotently creates the ledger table. Safe to call on every startup.
    pub async fn init_ledger(&self) -> Result<(), DbError> {
        self.client.exec(sqlx::query(CREATE_LEDGER)).await?;
        debug!(table = LEDGER_TABLE, "migration ledger ready");
        Ok(())
    }

    /// Reads the full ledger, ascending by version.
    ///
    /// Returns an empty map when no migration has been applied.
    pub async fn applied_versions(&self) -> Result<BTreeMap<i32, DateTime<Utc>>, DbError> {
        let rows = self
            .client
            .query_many(sqlx::query(
                "SELECT version, applied_at FROM _pgkit_migrations ORDER BY version",
            ))
            .await?;

        let mut applied = BTreeMap::new();
        for row in rows {
            let version: i32 = row.try_get("version").map_err(decode_err)?;
            let applied_at: DateTime<Utc> = row.try_get("applied_at").map_err(decode_err)?;
            applied.insert(version, applied_at);
        }
        Ok(applied)
    }

    /// Applies one migration: its body plus a ledger row, in one transaction.
    ///
    /// If either step fails the whole transaction rolls back and neither the
    /// schema change nor the ledger row persists.
    pub async fn apply_one(&self, migration: &Migration) -> Result<(), DbError> {
        let version = migration.version;
        info!(version, description = %migration.description, "applying migration");

        let sql = migration.sql.clone();
        let description = migration.description.clone();

        self.client
            .run_in_transaction(move |tx| {
                Box::pin(async move {
                    // raw_sql: migration bodies may hold several statements,
                    // which the prepared-statement path refuses. Invoked via
                    // Executor::execute — RawSql's inherent async method trips
                    // rust-lang/rust#89976 under run_in_transaction's
                    // higher-ranked closure bound.
                    (&mut **tx)
                        .execute(sqlx::raw_sql(&sql))
                        .await
                        .map_err(|source| DbError::Query {
                            operation: "migration body",
                            source,
                        })?;

                    sqlx::query(
                        "INSERT INTO _pgkit_migrations (version, description, applied_at)
                         VALUES ($1, $2, $3)",
                    )
                    .bind(version)
                    .bind(&description)
                    .bind(Utc::now())
                    .execute(&mut **tx)
                    .await
                    .map_err(|source| DbError::Query {
                        operation: "ledger insert",
                        source,
                    })?;

                    Ok(())
                })
            })
            .await
            .map_err(|source| DbError::MigrationApply {
                version,
                source: Box::new(source),
            })
    }

    /// Ensures the ledger exists, then applies every pending migration in
    /// ascending version order, regardless of the input ordering.
    ///
    /// Already-applied versions are skipped without re-execution. Stops at
    /// the first failure; migrations applied earlier in the same call stay
    /// committed. Returns how many migrations were applied.
    pub async fn migrate(&self, migrations: &[Migration]) -> Result<usize, DbError> {
        self.init_ledger().await?;
        let applied = self.applied_versions().await?;

        let mut ordered: Vec<&Migration> = migrations.iter().collect();
        ordered.sort_by_key(|m| m.version);

        let mut count = 0;
        for migration in ordered {
            if applied.contains_key(&migration.version) {
                debug!(
                    version = migration.version,
                    "migration already applied, skipping"
                );
                continue;
            }

            self.apply_one(migration).await?;
            count += 1;
        }

        Ok(count)
    }

    /// Rolls back the most recently applied migration.
    ///
    /// Looks up the highest ledger version in the caller-supplied rollback
    /// table, then runs the reverse SQL and deletes the ledger row in one
    /// transaction. Returns the version that was rolled back.
    ///
    /// # Errors
    ///
    /// - [`DbError::NoMigrationsApplied`] if the ledger is empty.
    /// - [`DbError::NoRollbackRegistered`] if the version has no entry in
    ///   `rollbacks`; nothing is executed and the ledger row stays.
    /// - [`DbError::MigrationRollback`] if the transaction fails; the
    ///   reverse SQL and the row deletion are both undone.
    pub async fn rollback_last(&self, rollbacks: &HashMap<i32, String>) -> Result<i32, DbError> {
        let row = self
            .client
            .query_opt(sqlx::query(
                "SELECT version FROM _pgkit_migrations ORDER BY version DESC LIMIT 1",
            ))
            .await?;

        let Some(row) = row else {
            return Err(DbError::NoMigrationsApplied);
        };
        let version: i32 = row.try_get("version").map_err(decode_err)?;

        let Some(rollback_sql) = rollbacks.get(&version) else {
            return Err(DbError::NoRollbackRegistered { version });
        };

        info!(version, "rolling back migration");

        let rollback_sql = rollback_sql.clone();
        self.client
            .run_in_transaction(move |tx| {
                Box::pin(async move {
                    (&mut **tx)
                        .execute(sqlx::raw_sql(&rollback_sql))
                        .await
                        .map_err(|source| DbError::Query {
                            operation: "rollback body",
                            source,
                        })?;

                    sqlx::query("DELETE FROM _pgkit_migrations WHERE version = $1")
                        .bind(version)
                        .execute(&mut **tx)
                        .await
                        .map_err(|source| DbError::Query {
                            operation: "ledger delete",
                            source,
                        })?;

                    Ok(())
                })
            })
            .await
            .map_err(|source| DbError::MigrationRollback {
                version,
                source: Box::new(source),
            })?;

        Ok(version)
    }
}

fn decode_err(source: sqlx::Error) -> DbError {
    DbError::Query {
        operation: "ledger decode",
        source,
    }
}

/// Loads migrations from `*.sql` files in `path`, non-recursively.
///
/// A file participates when its name splits on the first `_` into a leading
/// non-negative integer and a remainder; anything else (no separator,
/// non-numeric version, other extensions, subdirectories) is silently
/// skipped. File contents become the migration body verbatim. The result is
/// sorted ascending by version.
///
/// # Errors
///
/// Directory or file read failures are fatal for the whole load.
pub fn load_from_dir(path: impl AsRef<Path>) -> Result<Vec<Migration>, DbError> {
    let path = path.as_ref();
    let entries = std::fs::read_dir(path).map_err(|source| DbError::MigrationDir {
        path: path.to_path_buf(),
        source,
    })?;

    let mut migrations = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DbError::MigrationDir {
            path: path.to_path_buf(),
            source,
        })?;

        if entry.path().is_dir() {
            continue;
        }

        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(stem) = name.strip_suffix(".sql") else {
            continue;
        };
        let Some((version_token, _)) = name.split_once('_') else {
            continue;
        };
        let Ok(version) = version_token.parse::<i32>() else {
            continue;
        };
        if version < 0 {
            continue;
        }

        let sql = std::fs::read_to_string(entry.path()).map_err(|source| {
            DbError::MigrationFile {
                path: entry.path(),
                source,
            }
        })?;

        debug!(version, file = name, "discovered migration");
        migrations.push(Migration {
            version,
            description: stem.to_string(),
            sql,
            discovered_at: Utc::now(),
        });
    }

    migrations.sort_by_key(|m| m.version);
    Ok(migrations)
}
