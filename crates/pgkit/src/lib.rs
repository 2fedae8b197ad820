//! Thin convenience layer over `sqlx` for PostgreSQL.
//!
//! Provides a pooled [`Client`] with connect/ping/close lifecycle, query and
//! batch execution helpers, a closure-based transaction runner with strict
//! commit-xor-rollback semantics, and a version-tracked schema
//! [`MigrationManager`]. The wire protocol itself is entirely the driver's
//! concern; this crate is the plumbing around it.
//!
//! # Design decisions
//!
//! - **Shared pool, no globals**: the pool lives inside the `Client` and is
//!   internally synchronized; components receive the client by reference
//!   rather than reaching for process-wide state.
//! - **Fail fast, wrap, return**: no layer retries. Every failure is wrapped
//!   into a [`DbError`] naming the operation (and statement index or
//!   migration version where applicable) and returned to the caller.
//! - **Ledger as the source of truth**: applied migration versions live in
//!   the `_pgkit_migrations` table, re-read on every run; the manager keeps
//!   no cache across runs.
//! - **Observability is a side channel**: structured `tracing` events are
//!   emitted throughout, but the crate behaves identically with no
//!   subscriber installed.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pgkit::{Client, Config, MigrationManager};
//!
//! let client = Client::new(Config::default());
//! client.connect().await?;
//!
//! let migrations = pgkit::load_from_dir("migrations")?;
//! let manager = MigrationManager::new(&client);
//! let applied = manager.migrate(&migrations).await?;
//! println!("applied {applied} migrations");
//!
//! let row = client
//!     .query_one(sqlx::query("SELECT COUNT(*) AS n FROM users"))
//!     .await?;
//! ```

mod client;
mod config;
mod error;
mod migrations;
mod ops;

pub use client::Client;
pub use config::Config;
pub use error::DbError;
pub use migrations::{load_from_dir, Migration, MigrationManager};
pub use ops::PgQuery;

// Re-exported so callers can build queries and decode rows without naming
// the driver as a separate dependency.
pub use sqlx;
pub use sqlx::postgres::{PgPool, PgRow};
pub use sqlx::Row;
