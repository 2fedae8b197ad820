//! Applies pending migrations from a directory, then reports the ledger.
//!
//! Connection settings come from the `DB_*` environment variables; the
//! migrations directory is the first CLI argument (default `migrations`).
//!
//! ```sh
//! DB_HOST=localhost DB_NAME=app cargo run --example migrate -- ./migrations
//! ```

use pgkit::{load_from_dir, Client, DbError, MigrationManager};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), DbError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let dir = std::env::args().nth(1).unwrap_or_else(|| "migrations".to_string());

    let client = Client::from_env();
    client.connect().await?;

    let migrations = load_from_dir(&dir)?;
    println!("discovered {} migrations in {dir}", migrations.len());

    let manager = MigrationManager::new(&client);
    let applied = manager.migrate(&migrations).await?;
    println!("applied {applied} migrations");

    for (version, applied_at) in manager.applied_versions().await? {
        println!("  {version:>4}  applied at {applied_at}");
    }

    client.close().await;
    Ok(())
}
