//! SQLite connection helper.
//!
//! Generalizes the teacher's `db.rs` (a single fixed-path pool) into a
//! per-[`DatabaseHandleConfig`] connector used by the
//! [`crate::registries::databases::DatabaseHandleRegistry`]. The database
//! engine itself is SQLite regardless of a handle's configured `dsn` shape
//! — per spec.md §1, implementing another backend's SQL dialect is a
//! non-goal; the DSN is treated as a local SQLite path/URI.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// Open a pool against `dsn`, creating the file and parent directories if
/// missing, with WAL mode enabled for concurrent read/write.
pub async fn connect(dsn: &str, timeout_secs: u64) -> Result<SqlitePool> {
    let path = dsn.trim_start_matches("sqlite:").trim_start_matches("//");
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("creating database parent directory")?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{path}"))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_with(options)
        .await
        .context("connecting to database handle")?;

    Ok(pool)
}

/// Ping a pool with a bounded timeout (§5 "Database pings use a short
/// bounded timeout (default 5s)").
pub async fn ping(pool: &SqlitePool, timeout_secs: u64) -> Result<()> {
    tokio::time::timeout(Duration::from_secs(timeout_secs), sqlx::query("SELECT 1").execute(pool))
        .await
        .context("database ping timed out")?
        .context("database ping failed")?;
    Ok(())
}
