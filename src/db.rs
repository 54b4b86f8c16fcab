use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;
use crate::error::QuarryError;

/// Opens the store, creating the database file if needed.
///
/// Used by `init` and `index`; read-only commands go through
/// [`open_existing`] so a typo'd store path fails loudly instead of
/// materializing an empty database.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.store.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Opens an already-initialized store.
pub async fn open_existing(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.store.path;

    if !db_path.exists() {
        return Err(QuarryError::Configuration(format!(
            "store not initialized: {} (run `qry init` first)",
            db_path.display()
        ))
        .into());
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
