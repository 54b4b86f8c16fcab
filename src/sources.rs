//! Source mount registry.
//!
//! A mount attaches an external directory to the index under an alias;
//! every document indexed from it carries an `alias/`-prefixed path and a
//! `source_id`. With no mounts, the configured root is indexed unprefixed.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::error::QuarryError;
use crate::models::SourceMount;
use crate::scan::ScanRoot;

/// Loads all mounts ordered by alias.
pub async fn list_mounts(pool: &SqlitePool) -> Result<Vec<SourceMount>> {
    let rows = sqlx::query(
        "SELECT id, alias, absolute_path, added_at, last_indexed_at, file_count \
         FROM sources ORDER BY alias",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| SourceMount {
            id: row.get("id"),
            alias: row.get("alias"),
            absolute_path: row.get("absolute_path"),
            added_at: row.get("added_at"),
            last_indexed_at: row.get("last_indexed_at"),
            file_count: row.get("file_count"),
        })
        .collect())
}

/// Resolves the roots an index pass walks: every mount under its alias,
/// or the configured root alone when nothing is mounted.
pub async fn roots_for_index(pool: &SqlitePool, config: &Config) -> Result<Vec<ScanRoot>> {
    let mounts = list_mounts(pool).await?;
    if mounts.is_empty() {
        return Ok(vec![ScanRoot {
            source_id: None,
            alias: None,
            path: config.index.root.clone(),
        }]);
    }
    Ok(mounts
        .into_iter()
        .map(|mount| ScanRoot {
            source_id: Some(mount.id),
            alias: Some(mount.alias),
            path: mount.absolute_path.into(),
        })
        .collect())
}

/// Registers a directory under an alias. The path is canonicalized so
/// later scans are stable against relative invocation directories.
pub async fn run_mount(config: &Config, alias: &str, path: &str) -> Result<()> {
    let alias = alias.trim();
    if alias.is_empty() || alias.contains(['/', '\\']) {
        return Err(
            QuarryError::Input("alias must be non-empty and contain no path separators".to_string())
                .into(),
        );
    }

    let dir = Path::new(path);
    if !dir.is_dir() {
        return Err(QuarryError::Input(format!("not a directory: {}", path)).into());
    }
    let absolute = dir.canonicalize().map_err(|e| QuarryError::TransientIo {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    let absolute = absolute.to_string_lossy().to_string();

    let pool = db::open_existing(config).await?;

    let clash = sqlx::query("SELECT alias FROM sources WHERE alias = ? OR absolute_path = ?")
        .bind(alias)
        .bind(&absolute)
        .fetch_optional(&pool)
        .await?;
    if let Some(row) = clash {
        let existing: String = row.get("alias");
        pool.close().await;
        return Err(QuarryError::Input(format!(
            "alias or path already mounted (as '{}')",
            existing
        ))
        .into());
    }

    sqlx::query("INSERT INTO sources (alias, absolute_path, added_at) VALUES (?, ?, ?)")
        .bind(alias)
        .bind(&absolute)
        .bind(Utc::now().timestamp())
        .execute(&pool)
        .await?;

    println!("mounted {} -> {}", alias, absolute);
    println!("run `qry index` to pick up its files");

    pool.close().await;
    Ok(())
}

/// Removes a mount and every document indexed from it, in one
/// transaction so a failure leaves the mount intact.
pub async fn run_unmount(config: &Config, alias: &str) -> Result<()> {
    let pool = db::open_existing(config).await?;

    let row = sqlx::query("SELECT id FROM sources WHERE alias = ?")
        .bind(alias)
        .fetch_optional(&pool)
        .await?;
    let source_id: i64 = match row {
        Some(row) => row.get("id"),
        None => {
            pool.close().await;
            return Err(QuarryError::Input(format!("no mount named '{}'", alias)).into());
        }
    };

    let mut tx = pool.begin().await?;
    sqlx::query(
        "DELETE FROM sections WHERE document_id IN (SELECT id FROM documents WHERE source_id = ?)",
    )
    .bind(source_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "DELETE FROM documents_fts WHERE document_id IN \
         (SELECT id FROM documents WHERE source_id = ?)",
    )
    .bind(source_id)
    .execute(&mut *tx)
    .await?;
    let removed = sqlx::query("DELETE FROM documents WHERE source_id = ?")
        .bind(source_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM sources WHERE id = ?")
        .bind(source_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    println!("unmounted {} ({} documents removed)", alias, removed);

    pool.close().await;
    Ok(())
}

/// Prints the mount table.
pub async fn run_sources(config: &Config) -> Result<()> {
    let pool = db::open_existing(config).await?;
    let mounts = list_mounts(&pool).await?;

    if mounts.is_empty() {
        println!("No sources mounted. Indexing uses the configured root:");
        println!("  {}", config.index.root.display());
        pool.close().await;
        return Ok(());
    }

    println!("{:<16} {:>8}  {:<20} path", "alias", "files", "last indexed");
    for mount in &mounts {
        let last = match mount.last_indexed_at {
            Some(ts) => crate::stats::format_ts_relative(ts),
            None => "never".to_string(),
        };
        println!(
            "{:<16} {:>8}  {:<20} {}",
            mount.alias, mount.file_count, last, mount.absolute_path
        );
    }

    pool.close().await;
    Ok(())
}
