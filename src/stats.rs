//! Store statistics and health overview.
//!
//! Provides a quick summary of what's indexed: document and section counts,
//! per-type and per-source breakdowns, and manifest staleness. Used by
//! `qry stats` to give confidence that index passes are keeping up.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::index;

/// Manifest older than this is flagged stale in the overview.
const STALE_AFTER_MINUTES: i64 = 60;

/// Per-source breakdown of document and section counts.
struct SourceStats {
    alias: String,
    doc_count: i64,
    section_count: i64,
    last_indexed_ts: Option<i64>,
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::open_existing(config).await?;

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;

    let total_sections: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sections")
        .fetch_one(&pool)
        .await?;

    let store_size = std::fs::metadata(&config.store.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Quarry — Store Stats");
    println!("====================");
    println!();
    println!("  Store:       {}", config.store.path.display());
    println!("  Size:        {}", format_bytes(store_size));
    println!();
    println!("  Documents:   {}", total_docs);
    println!("  Sections:    {}", total_sections);

    match index::load_manifest(&pool).await? {
        Some(manifest) => {
            let staleness = if index::is_stale(&pool, STALE_AFTER_MINUTES).await? {
                " (stale)"
            } else {
                ""
            };
            println!(
                "  Last index:  {}{}",
                format_ts_relative(manifest.last_indexed_at),
                staleness
            );
            println!("  Fingerprint: {}", manifest.aggregate_fingerprint);
        }
        None => println!("  Last index:  never"),
    }

    // Per-type breakdown
    let type_rows = sqlx::query(
        "SELECT doc_type, COUNT(*) AS doc_count FROM documents \
         GROUP BY doc_type ORDER BY doc_count DESC",
    )
    .fetch_all(&pool)
    .await?;

    if !type_rows.is_empty() {
        println!();
        println!("  By type:");
        for row in &type_rows {
            let doc_type: String = row.get("doc_type");
            let count: i64 = row.get("doc_count");
            println!("  {:<16} {:>6}", doc_type, count);
        }
    }

    // Per-source breakdown
    let source_rows = sqlx::query(
        r#"
        SELECT
            s.alias,
            s.last_indexed_at,
            COUNT(DISTINCT d.id) AS doc_count,
            COUNT(sec.id) AS section_count
        FROM sources s
        LEFT JOIN documents d ON d.source_id = s.id
        LEFT JOIN sections sec ON sec.document_id = d.id
        GROUP BY s.id
        ORDER BY doc_count DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let source_stats: Vec<SourceStats> = source_rows
        .iter()
        .map(|row| SourceStats {
            alias: row.get("alias"),
            doc_count: row.get("doc_count"),
            section_count: row.get("section_count"),
            last_indexed_ts: row.get("last_indexed_at"),
        })
        .collect();

    if !source_stats.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<24} {:>6} {:>10}   {}",
            "SOURCE", "DOCS", "SECTIONS", "LAST INDEXED"
        );
        println!("  {}", "-".repeat(64));

        for s in &source_stats {
            let indexed_display = match s.last_indexed_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<24} {:>6} {:>10}   {}",
                s.alias, s.doc_count, s.section_count, indexed_display
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
pub fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
