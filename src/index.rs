//! The indexing pipeline: one atomic pass from filesystem state to
//! committed store state.
//!
//! A pass scans every root, diffs fingerprints against the store, and then
//! applies all deletions and upserts — documents, sections, and full-text
//! rows together — inside a single transaction. Either the whole pass
//! commits or none of it does; a failed pass leaves the previous index
//! intact. Per-file read and decode failures never abort the pass; they are
//! collected and reported alongside the counts.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::db;
use crate::error::QuarryError;
use crate::extract;
use crate::fingerprint::{aggregate_fingerprint, diff_states, StateDiff};
use crate::migrate;
use crate::models::Document;
use crate::scan::{self, ExcludeMatcher, FileError, ScannedFile};
use crate::sections::extract_sections;
use crate::sources;

/// Outcome of one indexing pass.
#[derive(Debug, Default)]
pub struct IndexReport {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub total: usize,
    pub errors: Vec<FileError>,
}

/// Everything a pass learned from walking the roots, before touching the
/// store.
struct ScanState {
    files: HashMap<String, ScannedFile>,
    fingerprints: HashMap<String, String>,
    errored: HashSet<String>,
    errors: Vec<FileError>,
}

async fn scan_all_roots(
    pool: &SqlitePool,
    config: &Config,
    extra_excludes: &[String],
) -> Result<ScanState> {
    let roots = sources::roots_for_index(pool, config).await?;

    let mut caller_patterns = config.index.exclude.clone();
    caller_patterns.extend(extra_excludes.iter().cloned());

    let mut state = ScanState {
        files: HashMap::new(),
        fingerprints: HashMap::new(),
        errored: HashSet::new(),
        errors: Vec::new(),
    };

    for root in &roots {
        if !root.path.is_dir() {
            state.errors.push(FileError {
                path: root.path.to_string_lossy().to_string(),
                message: "root directory does not exist".to_string(),
            });
            continue;
        }
        let matcher = ExcludeMatcher::standard(&root.path, &caller_patterns)?;
        let outcome = scan::scan_root(root, &matcher, config.index.max_file_bytes);
        tracing::debug!(
            root = %root.path.display(),
            files = outcome.files.len(),
            errors = outcome.errors.len(),
            "scanned root"
        );
        for err in outcome.errors {
            state.errored.insert(err.path.clone());
            state.errors.push(err);
        }
        for file in outcome.files {
            state.fingerprints.insert(file.path.clone(), file.fingerprint.clone());
            state.files.insert(file.path.clone(), file);
        }
    }

    Ok(state)
}

async fn indexed_fingerprints(pool: &SqlitePool) -> Result<HashMap<String, String>> {
    let rows = sqlx::query("SELECT path, fingerprint FROM documents")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("path"), row.get("fingerprint")))
        .collect())
}

/// Reads and decodes one scanned file into indexable text.
///
/// Binary document types go through the extractors; everything else is
/// UTF-8 with a Windows-1252 fallback.
fn read_document_text(file: &ScannedFile) -> Result<String, String> {
    let bytes = std::fs::read(&file.abs_path).map_err(|e| e.to_string())?;
    if extract::is_binary_doc_type(file.doc_type) {
        extract::extract_text(&bytes, file.doc_type).map_err(|e| e.to_string())
    } else {
        Ok(scan::decode_text(&bytes))
    }
}

/// Runs one indexing pass against an already-migrated store.
///
/// `full` drops all prior documents inside the same transaction as the
/// fresh pass, so an interrupted full re-index never leaves an empty store.
pub async fn index_pass(
    pool: &SqlitePool,
    config: &Config,
    extra_excludes: &[String],
    full: bool,
) -> Result<IndexReport> {
    let scan_state = scan_all_roots(pool, config, extra_excludes).await?;

    let indexed = if full {
        HashMap::new()
    } else {
        indexed_fingerprints(pool).await?
    };
    let diff = diff_states(&indexed, &scan_state.fingerprints, &scan_state.errored);

    tracing::info!(
        added = diff.added.len(),
        changed = diff.changed.len(),
        deleted = diff.deleted.len(),
        unchanged = diff.unchanged,
        "index pass diff"
    );

    let mut report = IndexReport {
        unchanged: diff.unchanged,
        total: scan_state.fingerprints.len(),
        errors: scan_state.errors,
        ..Default::default()
    };

    apply_changes(pool, &scan_state.files, &diff, full, &mut report)
        .await
        .map_err(|e| QuarryError::Integrity(e.to_string()))?;

    Ok(report)
}

/// Applies the diff inside one transaction: deletions first, then upserts,
/// then the manifest. Dropping the transaction on any error rolls the whole
/// pass back.
async fn apply_changes(
    pool: &SqlitePool,
    files: &HashMap<String, ScannedFile>,
    diff: &StateDiff,
    full: bool,
    report: &mut IndexReport,
) -> Result<()> {
    let now = Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    if full {
        sqlx::query("DELETE FROM sections").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents_fts").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;
    }

    for path in &diff.deleted {
        delete_document(&mut tx, path).await?;
        report.deleted += 1;
    }

    for path in diff.added.iter().chain(diff.changed.iter()) {
        let file = match files.get(path) {
            Some(file) => file,
            None => continue,
        };
        let content = match read_document_text(file) {
            Ok(content) => content,
            Err(message) => {
                tracing::debug!(path = %path, error = %message, "skipping unreadable file");
                report.errors.push(FileError {
                    path: path.clone(),
                    message,
                });
                continue;
            }
        };

        let document = Document {
            path: file.path.clone(),
            filename: file.filename.clone(),
            doc_type: file.doc_type.to_string(),
            content,
            fingerprint: file.fingerprint.clone(),
            size_bytes: file.size_bytes as i64,
            source_id: file.source_id,
            indexed_at: now,
        };

        // Wholesale replacement: the old row, its sections, and its
        // full-text entry all go before the new ones land.
        delete_document(&mut tx, path).await?;
        insert_document(&mut tx, &document).await?;

        if diff.added.contains(path) {
            report.added += 1;
        } else {
            report.updated += 1;
        }
    }

    // The aggregate covers what is actually committed, so files that
    // errored out of this pass do not contribute.
    let committed: Vec<String> =
        sqlx::query_scalar("SELECT fingerprint FROM documents ORDER BY path")
            .fetch_all(&mut *tx)
            .await?;
    let total_documents = committed.len() as i64;
    let aggregate = aggregate_fingerprint(committed.iter().map(String::as_str));

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO manifest (id, last_indexed_at, total_documents, aggregate_fingerprint)
        VALUES (1, ?, ?, ?)
        "#,
    )
    .bind(now)
    .bind(total_documents)
    .bind(&aggregate)
    .execute(&mut *tx)
    .await?;

    // Per-source bookkeeping for `qry sources`.
    sqlx::query(
        r#"
        UPDATE sources SET
            last_indexed_at = ?,
            file_count = (SELECT COUNT(*) FROM documents WHERE source_id = sources.id)
        "#,
    )
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

async fn delete_document(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    path: &str,
) -> Result<()> {
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM documents WHERE path = ?")
        .bind(path)
        .fetch_optional(&mut **tx)
        .await?;

    if let Some(id) = existing {
        sqlx::query("DELETE FROM sections WHERE document_id = ?")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM documents_fts WHERE document_id = ?")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn insert_document(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    doc: &Document,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO documents (path, filename, doc_type, content, fingerprint, size_bytes, source_id, indexed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&doc.path)
    .bind(&doc.filename)
    .bind(&doc.doc_type)
    .bind(&doc.content)
    .bind(&doc.fingerprint)
    .bind(doc.size_bytes)
    .bind(doc.source_id)
    .bind(doc.indexed_at)
    .execute(&mut **tx)
    .await?;
    let doc_id = result.last_insert_rowid();

    sqlx::query("INSERT INTO documents_fts (document_id, path, content) VALUES (?, ?, ?)")
        .bind(doc_id)
        .bind(&doc.path)
        .bind(&doc.content)
        .execute(&mut **tx)
        .await?;

    for section in extract_sections(&doc.content, &doc.doc_type) {
        sqlx::query(
            r#"
            INSERT INTO sections (document_id, line_start, line_end, section_date, header, section_type)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(doc_id)
        .bind(section.line_start as i64)
        .bind(section.line_end as i64)
        .bind(&section.date)
        .bind(&section.header)
        .bind(section.kind.as_str())
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Runs `qry index`: migrate if needed, run the pass, print the report.
pub async fn run_index(config: &Config, full: bool, excludes: &[String]) -> Result<()> {
    migrate::run_migrations(config).await?;
    let pool = db::connect(config).await?;

    let report = index_pass(&pool, config, excludes, full).await?;

    println!("index{}", if full { " --full" } else { "" });
    println!("  added:     {}", report.added);
    println!("  updated:   {}", report.updated);
    println!("  deleted:   {}", report.deleted);
    println!("  unchanged: {}", report.unchanged);
    println!("  total:     {}", report.total);
    if !report.errors.is_empty() {
        println!("  errors:    {}", report.errors.len());
        for err in &report.errors {
            eprintln!("    {}: {}", err.path, err.message);
        }
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Runs `qry diff`: a read-only preview of what a pass would change.
pub async fn run_diff(config: &Config) -> Result<()> {
    let pool = db::open_existing(config).await?;

    let scan_state = scan_all_roots(&pool, config, &[]).await?;
    let indexed = indexed_fingerprints(&pool).await?;
    let diff = diff_states(&indexed, &scan_state.fingerprints, &scan_state.errored);

    println!("diff (index preview)");
    for path in &diff.added {
        println!("  + {}", path);
    }
    for path in &diff.changed {
        println!("  ~ {}", path);
    }
    for path in &diff.deleted {
        println!("  - {}", path);
    }
    println!(
        "  {} added, {} changed, {} deleted, {} unchanged",
        diff.added.len(),
        diff.changed.len(),
        diff.deleted.len(),
        diff.unchanged
    );
    for err in &scan_state.errors {
        eprintln!("  error {}: {}", err.path, err.message);
    }

    pool.close().await;
    Ok(())
}

/// True when the last committed pass is older than `threshold_minutes`, or
/// no pass has committed at all.
pub async fn is_stale(pool: &SqlitePool, threshold_minutes: i64) -> Result<bool> {
    let last: Option<i64> =
        sqlx::query_scalar("SELECT last_indexed_at FROM manifest WHERE id = 1")
            .fetch_optional(pool)
            .await?;
    match last {
        Some(ts) => Ok(Utc::now().timestamp() - ts > threshold_minutes * 60),
        None => Ok(true),
    }
}

/// Loads the committed manifest, if a pass has ever committed.
pub async fn load_manifest(pool: &SqlitePool) -> Result<Option<crate::models::Manifest>> {
    let row = sqlx::query(
        "SELECT last_indexed_at, total_documents, aggregate_fingerprint FROM manifest WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| crate::models::Manifest {
        last_indexed_at: row.get("last_indexed_at"),
        total_documents: row.get("total_documents"),
        aggregate_fingerprint: row.get("aggregate_fingerprint"),
    }))
}

impl IndexReport {
    /// One-line summary used in log output.
    pub fn summary(&self) -> String {
        format!(
            "+{} ~{} -{} ={} ({} total, {} errors)",
            self.added,
            self.updated,
            self.deleted,
            self.unchanged,
            self.total,
            self.errors.len()
        )
    }
}
