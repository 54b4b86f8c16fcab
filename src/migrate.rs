use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Create documents table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT UNIQUE NOT NULL,
            filename TEXT NOT NULL,
            doc_type TEXT NOT NULL,
            content TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            source_id INTEGER REFERENCES sources(id),
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create sections table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL,
            line_start INTEGER NOT NULL,
            line_end INTEGER,
            section_date TEXT,
            header TEXT NOT NULL,
            section_type TEXT NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create manifest singleton
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS manifest (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            last_indexed_at INTEGER NOT NULL,
            total_documents INTEGER NOT NULL,
            aggregate_fingerprint TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create sources table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            alias TEXT UNIQUE NOT NULL,
            absolute_path TEXT UNIQUE NOT NULL,
            added_at INTEGER NOT NULL,
            last_indexed_at INTEGER,
            file_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create FTS5 virtual table over documents
    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_fts'",
    )
    .fetch_one(&pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE documents_fts USING fts5(
                document_id UNINDEXED,
                path UNINDEXED,
                content
            )
            "#,
        )
        .execute(&pool)
        .await?;
    }

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sections_document_id ON sections(document_id)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sections_line_start ON sections(document_id, line_start)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_source_id ON documents(source_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_fingerprint ON documents(fingerprint)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
