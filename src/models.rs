//! Core data models used throughout quarry.
//!
//! These types represent the documents, mounts, and manifest state that flow
//! through the indexing and search pipeline.

/// Normalized document stored in SQLite, keyed by its relative path.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: String,
    pub filename: String,
    pub doc_type: String,
    pub content: String,
    pub fingerprint: String,
    pub size_bytes: i64,
    pub source_id: Option<i64>,
    pub indexed_at: i64,
}

/// Singleton snapshot of the last committed index pass.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub last_indexed_at: i64,
    pub total_documents: i64,
    pub aggregate_fingerprint: String,
}

/// A mounted source directory.
#[derive(Debug, Clone)]
pub struct SourceMount {
    pub id: i64,
    pub alias: String,
    pub absolute_path: String,
    pub added_at: i64,
    pub last_indexed_at: Option<i64>,
    pub file_count: i64,
}
