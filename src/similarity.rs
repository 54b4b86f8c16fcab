//! TF-IDF similarity over the indexed corpus.
//!
//! Powers `related` (cosine similarity against one target document) and
//! `duplicates` (exact fingerprint groups plus near-duplicate prefix
//! comparison). Vectors are built on demand from stored content; nothing
//! is persisted between runs.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashMap};

use crate::config::Config;
use crate::db;
use crate::error::QuarryError;
use crate::stopwords::Stopwords;

/// A scored neighbor of the target document.
#[derive(Debug, Clone)]
pub struct SimilarityScore {
    pub path: String,
    pub score: f64,
}

/// One group of byte-identical documents.
#[derive(Debug, Clone)]
pub struct ExactGroup {
    pub fingerprint: String,
    pub paths: Vec<String>,
}

/// One near-duplicate pair with its prefix similarity.
#[derive(Debug, Clone)]
pub struct NearDuplicate {
    pub path_a: String,
    pub path_b: String,
    pub similarity: f64,
}

#[derive(Debug, Default)]
pub struct DuplicateReport {
    pub exact: Vec<ExactGroup>,
    pub near: Vec<NearDuplicate>,
}

/// Splits text into lowercase content terms: non-alphanumeric characters
/// are separators, terms shorter than two characters and stopwords drop.
pub fn tokenize(text: &str, stopwords: &Stopwords) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| term.len() >= 2 && !stopwords.contains(term))
        .map(|term| term.to_string())
        .collect()
}

/// Term frequencies, normalized by document length.
pub fn term_frequencies(terms: &[String]) -> HashMap<String, f64> {
    let mut counts: HashMap<String, f64> = HashMap::new();
    for term in terms {
        *counts.entry(term.clone()).or_insert(0.0) += 1.0;
    }
    let total = terms.len() as f64;
    if total > 0.0 {
        for value in counts.values_mut() {
            *value /= total;
        }
    }
    counts
}

/// Smoothed inverse document frequency: `ln(N / df) + 1`, so a term in
/// every document still contributes a small positive weight.
pub fn inverse_document_frequencies(
    documents: &[HashMap<String, f64>],
) -> HashMap<String, f64> {
    let n = documents.len() as f64;
    let mut df: HashMap<String, f64> = HashMap::new();
    for doc in documents {
        for term in doc.keys() {
            *df.entry(term.clone()).or_insert(0.0) += 1.0;
        }
    }
    df.into_iter()
        .map(|(term, count)| (term, (n / count).ln() + 1.0))
        .collect()
}

/// L2-normalizes a weight vector in place. A zero vector stays zero.
pub fn normalize_vector(vector: &mut HashMap<String, f64>) {
    let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for value in vector.values_mut() {
            *value /= norm;
        }
    }
}

/// Cosine similarity over shared terms of two L2-normalized vectors.
pub fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, weight)| large.get(term).map(|other| weight * other))
        .sum()
}

/// Positional character-match ratio over the whitespace-collapsed prefixes
/// of two documents. Cheap near-duplicate screen for drafts and copies
/// that diverge only at the tail.
pub fn prefix_similarity(a: &str, b: &str, prefix_chars: usize) -> f64 {
    let collapse = |text: &str| -> Vec<char> {
        text.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(prefix_chars)
            .collect()
    };
    let a: Vec<char> = collapse(a);
    let b: Vec<char> = collapse(b);
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    let matches = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    matches as f64 / max_len as f64
}

struct CorpusDoc {
    path: String,
    content: String,
}

async fn load_corpus(pool: &SqlitePool) -> Result<Vec<CorpusDoc>> {
    let rows = sqlx::query("SELECT path, content FROM documents ORDER BY path")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|row| CorpusDoc {
            path: row.get("path"),
            content: row.get("content"),
        })
        .collect())
}

/// Resolves a user-supplied file argument to a stored path: exact match
/// first, then stored-path suffix, then bare filename.
fn resolve_target(corpus: &[CorpusDoc], file: &str) -> Option<usize> {
    if let Some(idx) = corpus.iter().position(|doc| doc.path == file) {
        return Some(idx);
    }
    if let Some(idx) = corpus.iter().position(|doc| doc.path.ends_with(file)) {
        return Some(idx);
    }
    corpus.iter().position(|doc| {
        doc.path
            .rsplit(['/', '\\'])
            .next()
            .map(|name| name == file)
            .unwrap_or(false)
    })
}

/// Ranks the corpus against one target document by TF-IDF cosine
/// similarity. Zero-scoring documents and the target itself are excluded.
pub async fn related_files(
    pool: &SqlitePool,
    file: &str,
    limit: usize,
) -> Result<Vec<SimilarityScore>> {
    let corpus = load_corpus(pool).await?;
    let target_idx = resolve_target(&corpus, file)
        .ok_or_else(|| QuarryError::FileNotIndexed(file.to_string()))?;

    if corpus.len() < 2 {
        return Ok(Vec::new());
    }

    let stopwords = Stopwords::new();
    let tf: Vec<HashMap<String, f64>> = corpus
        .iter()
        .map(|doc| term_frequencies(&tokenize(&doc.content, &stopwords)))
        .collect();
    let idf = inverse_document_frequencies(&tf);

    let mut vectors: Vec<HashMap<String, f64>> = tf
        .into_iter()
        .map(|doc_tf| {
            let mut vector: HashMap<String, f64> = doc_tf
                .into_iter()
                .map(|(term, freq)| {
                    let weight = freq * idf.get(&term).copied().unwrap_or(0.0);
                    (term, weight)
                })
                .collect();
            normalize_vector(&mut vector);
            vector
        })
        .collect();

    let target = std::mem::take(&mut vectors[target_idx]);
    if target.is_empty() {
        return Ok(Vec::new());
    }

    let mut scores: Vec<SimilarityScore> = vectors
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != target_idx)
        .map(|(idx, vector)| SimilarityScore {
            path: corpus[idx].path.clone(),
            score: cosine_similarity(&target, vector),
        })
        .filter(|score| score.score > 0.0)
        .collect();

    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    scores.truncate(limit);
    Ok(scores)
}

/// Finds exact duplicate groups by content fingerprint, then screens the
/// remaining documents pairwise for near-duplicates by prefix similarity.
pub async fn find_duplicates(
    pool: &SqlitePool,
    threshold: f64,
    prefix_chars: usize,
) -> Result<DuplicateReport> {
    let rows = sqlx::query("SELECT path, content, fingerprint FROM documents ORDER BY path")
        .fetch_all(pool)
        .await?;

    let mut by_fingerprint: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let docs: Vec<(String, String, String)> = rows
        .iter()
        .map(|row| (row.get("path"), row.get("content"), row.get("fingerprint")))
        .collect();
    for (idx, (_, _, fingerprint)) in docs.iter().enumerate() {
        by_fingerprint.entry(fingerprint.clone()).or_default().push(idx);
    }

    let mut report = DuplicateReport::default();
    let mut in_exact_group = vec![false; docs.len()];
    for (fingerprint, members) in &by_fingerprint {
        if members.len() > 1 {
            for &idx in members {
                in_exact_group[idx] = true;
            }
            report.exact.push(ExactGroup {
                fingerprint: fingerprint.clone(),
                paths: members.iter().map(|&idx| docs[idx].0.clone()).collect(),
            });
        }
    }

    // Exact-group members are already reported; comparing them again
    // would just restate the group as 1.00 pairs.
    for i in 0..docs.len() {
        if in_exact_group[i] {
            continue;
        }
        for j in (i + 1)..docs.len() {
            if in_exact_group[j] {
                continue;
            }
            let similarity = prefix_similarity(&docs[i].1, &docs[j].1, prefix_chars);
            if similarity >= threshold {
                report.near.push(NearDuplicate {
                    path_a: docs[i].0.clone(),
                    path_b: docs[j].0.clone(),
                    similarity,
                });
            }
        }
    }
    report.near.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path_a.cmp(&b.path_a))
    });

    Ok(report)
}

// ============ CLI wrappers ============

pub async fn run_related(config: &Config, file: &str, limit: Option<usize>) -> Result<()> {
    let pool = db::open_existing(config).await?;
    let limit = limit.unwrap_or(config.similarity.related_limit).max(1);

    let scores = related_files(&pool, file, limit).await?;
    if scores.is_empty() {
        println!("No related files found for {}.", file);
    } else {
        println!("Files related to {}:", file);
        for (i, score) in scores.iter().enumerate() {
            println!("{}. [{:.3}] {}", i + 1, score.score, score.path);
        }
    }

    pool.close().await;
    Ok(())
}

pub async fn run_duplicates(config: &Config, threshold: Option<f64>) -> Result<()> {
    let threshold = threshold.unwrap_or(config.similarity.near_dup_threshold);
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(QuarryError::Input("threshold must be in (0.0, 1.0]".to_string()).into());
    }
    let pool = db::open_existing(config).await?;

    let report = find_duplicates(&pool, threshold, config.similarity.prefix_chars).await?;

    if report.exact.is_empty() && report.near.is_empty() {
        println!("No duplicates found.");
        pool.close().await;
        return Ok(());
    }

    if !report.exact.is_empty() {
        println!("Exact duplicates ({} groups):", report.exact.len());
        for group in &report.exact {
            println!("  [{}]", group.fingerprint);
            for path in &group.paths {
                println!("    {}", path);
            }
        }
    }
    if !report.near.is_empty() {
        println!("Near duplicates (>= {:.2}):", threshold);
        for pair in &report.near {
            println!("  [{:.2}] {} <-> {}", pair.similarity, pair.path_a, pair.path_b);
        }
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_filters() {
        let sw = Stopwords::new();
        let terms = tokenize("The Quick-Brown FOX, and a K8s deploy!", &sw);
        assert!(terms.contains(&"quick".to_string()));
        assert!(terms.contains(&"brown".to_string()));
        assert!(terms.contains(&"fox".to_string()));
        assert!(terms.contains(&"k8s".to_string()));
        assert!(terms.contains(&"deploy".to_string()));
        // stopwords and single characters dropped
        assert!(!terms.contains(&"the".to_string()));
        assert!(!terms.contains(&"and".to_string()));
        assert!(!terms.contains(&"a".to_string()));
    }

    #[test]
    fn term_frequencies_sum_to_one() {
        let terms: Vec<String> = ["alpha", "beta", "alpha", "gamma"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let tf = term_frequencies(&terms);
        assert!((tf["alpha"] - 0.5).abs() < 1e-12);
        assert!((tf["beta"] - 0.25).abs() < 1e-12);
        let sum: f64 = tf.values().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn idf_weights_rare_terms_higher() {
        let docs: Vec<HashMap<String, f64>> = vec![
            term_frequencies(&["shared".to_string(), "rare".to_string()]),
            term_frequencies(&["shared".to_string()]),
            term_frequencies(&["shared".to_string()]),
        ];
        let idf = inverse_document_frequencies(&docs);
        assert!(idf["rare"] > idf["shared"]);
        // a term in every document still carries the +1 floor
        assert!((idf["shared"] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cosine_is_symmetric_and_bounded() {
        let mut a: HashMap<String, f64> =
            [("x".to_string(), 1.0), ("y".to_string(), 2.0)].into_iter().collect();
        let mut b: HashMap<String, f64> =
            [("y".to_string(), 3.0), ("z".to_string(), 1.0)].into_iter().collect();
        normalize_vector(&mut a);
        normalize_vector(&mut b);
        let ab = cosine_similarity(&a, &b);
        let ba = cosine_similarity(&b, &a);
        assert!((ab - ba).abs() < 1e-12);
        assert!((0.0..=1.0 + 1e-12).contains(&ab));
        // identical vectors score 1
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_vectors_score_zero() {
        let a: HashMap<String, f64> = [("x".to_string(), 1.0)].into_iter().collect();
        let b: HashMap<String, f64> = [("y".to_string(), 1.0)].into_iter().collect();
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn normalize_handles_zero_vector() {
        let mut zero: HashMap<String, f64> = HashMap::new();
        normalize_vector(&mut zero);
        assert!(zero.is_empty());
    }

    #[test]
    fn prefix_similarity_exact_and_divergent() {
        assert!((prefix_similarity("hello world", "hello world", 500) - 1.0).abs() < 1e-12);
        assert!(prefix_similarity("hello world", "goodbye moon", 500) < 0.5);
        // both empty counts as identical
        assert!((prefix_similarity("", "", 500) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn prefix_similarity_collapses_whitespace() {
        let a = "alpha   beta\n\n  gamma";
        let b = "alpha beta gamma";
        assert!((prefix_similarity(a, b, 500) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn prefix_similarity_ignores_tail_divergence() {
        let prefix = "x".repeat(500);
        let a = format!("{} tail one", prefix);
        let b = format!("{} completely different ending", prefix);
        assert!((prefix_similarity(&a, &b, 500) - 1.0).abs() < 1e-12);
    }
}
