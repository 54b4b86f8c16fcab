//! Search fusion: merging ranked full-text results with lexical ripgrep
//! matches into one deduplicated, rescored list.
//!
//! The two channels fail independently. If one is unavailable the other's
//! results are returned with the failure recorded in the stats; only when
//! both fail does the caller get an empty result set, and even then the
//! errors travel in the stats rather than aborting the command.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::db;
use crate::error::QuarryError;
use crate::ripgrep::{self, RgEvent};
use crate::sections::{self, Section, SectionKind};
use crate::sources;

const FTS_WEIGHT: f64 = 0.6;
const RG_WEIGHT: f64 = 0.4;
const BOTH_SOURCES_BONUS: f64 = 0.2;
/// Lines appended after the match line in section context.
const CONTEXT_LINES_AFTER: usize = 5;
/// Hard cap on section context length.
const MAX_CONTEXT_LINES: usize = 30;
/// How far the fallback section scan looks when no sections are persisted.
const FALLBACK_SCAN_LINES: usize = 50;

/// One hit from a single channel, before fusion.
#[derive(Debug, Clone)]
pub struct ChannelHit {
    pub path: String,
    pub doc_type: String,
    /// Normalized to 0..1, recency decay already applied.
    pub score: f64,
    pub line_numbers: Vec<usize>,
    pub snippet: String,
}

/// A fused, deduplicated per-document result.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub path: String,
    pub doc_type: String,
    pub score: f64,
    /// Channels that produced this hit: "fts", "ripgrep", or both.
    pub sources: Vec<&'static str>,
    pub line_numbers: Vec<usize>,
    pub snippet: String,
    pub section_header: Option<String>,
    pub section_date: Option<String>,
    pub section_context: Option<String>,
}

/// Channel bookkeeping returned with every search.
#[derive(Debug, Default)]
pub struct SearchStats {
    pub fts_count: usize,
    pub rg_count: usize,
    pub combined_count: usize,
    pub returned_count: usize,
    pub fts_error: Option<String>,
    pub rg_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub stats: SearchStats,
}

/// Normalizes an engine-polarity score to 0..1. FTS5's bm25 rank is
/// negative-is-better; the absolute value folds both polarities into one
/// monotone mapping.
pub fn normalize_rank(raw: f64) -> f64 {
    1.0 / (1.0 + raw.abs())
}

/// Recency decay factor for a document of the given age.
pub fn recency_factor(age_days: f64, decay: f64) -> f64 {
    1.0 / (1.0 + age_days.max(0.0) * decay)
}

/// Dedup key for channel fusion: the last two path components.
///
/// Tolerates the same file seen as `notes/a.md` by the store and
/// `/mnt/vault/notes/a.md` by ripgrep without merging unrelated top-level
/// files that happen to share a name.
pub fn dedup_key(path: &str) -> String {
    let parts: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|part| !part.is_empty())
        .collect();
    match parts.as_slice() {
        [] => String::new(),
        [name] => (*name).to_string(),
        [.., dir, name] => format!("{}/{}", dir, name),
    }
}

/// Fuses the two channels: dedup by path suffix, merge line numbers and
/// snippets, weight 0.6/0.4 with a 0.2 both-channels bonus, clamp to 1.0.
/// Output is sorted by score descending, path ascending on ties.
pub fn fuse_channels(fts_hits: &[ChannelHit], rg_hits: &[ChannelHit]) -> Vec<SearchResult> {
    struct Merged {
        hit: ChannelHit,
        fts_score: f64,
        rg_score: f64,
        sources: Vec<&'static str>,
    }

    let mut combined: HashMap<String, Merged> = HashMap::new();

    for hit in fts_hits {
        combined.insert(
            dedup_key(&hit.path),
            Merged {
                hit: hit.clone(),
                fts_score: hit.score,
                rg_score: 0.0,
                sources: vec!["fts"],
            },
        );
    }

    for hit in rg_hits {
        let key = dedup_key(&hit.path);
        match combined.get_mut(&key) {
            Some(merged) => {
                merged.sources.push("ripgrep");
                merged.rg_score = hit.score;
                merged.hit.line_numbers.extend(hit.line_numbers.iter().copied());
                merged.hit.line_numbers.sort_unstable();
                merged.hit.line_numbers.dedup();
                if !hit.snippet.is_empty() && !merged.hit.snippet.contains(&hit.snippet) {
                    if merged.hit.snippet.is_empty() {
                        merged.hit.snippet = hit.snippet.clone();
                    } else {
                        merged.hit.snippet = format!("{} | {}", merged.hit.snippet, hit.snippet);
                    }
                }
            }
            None => {
                combined.insert(
                    key,
                    Merged {
                        hit: hit.clone(),
                        fts_score: 0.0,
                        rg_score: hit.score,
                        sources: vec!["ripgrep"],
                    },
                );
            }
        }
    }

    let mut results: Vec<SearchResult> = combined
        .into_values()
        .map(|merged| {
            let bonus = if merged.sources.len() > 1 {
                BOTH_SOURCES_BONUS
            } else {
                0.0
            };
            let score =
                (FTS_WEIGHT * merged.fts_score + RG_WEIGHT * merged.rg_score + bonus).min(1.0);
            SearchResult {
                path: merged.hit.path,
                doc_type: merged.hit.doc_type,
                score,
                sources: merged.sources,
                line_numbers: merged.hit.line_numbers,
                snippet: merged.hit.snippet,
                section_header: None,
                section_date: None,
                section_context: None,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    results
}

/// Full fusion search. `recency` applies the age decay to both channels;
/// `context_after` sets how many lines past the match the section context
/// carries.
pub async fn search_fused(
    pool: &SqlitePool,
    config: &Config,
    query: &str,
    limit: usize,
    recency: bool,
    context_after: usize,
) -> Result<SearchOutcome> {
    let query = query.trim();
    if query.is_empty() {
        return Err(QuarryError::Input("search query cannot be empty".to_string()).into());
    }

    let decay = if recency {
        config.search.recency_decay
    } else {
        0.0
    };

    // Each channel fetches past the limit so fusion has room to re-rank.
    let fetch = limit * 2;

    let mut stats = SearchStats::default();

    let fts_hits = match fts_channel(pool, query, fetch, decay).await {
        Ok(hits) => hits,
        Err(err) => {
            tracing::warn!(error = %err, "ranked channel failed");
            stats.fts_error = Some(err.to_string());
            Vec::new()
        }
    };
    stats.fts_count = fts_hits.len();

    let rg_hits = match rg_channel(pool, config, query, decay).await {
        Ok(hits) => hits,
        Err(err) => {
            tracing::warn!(error = %err, "lexical channel failed");
            stats.rg_error = Some(err.to_string());
            Vec::new()
        }
    };
    stats.rg_count = rg_hits.len();

    let mut results = fuse_channels(&fts_hits, &rg_hits);
    stats.combined_count = results.len();
    results.truncate(limit);

    for result in &mut results {
        if let Err(err) = enrich_result(pool, result, context_after).await {
            tracing::debug!(path = %result.path, error = %err, "section enrichment failed");
        }
    }
    stats.returned_count = results.len();

    Ok(SearchOutcome { results, stats })
}

// ============ Ranked channel ============

async fn fts_channel(
    pool: &SqlitePool,
    query: &str,
    limit: usize,
    decay: f64,
) -> Result<Vec<ChannelHit>> {
    let now = Utc::now().timestamp();
    let rows = sqlx::query(
        r#"
        SELECT d.path, d.doc_type, d.content, d.indexed_at, f.rank,
               snippet(documents_fts, 2, '<mark>', '</mark>', '...', 32) AS snip
        FROM documents_fts f
        JOIN documents d ON d.id = f.document_id
        WHERE documents_fts MATCH ?
        ORDER BY rank
        LIMIT ?
        "#,
    )
    .bind(query)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    let hits = rows
        .iter()
        .map(|row| {
            let rank: f64 = row.get("rank");
            let indexed_at: i64 = row.get("indexed_at");
            let age_days = (now - indexed_at) as f64 / 86_400.0;
            let content: String = row.get("content");
            let snippet: String = row.get("snip");
            let line = first_line_of_snippet(&content, &snippet);

            ChannelHit {
                path: row.get("path"),
                doc_type: row.get("doc_type"),
                score: normalize_rank(rank) * recency_factor(age_days, decay),
                line_numbers: line.into_iter().collect(),
                snippet: snippet.replace('\n', " ").trim().to_string(),
            }
        })
        .collect();

    Ok(hits)
}

/// Locates the snippet's first highlighted term in the document, giving the
/// ranked channel a line number to merge against the lexical channel's.
fn first_line_of_snippet(content: &str, snippet: &str) -> Option<usize> {
    let start = snippet.find("<mark>")? + "<mark>".len();
    let end = snippet[start..].find("</mark>")? + start;
    let term = snippet[start..end].trim();
    if term.is_empty() {
        return None;
    }
    let term_lower = term.to_lowercase();
    content
        .lines()
        .position(|line| line.to_lowercase().contains(&term_lower))
        .map(|idx| idx + 1)
}

// ============ Lexical channel ============

/// Per-file aggregation of ripgrep match events across all roots.
async fn rg_channel(
    pool: &SqlitePool,
    config: &Config,
    query: &str,
    decay: f64,
) -> Result<Vec<ChannelHit>> {
    let roots = sources::roots_for_index(pool, config).await?;
    let timeout = Duration::from_secs(config.search.rg_timeout_secs);
    let excludes = rg_excludes();

    struct FileMatches {
        doc_type: String,
        lines: Vec<usize>,
        first_text: String,
        mtime: Option<i64>,
    }

    let now = Utc::now().timestamp();
    let mut per_file: HashMap<String, FileMatches> = HashMap::new();

    for root in &roots {
        if !root.path.is_dir() {
            continue;
        }
        let events = ripgrep::run_ripgrep(query, &root.path, 0, &excludes, timeout).await?;
        for event in events {
            let m = match event {
                RgEvent::Match(m) => m,
                _ => continue,
            };
            let (abs, line, text) = match (m.path.as_str(), m.line_number, m.lines.as_str()) {
                (Some(abs), Some(line), Some(text)) => (abs, line as usize, text),
                _ => continue,
            };
            let rel = Path::new(abs)
                .strip_prefix(&root.path)
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|_| abs.to_string());
            let store_path = match &root.alias {
                Some(alias) => format!("{}/{}", alias, rel),
                None => rel,
            };

            let entry = per_file.entry(store_path).or_insert_with(|| FileMatches {
                doc_type: crate::scan::doc_type_for_path(Path::new(abs)).to_string(),
                lines: Vec::new(),
                first_text: text.trim().to_string(),
                mtime: file_mtime(abs),
            });
            entry.lines.push(line);
        }
    }

    let hits = per_file
        .into_iter()
        .map(|(path, matches)| {
            let base = (matches.lines.len() as f64 / 10.0).min(1.0);
            let age_days = matches
                .mtime
                .map(|mtime| (now - mtime) as f64 / 86_400.0)
                .unwrap_or(0.0);
            ChannelHit {
                path,
                doc_type: matches.doc_type,
                score: base * recency_factor(age_days, decay),
                line_numbers: matches.lines,
                snippet: matches.first_text,
            }
        })
        .collect();

    Ok(hits)
}

fn rg_excludes() -> Vec<String> {
    crate::scan::DEFAULT_EXCLUDES
        .iter()
        .map(|p| p.trim_end_matches('/').to_string())
        .collect()
}

fn file_mtime(path: &str) -> Option<i64> {
    std::fs::metadata(path)
        .ok()
        .and_then(|meta| meta.modified().ok())
        .and_then(|t| {
            t.duration_since(std::time::UNIX_EPOCH)
                .ok()
                .map(|d| d.as_secs() as i64)
        })
}

// ============ Section enrichment ============

/// Attaches the section containing the primary match line plus a windowed
/// context. Persisted sections are preferred; when absent, the same
/// extractor runs on the document text so both paths agree.
async fn enrich_result(
    pool: &SqlitePool,
    result: &mut SearchResult,
    context_after: usize,
) -> Result<()> {
    let match_line = match result.line_numbers.first() {
        Some(&line) => line,
        None => return Ok(()),
    };

    let row = sqlx::query("SELECT id, content, doc_type FROM documents WHERE path = ?")
        .bind(&result.path)
        .fetch_optional(pool)
        .await?;
    let (doc_id, content, doc_type): (i64, String, String) = match row {
        Some(row) => (row.get("id"), row.get("content"), row.get("doc_type")),
        None => return Ok(()),
    };

    let persisted = load_sections(pool, doc_id).await?;
    let computed;
    let all_sections: &[Section] = if persisted.is_empty() {
        computed = sections::extract_sections(&content, &doc_type);
        &computed
    } else {
        &persisted
    };

    let lines: Vec<&str> = content.lines().collect();
    if let Some(section) = sections::section_for_line(all_sections, match_line) {
        // A stale persisted section can start far above a fresh match
        // line; the bounded scan keeps the context anchored to the match.
        let start = if match_line.saturating_sub(section.line_start) <= FALLBACK_SCAN_LINES {
            section.line_start
        } else {
            match_line.saturating_sub(FALLBACK_SCAN_LINES)
        };
        result.section_header = Some(section.header.clone());
        result.section_date = section.date.clone();
        result.section_context = Some(context_window(&lines, start, match_line, context_after));
    } else if !lines.is_empty() {
        let start = match_line.saturating_sub(FALLBACK_SCAN_LINES).max(1);
        result.section_context = Some(context_window(&lines, start, match_line, context_after));
    }

    Ok(())
}

async fn load_sections(pool: &SqlitePool, doc_id: i64) -> Result<Vec<Section>> {
    let rows = sqlx::query(
        r#"
        SELECT line_start, line_end, section_date, header, section_type
        FROM sections
        WHERE document_id = ?
        ORDER BY line_start
        "#,
    )
    .bind(doc_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Section {
            line_start: row.get::<i64, _>("line_start") as usize,
            line_end: row.get::<Option<i64>, _>("line_end").unwrap_or(i64::MAX) as usize,
            date: row.get("section_date"),
            header: row.get("header"),
            kind: SectionKind::from_tag(row.get("section_type"))
                .unwrap_or(SectionKind::BlankSeparated),
        })
        .collect())
}

/// Builds a line-numbered window from the section start through the match
/// and `after` lines beyond it, recentered on the match when the section
/// is long. The match line carries a `>>` marker.
pub fn context_window(
    lines: &[&str],
    section_start: usize,
    match_line: usize,
    after: usize,
) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let match_idx = match_line.saturating_sub(1).min(lines.len() - 1);
    let mut start = section_start.saturating_sub(1).min(match_idx);
    let mut end = (match_idx + after + 1).min(lines.len());

    if end - start > MAX_CONTEXT_LINES {
        start = match_idx.saturating_sub(MAX_CONTEXT_LINES / 2);
        end = (start + MAX_CONTEXT_LINES).min(lines.len());
    }

    lines[start..end]
        .iter()
        .enumerate()
        .map(|(offset, line)| {
            let number = start + offset + 1;
            let marker = if start + offset == match_idx { " >> " } else { "    " };
            format!("{:4}{}{}", number, marker, line.trim_end())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============ CLI wrappers ============

pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<i64>,
    context: Option<usize>,
    no_recency: bool,
) -> Result<()> {
    let pool = db::open_existing(config).await?;
    let limit = limit.unwrap_or(config.search.default_limit).max(1) as usize;
    let context_after = context.unwrap_or(CONTEXT_LINES_AFTER);

    let outcome = search_fused(&pool, config, query, limit, !no_recency, context_after).await?;

    if let Some(err) = &outcome.stats.fts_error {
        eprintln!("ranked channel unavailable: {}", err);
    }
    if let Some(err) = &outcome.stats.rg_error {
        eprintln!("lexical channel unavailable: {}", err);
    }

    if outcome.results.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, result) in outcome.results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} ({})",
            i + 1,
            result.score,
            result.path,
            result.sources.join("+")
        );
        if !result.line_numbers.is_empty() {
            let shown: Vec<String> = result
                .line_numbers
                .iter()
                .take(10)
                .map(|n| n.to_string())
                .collect();
            println!("    lines: {}", shown.join(", "));
        }
        if let Some(header) = &result.section_header {
            match &result.section_date {
                Some(date) => println!("    section: {} ({})", header, date),
                None => println!("    section: {}", header),
            }
        }
        if !result.snippet.is_empty() {
            println!("    excerpt: \"{}\"", result.snippet);
        }
        if let Some(context) = &result.section_context {
            for line in context.lines() {
                println!("    {}", line);
            }
        }
        println!();
    }
    println!(
        "{} result{} (fts: {}, ripgrep: {})",
        outcome.stats.returned_count,
        if outcome.stats.returned_count == 1 { "" } else { "s" },
        outcome.stats.fts_count,
        outcome.stats.rg_count
    );

    pool.close().await;
    Ok(())
}

/// Runs `qry grep`: lexical-only structured matches with context lines.
/// Unlike fusion there is no surviving channel here, so a missing ripgrep
/// surfaces as a hard error with its install hint.
pub async fn run_grep(config: &Config, pattern: &str, context: Option<usize>) -> Result<()> {
    if pattern.trim().is_empty() {
        return Err(QuarryError::Input("grep pattern cannot be empty".to_string()).into());
    }
    let pool = db::open_existing(config).await?;
    let roots = sources::roots_for_index(&pool, config).await?;
    let context = context.unwrap_or(config.search.context_lines);
    let timeout = Duration::from_secs(config.search.grep_timeout_secs);
    let excludes = rg_excludes();

    let mut total_matches = 0usize;
    let mut total_files = 0usize;

    for root in &roots {
        if !root.path.is_dir() {
            continue;
        }
        // A deadline overrun skips the root and leaves whatever was
        // already printed as a partial result; only a missing or broken
        // engine aborts grep.
        let events =
            match ripgrep::run_ripgrep(pattern, &root.path, context, &excludes, timeout).await {
                Ok(events) => events,
                Err(err) if is_timeout(&err) => {
                    eprintln!("warning: {} under {}", err, root.path.display());
                    continue;
                }
                Err(err) => return Err(err),
            };
        for event in events {
            match event {
                RgEvent::Begin(begin) => {
                    if let Some(path) = begin.path.as_str() {
                        total_files += 1;
                        println!("{}", path);
                    }
                }
                RgEvent::Match(m) => {
                    if let (Some(line), Some(text)) = (m.line_number, m.lines.as_str()) {
                        total_matches += 1;
                        println!("  {:4} >> {}", line, text.trim_end());
                    }
                }
                RgEvent::Context(ctx) => {
                    if let (Some(line), Some(text)) = (ctx.line_number, ctx.lines.as_str()) {
                        println!("  {:4}    {}", line, text.trim_end());
                    }
                }
                RgEvent::End(_) => println!(),
                RgEvent::Summary(_) => {}
            }
        }
    }

    println!("{} matches in {} files", total_matches, total_files);
    pool.close().await;
    Ok(())
}

fn is_timeout(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<QuarryError>(),
        Some(QuarryError::Timeout { .. })
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(path: &str, score: f64, lines: &[usize], snippet: &str) -> ChannelHit {
        ChannelHit {
            path: path.to_string(),
            doc_type: "markdown".to_string(),
            score,
            line_numbers: lines.to_vec(),
            snippet: snippet.to_string(),
        }
    }

    #[test]
    fn normalize_folds_both_polarities() {
        assert!((normalize_rank(-4.0) - normalize_rank(4.0)).abs() < 1e-12);
        assert!((normalize_rank(0.0) - 1.0).abs() < 1e-12);
        assert!(normalize_rank(-2.0) > normalize_rank(-5.0));
        let big = normalize_rank(1e9);
        assert!(big > 0.0 && big < 1e-6);
    }

    #[test]
    fn recency_decays_with_age() {
        assert!((recency_factor(0.0, 0.01) - 1.0).abs() < 1e-12);
        assert!(recency_factor(100.0, 0.01) < recency_factor(10.0, 0.01));
        // decay disabled
        assert!((recency_factor(365.0, 0.0) - 1.0).abs() < 1e-12);
        // negative age (clock skew) never boosts above 1
        assert!((recency_factor(-5.0, 0.01) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn dedup_key_is_last_two_components() {
        assert_eq!(dedup_key("notes/journal.md"), "notes/journal.md");
        assert_eq!(dedup_key("/home/me/vault/notes/journal.md"), "notes/journal.md");
        assert_eq!(dedup_key("journal.md"), "journal.md");
        assert_eq!(dedup_key("a\\b\\c.md"), "b/c.md");
    }

    #[test]
    fn fuse_weights_single_channels() {
        let fused = fuse_channels(&[hit("a/x.md", 1.0, &[3], "sx")], &[]);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 0.6).abs() < 1e-9);
        assert_eq!(fused[0].sources, vec!["fts"]);

        let fused = fuse_channels(&[], &[hit("a/y.md", 1.0, &[7], "sy")]);
        assert!((fused[0].score - 0.4).abs() < 1e-9);
        assert_eq!(fused[0].sources, vec!["ripgrep"]);
    }

    #[test]
    fn both_channels_merge_and_get_bonus() {
        let fused = fuse_channels(
            &[hit("vault/notes/x.md", 0.5, &[3], "alpha")],
            &[hit("/abs/notes/x.md", 0.5, &[9, 3], "beta")],
        );
        assert_eq!(fused.len(), 1);
        // 0.6*0.5 + 0.4*0.5 + 0.2
        assert!((fused[0].score - 0.7).abs() < 1e-9);
        assert_eq!(fused[0].sources, vec!["fts", "ripgrep"]);
        assert_eq!(fused[0].line_numbers, vec![3, 9]);
        assert!(fused[0].snippet.contains("alpha") && fused[0].snippet.contains("beta"));
    }

    #[test]
    fn bonus_never_exceeds_one() {
        let fused = fuse_channels(&[hit("n/x.md", 1.0, &[], "")], &[hit("n/x.md", 1.0, &[], "")]);
        assert!((fused[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fused_score_is_monotone_in_each_channel() {
        let low = fuse_channels(&[hit("n/x.md", 0.2, &[], "")], &[hit("n/x.md", 0.5, &[], "")]);
        let high = fuse_channels(&[hit("n/x.md", 0.8, &[], "")], &[hit("n/x.md", 0.5, &[], "")]);
        assert!(high[0].score >= low[0].score);

        let low = fuse_channels(&[hit("n/x.md", 0.5, &[], "")], &[hit("n/x.md", 0.1, &[], "")]);
        let high = fuse_channels(&[hit("n/x.md", 0.5, &[], "")], &[hit("n/x.md", 0.9, &[], "")]);
        assert!(high[0].score >= low[0].score);
    }

    #[test]
    fn distinct_files_stay_distinct() {
        let fused = fuse_channels(
            &[hit("work/todo.md", 0.9, &[], "")],
            &[hit("home/todo.md", 0.9, &[], "")],
        );
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn sort_is_descending_and_tie_stable_by_path() {
        let fused = fuse_channels(
            &[
                hit("b/same.md", 0.5, &[], ""),
                hit("a/same.md", 0.5, &[], ""),
                hit("c/top.md", 0.9, &[], ""),
            ],
            &[],
        );
        let paths: Vec<&str> = fused.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["c/top.md", "a/same.md", "b/same.md"]);
    }

    #[test]
    fn snippet_term_resolves_to_line() {
        let content = "first line\nsecond with Needle here\nthird";
        assert_eq!(
            first_line_of_snippet(content, "... <mark>needle</mark> here ..."),
            Some(2)
        );
        assert_eq!(first_line_of_snippet(content, "no markers"), None);
    }

    #[test]
    fn context_window_spans_section_to_after_match() {
        let lines: Vec<&str> = (1..=20).map(|_| "line").collect();
        let window = context_window(&lines, 3, 6, CONTEXT_LINES_AFTER);
        let rendered: Vec<&str> = window.lines().collect();
        // lines 3..=11: section start through match+5
        assert_eq!(rendered.len(), 9);
        assert!(rendered[0].starts_with("   3"));
        assert!(rendered[3].contains(" >> "));
        assert!(rendered.last().unwrap().starts_with("  11"));
    }

    #[test]
    fn context_window_recenters_long_sections() {
        let lines: Vec<&str> = (1..=200).map(|_| "x").collect();
        let window = context_window(&lines, 1, 100, CONTEXT_LINES_AFTER);
        let rendered: Vec<&str> = window.lines().collect();
        assert_eq!(rendered.len(), MAX_CONTEXT_LINES);
        assert!(rendered.iter().any(|line| line.contains(" >> ")));
    }

    #[test]
    fn context_window_handles_edges() {
        assert_eq!(context_window(&[], 1, 1, CONTEXT_LINES_AFTER), "");
        let lines = vec!["only"];
        let window = context_window(&lines, 1, 1, CONTEXT_LINES_AFTER);
        assert!(window.contains(" >> only"));
        // match line past EOF clamps to the last line
        let window = context_window(&lines, 1, 99, CONTEXT_LINES_AFTER);
        assert!(window.contains(" >> only"));
    }

    #[test]
    fn deadline_overrun_is_distinguished_from_other_failures() {
        let overrun: anyhow::Error = QuarryError::Timeout { seconds: 5 }.into();
        assert!(is_timeout(&overrun));
        let missing: anyhow::Error = QuarryError::ripgrep_unavailable("not found").into();
        assert!(!is_timeout(&missing));
    }

    #[tokio::test]
    async fn missing_ripgrep_degrades_to_ranked_channel() {
        use crate::config::{IndexConfig, SearchConfig, SimilarityConfig, StoreConfig};

        let tmp = tempfile::TempDir::new().unwrap();
        let corpus = tmp.path().join("files");
        std::fs::create_dir(&corpus).unwrap();
        std::fs::write(corpus.join("note.md"), "# Note\n\nhello fusion world\n").unwrap();

        let config = Config {
            store: StoreConfig {
                path: tmp.path().join("qry.sqlite"),
            },
            index: IndexConfig {
                root: corpus,
                ..Default::default()
            },
            search: SearchConfig::default(),
            similarity: SimilarityConfig::default(),
        };

        crate::migrate::run_migrations(&config).await.unwrap();
        let pool = db::connect(&config).await.unwrap();
        crate::index::index_pass(&pool, &config, &[], false)
            .await
            .unwrap();

        // An empty PATH makes the lexical engine unfindable, so only the
        // ranked channel can answer.
        let saved = std::env::var_os("PATH");
        std::env::set_var("PATH", "");
        let outcome = search_fused(&pool, &config, "hello", 10, true, 3).await;
        match saved {
            Some(path) => std::env::set_var("PATH", path),
            None => std::env::remove_var("PATH"),
        }

        let outcome = outcome.unwrap();
        assert!(outcome.stats.rg_error.is_some(), "lexical failure not recorded");
        assert!(outcome.stats.fts_error.is_none());
        assert!(outcome.stats.returned_count > 0, "ranked results dropped");
        assert_eq!(outcome.results[0].sources, vec!["fts"]);
        assert!(outcome.results[0].path.contains("note.md"));
        pool.close().await;
    }
}
