//! Link extraction and validation across the indexed corpus.
//!
//! Understands wiki links (`[[target]]`, `[[target|label]]`) and relative
//! markdown links. External URLs and in-page anchors are never validated;
//! fragments on internal targets are stripped before resolution.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::{Component, Path};

use crate::config::Config;
use crate::db;
use crate::error::QuarryError;

static WIKI_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\]|]+)(?:\|[^\]]+)?\]\]").unwrap());
static MARKDOWN_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap());

/// One outbound link found in a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub target: String,
    pub line: usize,
    pub wiki: bool,
}

/// A link whose target resolves to nothing in the corpus.
#[derive(Debug, Clone)]
pub struct BrokenLink {
    pub source_path: String,
    pub target: String,
    pub line: usize,
}

/// Extracts internal link targets from one document, line by line.
/// `http(s)` targets and bare `#anchor` links are skipped; fragments on
/// internal targets are dropped.
pub fn extract_links(content: &str) -> Vec<Link> {
    let mut links = Vec::new();
    for (idx, text) in content.lines().enumerate() {
        let line = idx + 1;
        for cap in WIKI_LINK.captures_iter(text) {
            let target = cap[1].trim();
            if !target.is_empty() {
                links.push(Link {
                    target: target.to_string(),
                    line,
                    wiki: true,
                });
            }
        }
        for cap in MARKDOWN_LINK.captures_iter(text) {
            let raw = cap[2].trim();
            if raw.starts_with("http://") || raw.starts_with("https://") || raw.starts_with('#') {
                continue;
            }
            let target = raw.split('#').next().unwrap_or(raw).trim();
            if !target.is_empty() {
                links.push(Link {
                    target: target.to_string(),
                    line,
                    wiki: false,
                });
            }
        }
    }
    links
}

/// Index of every way a stored document can be addressed: full relative
/// path, bare filename, and filename stem (for extensionless wiki links).
pub struct KnownTargets {
    paths: HashSet<String>,
    names: HashSet<String>,
}

impl KnownTargets {
    pub fn new(paths: impl IntoIterator<Item = String>) -> Self {
        let mut path_set = HashSet::new();
        let mut names = HashSet::new();
        for path in paths {
            if let Some(name) = Path::new(&path).file_name().and_then(|n| n.to_str()) {
                names.insert(name.to_lowercase());
            }
            if let Some(stem) = Path::new(&path).file_stem().and_then(|s| s.to_str()) {
                names.insert(stem.to_lowercase());
            }
            path_set.insert(path);
        }
        Self {
            paths: path_set,
            names,
        }
    }

    /// Checks whether a link target resolves: exact stored path, bare
    /// name or stem, or a path relative to the linking document.
    pub fn resolves(&self, target: &str, source_path: &str) -> bool {
        if self.paths.contains(target) {
            return true;
        }
        if self.names.contains(&target.to_lowercase()) {
            return true;
        }
        let source_dir = Path::new(source_path).parent().unwrap_or(Path::new(""));
        let resolved = normalize_path(&source_dir.join(target));
        self.paths.contains(&resolved)
    }
}

/// Collapses `.` and `..` components without touching the filesystem, so
/// `notes/../a.md` matches the stored path `a.md`.
fn normalize_path(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            _ => {}
        }
    }
    parts.join("/")
}

/// Validation outcome over one document or the whole corpus.
#[derive(Debug, Default)]
pub struct LinkReport {
    pub checked: usize,
    pub broken: Vec<BrokenLink>,
}

/// Validates outbound links in one document (or every markdown document)
/// against the set of indexed paths.
pub async fn validate_links(pool: &SqlitePool, file: Option<&str>) -> Result<LinkReport> {
    let all = sqlx::query("SELECT path, content, doc_type FROM documents ORDER BY path")
        .fetch_all(pool)
        .await?;

    let known = KnownTargets::new(all.iter().map(|row| row.get::<String, _>("path")));

    let docs: Vec<(String, String)> = match file {
        Some(file) => {
            let found = all.iter().find(|row| {
                let path: String = row.get("path");
                path == file || path.ends_with(file)
            });
            match found {
                Some(row) => vec![(row.get("path"), row.get("content"))],
                None => return Err(QuarryError::FileNotIndexed(file.to_string()).into()),
            }
        }
        None => all
            .iter()
            .filter(|row| row.get::<String, _>("doc_type") == "markdown")
            .map(|row| (row.get("path"), row.get("content")))
            .collect(),
    };

    let mut report = LinkReport::default();
    for (path, content) in &docs {
        for link in extract_links(content) {
            report.checked += 1;
            if !known.resolves(&link.target, path) {
                report.broken.push(BrokenLink {
                    source_path: path.clone(),
                    target: link.target,
                    line: link.line,
                });
            }
        }
    }
    Ok(report)
}

/// A line mentioning the searched name, with surrounding context.
#[derive(Debug, Clone)]
pub struct Reference {
    pub path: String,
    pub line: usize,
    pub text: String,
    pub context: Vec<(usize, String)>,
}

/// Scans every document for whole-word, case-insensitive mentions of a
/// name (typically a filename or stem).
pub async fn find_references(
    pool: &SqlitePool,
    name: &str,
    context_lines: usize,
) -> Result<Vec<Reference>> {
    let name = name.trim();
    if name.is_empty() {
        return Err(QuarryError::Input("reference name cannot be empty".to_string()).into());
    }
    let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name)))
        .map_err(|e| QuarryError::Input(format!("invalid reference name: {}", e)))?;

    let rows = sqlx::query("SELECT path, content FROM documents ORDER BY path")
        .fetch_all(pool)
        .await?;

    let mut references = Vec::new();
    for row in &rows {
        let path: String = row.get("path");
        let content: String = row.get("content");
        let lines: Vec<&str> = content.lines().collect();
        for (idx, text) in lines.iter().enumerate() {
            if !pattern.is_match(text) {
                continue;
            }
            let start = idx.saturating_sub(context_lines);
            let end = (idx + context_lines + 1).min(lines.len());
            let context = (start..end)
                .filter(|&i| i != idx)
                .map(|i| (i + 1, lines[i].trim_end().to_string()))
                .collect();
            references.push(Reference {
                path: path.clone(),
                line: idx + 1,
                text: text.trim_end().to_string(),
                context,
            });
        }
    }
    Ok(references)
}

// ============ CLI wrappers ============

pub async fn run_links(config: &Config, file: Option<&str>) -> Result<()> {
    let pool = db::open_existing(config).await?;
    let report = validate_links(&pool, file).await?;

    if report.broken.is_empty() {
        println!("No broken links ({} checked).", report.checked);
    } else {
        for link in &report.broken {
            println!("{}:{}: broken link -> {}", link.source_path, link.line, link.target);
        }
        println!(
            "{} links checked: {} valid, {} broken",
            report.checked,
            report.checked - report.broken.len(),
            report.broken.len()
        );
    }

    pool.close().await;
    Ok(())
}

pub async fn run_refs(config: &Config, name: &str, context: Option<usize>) -> Result<()> {
    let pool = db::open_existing(config).await?;
    let context = context.unwrap_or(config.search.context_lines);

    let references = find_references(&pool, name, context).await?;
    if references.is_empty() {
        println!("No references to {}.", name);
        pool.close().await;
        return Ok(());
    }

    let mut current_path = String::new();
    for reference in &references {
        if reference.path != current_path {
            current_path = reference.path.clone();
            println!("{}", current_path);
        }
        for (line, text) in reference
            .context
            .iter()
            .filter(|(line, _)| *line < reference.line)
        {
            println!("  {:4}    {}", line, text);
        }
        println!("  {:4} >> {}", reference.line, reference.text);
        for (line, text) in reference
            .context
            .iter()
            .filter(|(line, _)| *line > reference.line)
        {
            println!("  {:4}    {}", line, text);
        }
        println!();
    }
    println!(
        "{} reference{} to {}",
        references.len(),
        if references.len() == 1 { "" } else { "s" },
        name
    );

    pool.close().await;
    Ok(())
}
