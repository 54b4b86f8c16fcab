//! Filesystem scanning: walking roots, applying exclusion rules, and
//! fingerprinting eligible files.
//!
//! A scan never reads file *content* for indexing; it fingerprints raw bytes
//! so the change detector can decide which files are worth re-reading.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::fingerprint::fingerprint_bytes;

/// Patterns excluded from every scan, before root-local ignore files and
/// caller patterns are added.
pub static DEFAULT_EXCLUDES: &[&str] = &[
    ".git/",
    "target/",
    "node_modules/",
    "__pycache__/",
    ".DS_Store",
    "*.sqlite",
    "*.sqlite-journal",
    "*.sqlite-wal",
    "*.sqlite-shm",
    "*.pyc",
    "*.swp",
    ".qryignore",
];

/// One directory to walk: the implicit local root or a named mount.
#[derive(Debug, Clone)]
pub struct ScanRoot {
    pub source_id: Option<i64>,
    pub alias: Option<String>,
    pub path: PathBuf,
}

/// A file that survived exclusion, with its fingerprint.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Store path: mount alias prefix plus root-relative path.
    pub path: String,
    pub abs_path: PathBuf,
    pub filename: String,
    pub doc_type: &'static str,
    pub size_bytes: u64,
    pub fingerprint: String,
    pub source_id: Option<i64>,
}

/// A per-file failure that did not abort the scan.
#[derive(Debug, Clone)]
pub struct FileError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<ScannedFile>,
    pub errors: Vec<FileError>,
}

/// Compiled exclusion patterns.
///
/// A pattern may target the full relative path, the bare filename, or a
/// directory-name fragment anywhere in the path; a trailing slash restricts
/// it to ancestor directories.
pub struct ExcludeMatcher {
    files: GlobSet,
    dirs: GlobSet,
}

impl ExcludeMatcher {
    pub fn new(patterns: &[String]) -> Result<ExcludeMatcher> {
        let mut files = GlobSetBuilder::new();
        let mut dirs = GlobSetBuilder::new();

        for raw in patterns {
            let pattern = raw.trim();
            if pattern.is_empty() || pattern.starts_with('#') {
                continue;
            }
            let is_dir = pattern.ends_with('/');
            let clean = pattern.trim_start_matches("./").trim_end_matches('/');
            if clean.is_empty() {
                continue;
            }
            let glob = Glob::new(clean)?;
            if is_dir {
                dirs.add(glob);
            } else {
                files.add(glob);
            }
        }

        Ok(ExcludeMatcher {
            files: files.build()?,
            dirs: dirs.build()?,
        })
    }

    /// Builds the standard matcher: defaults, then the root's ignore file,
    /// then caller patterns. Later entries never un-exclude earlier ones.
    pub fn standard(root: &Path, extra: &[String]) -> Result<ExcludeMatcher> {
        let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect();
        patterns.extend(read_ignore_file(root));
        patterns.extend(extra.iter().cloned());
        ExcludeMatcher::new(&patterns)
    }

    /// Tests a root-relative file path against the compiled patterns.
    pub fn is_excluded(&self, rel_path: &Path) -> bool {
        if self.files.is_match(rel_path) {
            return true;
        }
        if let Some(name) = rel_path.file_name() {
            if self.files.is_match(Path::new(name)) {
                return true;
            }
        }

        // Ancestor directories: both the bare component name and the
        // accumulated prefix can match.
        let components: Vec<_> = rel_path.components().collect();
        let mut prefix = PathBuf::new();
        for component in components.iter().take(components.len().saturating_sub(1)) {
            let part = Path::new(component.as_os_str());
            prefix.push(component.as_os_str());
            if self.files.is_match(part) || self.dirs.is_match(part) {
                return true;
            }
            if self.files.is_match(&prefix) || self.dirs.is_match(&prefix) {
                return true;
            }
        }

        false
    }
}

/// Reads the root-local ignore file, one glob per line, `#`-comments and
/// blank lines skipped. A missing file is an empty list.
pub fn read_ignore_file(root: &Path) -> Vec<String> {
    match std::fs::read_to_string(root.join(".qryignore")) {
        Ok(content) => content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Maps a file extension to its document type tag.
pub fn doc_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("md") | Some("markdown") => "markdown",
        Some("txt") => "text",
        Some("log") => "log",
        Some("py") => "python",
        Some("rs") => "rust",
        Some("sh") | Some("bash") | Some("zsh") => "shell",
        Some("js") | Some("jsx") => "javascript",
        Some("ts") | Some("tsx") => "typescript",
        Some("json") => "json",
        Some("yaml") | Some("yml") => "yaml",
        Some("html") | Some("htm") => "html",
        Some("css") => "css",
        Some("pdf") => "pdf",
        Some("docx") => "docx",
        Some("pptx") => "pptx",
        Some("xlsx") => "xlsx",
        _ => "unknown",
    }
}

/// Decodes file bytes as UTF-8, falling back to Windows-1252 per file.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            text.into_owned()
        }
    }
}

/// Walks one root, returning fingerprinted files in deterministic path
/// order plus per-file errors. Oversized files are skipped silently (they
/// were never eligible), unreadable ones are reported.
pub fn scan_root(root: &ScanRoot, matcher: &ExcludeMatcher, max_file_bytes: u64) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    for entry in WalkDir::new(&root.path).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_else(|| root.path.to_string_lossy().to_string());
                outcome.errors.push(FileError {
                    path,
                    message: err.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(&root.path).unwrap_or(path);
        if matcher.is_excluded(relative) {
            continue;
        }

        let store_path = match &root.alias {
            Some(alias) => format!("{}/{}", alias, relative.to_string_lossy()),
            None => relative.to_string_lossy().to_string(),
        };

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                outcome.errors.push(FileError {
                    path: store_path,
                    message: err.to_string(),
                });
                continue;
            }
        };
        if metadata.len() > max_file_bytes {
            tracing::debug!(path = %store_path, size = metadata.len(), "skipping oversized file");
            continue;
        }

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                outcome.errors.push(FileError {
                    path: store_path,
                    message: err.to_string(),
                });
                continue;
            }
        };

        outcome.files.push(ScannedFile {
            path: store_path,
            abs_path: path.to_path_buf(),
            filename: entry.file_name().to_string_lossy().to_string(),
            doc_type: doc_type_for_path(path),
            size_bytes: metadata.len(),
            fingerprint: fingerprint_bytes(&bytes),
            source_id: root.source_id,
        });
    }

    // Sort for deterministic ordering
    outcome.files.sort_by(|a, b| a.path.cmp(&b.path));
    outcome
}
