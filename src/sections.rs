//! Section extraction: segmenting document text into typed, optionally dated
//! line ranges.
//!
//! This is a pure module with no store or filesystem access. Each document
//! type maps to one extraction strategy; sections are always recomputed
//! wholesale when a document's content changes, never patched.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Type tag attached to every extracted section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Markdown header-delimited section (or whole headerless file).
    MdHeader,
    /// Header whose text literally contains the section date.
    DateHeader,
    /// Run of non-blank lines between separators.
    BlankSeparated,
    /// Log section started by a timestamp-prefixed line.
    LogTimestamp,
    /// Code section started by a function/class/definition line.
    CodeDefinition,
    /// Code section started by a comment or docstring opener.
    CommentBlock,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::MdHeader => "md-header",
            SectionKind::DateHeader => "date-header",
            SectionKind::BlankSeparated => "blank-separated",
            SectionKind::LogTimestamp => "log-timestamp",
            SectionKind::CodeDefinition => "code-definition",
            SectionKind::CommentBlock => "comment-block",
        }
    }

    pub fn from_tag(tag: &str) -> Option<SectionKind> {
        match tag {
            "md-header" => Some(SectionKind::MdHeader),
            "date-header" => Some(SectionKind::DateHeader),
            "blank-separated" => Some(SectionKind::BlankSeparated),
            "log-timestamp" => Some(SectionKind::LogTimestamp),
            "code-definition" => Some(SectionKind::CodeDefinition),
            "comment-block" => Some(SectionKind::CommentBlock),
            _ => None,
        }
    }
}

/// A contiguous line range within a document. Line numbers are 1-indexed
/// and inclusive on both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub line_start: usize,
    pub line_end: usize,
    pub date: Option<String>,
    pub header: String,
    pub kind: SectionKind,
}

/// Extraction strategy, selected by document type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Markdown,
    Log,
    Code(CodeDialect),
    Text,
}

/// Language family for code section starters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeDialect {
    Python,
    JsFamily,
    CFamily,
    Shell,
}

impl Strategy {
    pub fn for_doc_type(doc_type: &str) -> Strategy {
        match doc_type {
            "markdown" => Strategy::Markdown,
            "log" => Strategy::Log,
            "python" => Strategy::Code(CodeDialect::Python),
            "javascript" | "typescript" => Strategy::Code(CodeDialect::JsFamily),
            "rust" => Strategy::Code(CodeDialect::CFamily),
            "shell" => Strategy::Code(CodeDialect::Shell),
            _ => Strategy::Text,
        }
    }
}

static MD_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+").unwrap());
static SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-=_*]{3,}$").unwrap());

static LOG_STARTERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // ISO date prefix: "2024-01-15 ...", "[2024-01-15] ...", "2024-01-15T..."
        Regex::new(r"^\[?\d{4}[-/]\d{2}[-/]\d{2}[\s\]T]").unwrap(),
        // Bracketed level then date: "[INFO] 2024-01-15 ..."
        Regex::new(r"^\[\w+\]\s*\d{4}[-/]\d{2}[-/]\d{2}").unwrap(),
        // Bare time prefix: "14:32:01 ..."
        Regex::new(r"^\d{2}:\d{2}:\d{2}").unwrap(),
    ]
});

static DEF_PYTHON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:def|class|async\s+def)\s+\w+").unwrap());
static DEF_JS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:function|class|export|const|let|var)\s+|^(?:async\s+)?function").unwrap()
});
static DEF_C: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:public|private|protected|static|class|struct|func|fn)\s+").unwrap());
static DEF_SHELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\w+\s*\(\)|function\s+\w+)").unwrap());

impl CodeDialect {
    fn definition_pattern(&self) -> &'static Regex {
        match self {
            CodeDialect::Python => &DEF_PYTHON,
            CodeDialect::JsFamily => &DEF_JS,
            CodeDialect::CFamily => &DEF_C,
            CodeDialect::Shell => &DEF_SHELL,
        }
    }

    fn hash_rules_start_comments(&self) -> bool {
        matches!(self, CodeDialect::Python | CodeDialect::Shell)
    }
}

static DATE_YMD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(20\d{2})[-/](0[1-9]|1[0-2])[-/](0[1-9]|[12]\d|3[01])\b").unwrap()
});
static DATE_MDY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(0[1-9]|1[0-2])[-/](0[1-9]|[12]\d|3[01])[-/](20\d{2})\b").unwrap()
});
static DATE_MDY_FLEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})[-/](\d{1,2})[-/](20\d{2})\b").unwrap());

/// Finds the first calendar-valid date in a line, normalized to YYYY-MM-DD.
///
/// Tries ISO year-first, then zero-padded US order, then unpadded US order.
pub fn find_date_in_line(line: &str) -> Option<String> {
    if let Some(caps) = DATE_YMD.captures(line) {
        if let Some(date) = normalize_date(&caps[1], &caps[2], &caps[3]) {
            return Some(date);
        }
    }
    if let Some(caps) = DATE_MDY.captures(line) {
        if let Some(date) = normalize_date(&caps[3], &caps[1], &caps[2]) {
            return Some(date);
        }
    }
    if let Some(caps) = DATE_MDY_FLEX.captures(line) {
        if let Some(date) = normalize_date(&caps[3], &caps[1], &caps[2]) {
            return Some(date);
        }
    }
    None
}

fn normalize_date(year: &str, month: &str, day: &str) -> Option<String> {
    let y: i32 = year.parse().ok()?;
    let m: u32 = month.parse().ok()?;
    let d: u32 = day.parse().ok()?;
    if !(2000..=2099).contains(&y) {
        return None;
    }
    NaiveDate::from_ymd_opt(y, m, d)?;
    Some(format!("{y:04}-{m:02}-{d:02}"))
}

fn detect_section_date(lines: &[&str], start: usize, max_scan: usize) -> Option<String> {
    lines
        .iter()
        .skip(start)
        .take(max_scan)
        .find_map(|line| find_date_in_line(line))
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Extracts ordered sections from document text.
///
/// Line endings are normalized and trailing blank lines dropped before
/// segmentation, so line numbers refer to the normalized text. Empty input
/// yields no sections.
pub fn extract_sections(content: &str, doc_type: &str) -> Vec<Section> {
    let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<&str> = normalized.split('\n').collect();
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        return Vec::new();
    }

    let mut sections = match Strategy::for_doc_type(doc_type) {
        Strategy::Markdown => markdown_sections(&lines),
        Strategy::Log => log_sections(&lines),
        Strategy::Code(dialect) => code_sections(&lines, dialect),
        Strategy::Text => text_sections(&lines),
    };

    // A header whose text literally spells the section date gets the
    // stronger tag, e.g. "#### 2024-01-15:".
    for section in &mut sections {
        if let Some(date) = &section.date {
            if matches!(
                section.kind,
                SectionKind::MdHeader | SectionKind::BlankSeparated
            ) && section.header.replace('/', "-").contains(date.as_str())
            {
                section.kind = SectionKind::DateHeader;
            }
        }
    }

    sections
}

/// Returns the first section whose range contains the given 1-indexed line.
pub fn section_for_line(sections: &[Section], line: usize) -> Option<&Section> {
    sections
        .iter()
        .find(|s| s.line_start <= line && line <= s.line_end)
}

fn markdown_sections(lines: &[&str]) -> Vec<Section> {
    let headers: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| MD_HEADER.is_match(line))
        .map(|(idx, _)| idx)
        .collect();

    if headers.is_empty() {
        return vec![Section {
            line_start: 1,
            line_end: lines.len(),
            date: detect_section_date(lines, 0, 10),
            header: truncate_chars(lines[0].trim(), 100),
            kind: SectionKind::MdHeader,
        }];
    }

    let mut sections = Vec::with_capacity(headers.len() + 1);

    // Lines before the first header form a preamble section, so markdown
    // boundaries always partition the file exactly.
    if headers[0] > 0 {
        sections.push(Section {
            line_start: 1,
            line_end: headers[0],
            date: detect_section_date(&lines[..headers[0]], 0, 5),
            header: truncate_chars(lines[0].trim(), 100),
            kind: SectionKind::MdHeader,
        });
    }

    for (i, &start) in headers.iter().enumerate() {
        let end = headers.get(i + 1).copied().unwrap_or(lines.len());
        sections.push(Section {
            line_start: start + 1,
            line_end: end,
            date: find_date_in_line(lines[start]),
            header: truncate_chars(lines[start].trim(), 100),
            kind: SectionKind::MdHeader,
        });
    }

    sections
}

fn is_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || SEPARATOR.is_match(trimmed)
}

fn text_sections(lines: &[&str]) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut open: Option<usize> = None;

    for (idx, line) in lines.iter().enumerate() {
        if is_separator(line) {
            if let Some(start) = open.take() {
                sections.push(blank_separated(lines, start, idx));
            }
        } else if open.is_none() {
            open = Some(idx);
        }
    }
    if let Some(start) = open {
        sections.push(blank_separated(lines, start, lines.len()));
    }

    sections
}

fn blank_separated(lines: &[&str], start: usize, end: usize) -> Section {
    Section {
        line_start: start + 1,
        line_end: end,
        date: detect_section_date(lines, start, 5),
        header: truncate_chars(lines[start].trim(), 100),
        kind: SectionKind::BlankSeparated,
    }
}

fn log_sections(lines: &[&str]) -> Vec<Section> {
    let starters: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| LOG_STARTERS.iter().any(|re| re.is_match(line)))
        .map(|(idx, _)| idx)
        .collect();

    if starters.is_empty() {
        return text_sections(lines);
    }

    starters
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starters.get(i + 1).copied().unwrap_or(lines.len());
            Section {
                line_start: start + 1,
                line_end: end,
                date: find_date_in_line(lines[start]),
                header: truncate_chars(lines[start].trim(), 100),
                kind: SectionKind::LogTimestamp,
            }
        })
        .collect()
}

fn is_comment_starter(line: &str, dialect: CodeDialect) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with("/*") || trimmed.starts_with("\"\"\"") || trimmed.starts_with("'''") {
        return true;
    }
    dialect.hash_rules_start_comments()
        && (trimmed.starts_with("# =")
            || trimmed.starts_with("#===")
            || trimmed.starts_with("# ---")
            || trimmed.starts_with("#---"))
}

fn code_sections(lines: &[&str], dialect: CodeDialect) -> Vec<Section> {
    let mut starters: Vec<(usize, SectionKind)> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if is_comment_starter(line, dialect) {
            starters.push((idx, SectionKind::CommentBlock));
        } else if dialect.definition_pattern().is_match(line) {
            starters.push((idx, SectionKind::CodeDefinition));
        }
    }

    if starters.is_empty() {
        return text_sections(lines);
    }

    starters
        .iter()
        .enumerate()
        .map(|(i, &(start, kind))| {
            let end = starters.get(i + 1).map(|&(next, _)| next).unwrap_or(lines.len());
            Section {
                line_start: start + 1,
                line_end: end,
                date: detect_section_date(lines, start, 3),
                header: truncate_chars(lines[start].trim(), 100),
                kind,
            }
        })
        .collect()
}
