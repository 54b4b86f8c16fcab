//! Runs ripgrep as a child process and parses its `--json` event stream.
//!
//! Both the lexical search channel and `grep` consume the same stream;
//! they differ only in whether context lines are requested. ripgrep exits
//! 0 on matches and 1 on none, so only status 2 (or a signal) is an error.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::QuarryError;

/// One line of ripgrep's NDJSON output.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum RgEvent {
    Begin(RgBegin),
    Match(RgMatch),
    Context(RgContext),
    End(RgEnd),
    Summary(serde_json::Value),
}

/// Text payload. ripgrep substitutes a `bytes` field for invalid UTF-8,
/// in which case `text` is absent and the event is skipped by callers.
#[derive(Debug, Deserialize)]
pub struct RgText {
    pub text: Option<String>,
}

impl RgText {
    pub fn as_str(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

#[derive(Debug, Deserialize)]
pub struct RgBegin {
    pub path: RgText,
}

#[derive(Debug, Deserialize)]
pub struct RgMatch {
    pub path: RgText,
    pub lines: RgText,
    pub line_number: Option<u64>,
    #[serde(default)]
    pub submatches: Vec<RgSubmatch>,
}

#[derive(Debug, Deserialize)]
pub struct RgSubmatch {
    #[serde(rename = "match")]
    pub matched: RgText,
}

#[derive(Debug, Deserialize)]
pub struct RgContext {
    pub path: RgText,
    pub lines: RgText,
    pub line_number: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RgEnd {
    pub path: RgText,
}

/// Runs `rg --json -i` over one root and returns the event stream in
/// order. `context` adds `-C n` when non-zero; `excludes` become negated
/// `--glob` rules so both engines skip the same files.
pub async fn run_ripgrep(
    query: &str,
    root: &Path,
    context: usize,
    excludes: &[String],
    timeout: Duration,
) -> Result<Vec<RgEvent>> {
    let rg = which::which("rg").map_err(|e| QuarryError::ripgrep_unavailable(e.to_string()))?;

    let mut command = tokio::process::Command::new(rg);
    command.arg("--json").arg("-i");
    if context > 0 {
        command.arg("-C").arg(context.to_string());
    }
    for pattern in excludes {
        command.arg("--glob").arg(format!("!{}", pattern));
    }
    command.arg("--").arg(query).arg(root);
    command.stdin(std::process::Stdio::null());
    command.kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(result) => result.context("failed to run rg")?,
        Err(_) => {
            return Err(QuarryError::Timeout {
                seconds: timeout.as_secs(),
            }
            .into())
        }
    };

    match output.status.code() {
        Some(0) | Some(1) => {}
        _ => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("rg failed ({}): {}", output.status, stderr.trim());
        }
    }

    Ok(parse_events(&output.stdout))
}

/// Parses NDJSON output, dropping lines that are not well-formed events.
pub fn parse_events(stdout: &[u8]) -> Vec<RgEvent> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<RgEvent>(line).ok())
        .collect()
}
