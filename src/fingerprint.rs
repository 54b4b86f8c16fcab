//! Content fingerprinting and change detection.
//!
//! Fingerprints are truncated SHA-256 digests of raw file bytes. They are
//! used only for equality tests between index passes, never as a security
//! boundary, so 16 hex chars is plenty.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

const FINGERPRINT_LEN: usize = 16;

/// Fingerprint of raw file bytes.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let hex = format!("{:x}", hasher.finalize());
    hex[..FINGERPRINT_LEN].to_string()
}

/// Order-independent fingerprint over a set of per-document fingerprints.
///
/// Stored in the manifest after each committed pass; any document change,
/// addition, or removal produces a different aggregate.
pub fn aggregate_fingerprint<'a, I>(fingerprints: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut sorted: Vec<&str> = fingerprints.into_iter().collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for fp in sorted {
        hasher.update(fp.as_bytes());
    }
    let hex = format!("{:x}", hasher.finalize());
    hex[..FINGERPRINT_LEN].to_string()
}

/// Result of diffing a fresh scan against the persisted fingerprint map.
///
/// The three path lists are disjoint and sorted. Paths that errored during
/// the scan appear in none of them: an unreadable file is reported, not
/// treated as deleted or unchanged.
#[derive(Debug, Default)]
pub struct StateDiff {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: usize,
}

/// Computes additions, deletions, and changed/unchanged splits between the
/// persisted fingerprint map and a freshly scanned one.
pub fn diff_states(
    indexed: &HashMap<String, String>,
    current: &HashMap<String, String>,
    errored: &HashSet<String>,
) -> StateDiff {
    let mut diff = StateDiff::default();

    for (path, fingerprint) in current {
        match indexed.get(path) {
            None => diff.added.push(path.clone()),
            Some(old) if old != fingerprint => diff.changed.push(path.clone()),
            Some(_) => diff.unchanged += 1,
        }
    }

    for path in indexed.keys() {
        if !current.contains_key(path) && !errored.contains(path) {
            diff.deleted.push(path.clone());
        }
    }

    diff.added.sort();
    diff.changed.sort();
    diff.deleted.sort();
    diff
}
