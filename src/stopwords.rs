//! Stopword filtering for TF-IDF tokenization.
//!
//! Combines the standard English list from the `stop-words` crate with a
//! small supplement of terms that saturate note collections. Stopwords are
//! low-value terms filtered during tokenization so similarity scoring keys
//! on content words.

use std::collections::HashSet;

use stop_words::LANGUAGE;

/// A stopword filter over lowercase English terms.
///
/// Uses a `HashSet` for O(1) lookup. Matching is ASCII case-insensitive.
#[derive(Clone)]
pub struct Stopwords {
    words: HashSet<String>,
}

impl Default for Stopwords {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopwords {
    /// Creates a filter with the English stopword list plus the note-domain
    /// supplement.
    pub fn new() -> Self {
        let mut words: HashSet<String> = stop_words::get(LANGUAGE::English)
            .into_iter()
            .map(|word| word.to_lowercase())
            .collect();

        for word in NOTE_NOISE {
            words.insert((*word).to_string());
        }

        Self { words }
    }

    /// Checks if a term is a stopword.
    pub fn contains(&self, term: &str) -> bool {
        self.words.contains(&term.to_ascii_lowercase())
    }
}

/// Terms that dominate personal note trees without distinguishing anything.
static NOTE_NOISE: &[&str] = &[
    "etc", "misc", "note", "notes", "stuff", "thing", "things", "todo",
];
