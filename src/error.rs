//! Error types shared across the quarry library.

/// Top-level error type for indexing and search operations.
///
/// Commands in `main.rs` downcast to this type where the exit path matters;
/// everything else propagates through `anyhow` untouched.
#[derive(Debug, thiserror::Error)]
pub enum QuarryError {
    /// Configuration file missing, malformed, or semantically invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Caller-supplied input rejected before any work was done.
    #[error("invalid input: {0}")]
    Input(String),

    /// A file named on the command line is not present in the index.
    #[error("file not indexed: {0}")]
    FileNotIndexed(String),

    /// An external search engine is missing or unusable.
    #[error("{engine} not available: {reason}. {hint}")]
    EngineUnavailable {
        engine: &'static str,
        reason: String,
        hint: &'static str,
    },

    /// An external search engine ran past its configured deadline.
    #[error("search timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// A file could not be read or decoded during scanning.
    #[error("cannot read {path}: {message}")]
    TransientIo { path: String, message: String },

    /// The store rejected a write; the transaction was rolled back.
    #[error("index integrity error: {0}")]
    Integrity(String),
}

impl QuarryError {
    /// Error for a missing ripgrep binary, with the install hint users
    /// actually need.
    pub fn ripgrep_unavailable(reason: impl Into<String>) -> Self {
        QuarryError::EngineUnavailable {
            engine: "ripgrep (rg)",
            reason: reason.into(),
            hint: "Install with: sudo apt install ripgrep",
        }
    }
}
