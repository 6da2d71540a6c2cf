use thiserror::Error;

pub type CostResult<T> = Result<T, CostError>;

/// Fatal request errors. These abort the emitter with an `error` event and
/// no `done` fires.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CostError {
    #[error("failed to parse {file}: {message}")]
    Parse { file: String, message: String },

    #[error("superseded by a newer request for {file}")]
    Debounced { file: String },
}

impl CostError {
    pub fn kind(&self) -> &'static str {
        match self {
            CostError::Parse { .. } => "ParseError",
            CostError::Debounced { .. } => "DebounceError",
        }
    }
}

/// Per-entry soft errors. The entry is still present in `calculated` and
/// `done`, carrying zero sizes alongside the error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntryError {
    #[error("bundling timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("bundler failed: {message}")]
    Bundle { message: String },
}

impl EntryError {
    pub fn kind(&self) -> &'static str {
        match self {
            EntryError::Timeout { .. } => "TimeoutError",
            EntryError::Bundle { .. } => "BundleError",
        }
    }
}
