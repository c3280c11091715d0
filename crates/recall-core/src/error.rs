use thiserror::Error;

/// A convenience `Result` alias using [`RecallError`].
pub type RecallResult<T> = Result<T, RecallError>;

/// Top-level error type for the Recall engine.
///
/// Parse failures on individual log lines and dimension mismatches are not
/// represented here: both are recovered locally and never reach a caller.
#[derive(Error, Debug)]
pub enum RecallError {
    /// The backing log could not be read or written.
    #[error("Store error: {0}")]
    Store(String),

    /// The embedding provider failed to produce a vector.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The embedding provider did not answer within the configured bound.
    #[error("Embedding timed out after {0} ms")]
    EmbeddingTimeout(u64),

    /// Configuration could not be parsed or failed shape validation.
    #[error("Config error: {0}")]
    Config(String),

    /// The caller supplied an argument the engine cannot act on.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An outbound HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecallError {
    /// Whether this error means the embedding provider is unreachable, as
    /// opposed to a local failure. `search_memories` and `hybrid_search`
    /// degrade on these instead of failing.
    pub fn is_provider_unavailable(&self) -> bool {
        matches!(
            self,
            RecallError::Embedding(_) | RecallError::EmbeddingTimeout(_) | RecallError::Http(_)
        )
    }
}
