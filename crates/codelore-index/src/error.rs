//! Error types for codelore-index.

/// Errors that can occur while extracting, ingesting or retrieving.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Graph store error.
    #[error("graph store error: {0}")]
    Graph(#[from] codelore_graph::GraphStoreError),

    /// LLM provider error (chat or embedding).
    #[error("LLM error: {0}")]
    Llm(#[from] codelore_llm::LlmError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tree-sitter parsing error.
    #[error("parse failed: {0}")]
    Parse(String),

    #[error("unsupported language")]
    UnsupportedLanguage,

    /// A spawned extraction task panicked or was cancelled.
    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
