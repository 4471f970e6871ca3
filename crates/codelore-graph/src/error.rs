/// Errors raised by graph store backends.
#[derive(Debug, thiserror::Error)]
pub enum GraphStoreError {
    /// The store could not be reached or answered with a transport-level failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// The store rejected a statement.
    #[error("statement failed [{code}]: {message}")]
    Statement { code: String, message: String },

    /// The transaction handle is unknown, already finished, or could not be opened.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A relation endpoint does not exist.
    #[error("node not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphStoreError {
    /// Transport failures are worth retrying; statement failures are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<reqwest::Error> for GraphStoreError {
    fn from(e: reqwest::Error) -> Self {
        Self::Connection(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GraphStoreError>;
