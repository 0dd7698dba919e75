//! Error types for PolicyGuard

/// Result type alias using PolicyGuard's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for calls into external services
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Core error type for PolicyGuard operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Policy corpus errors
    #[error("corpus error: {0}")]
    Corpus(String),

    /// External service failures that could not be recovered locally
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new corpus error
    pub fn corpus(msg: impl Into<String>) -> Self {
        Self::Corpus(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Closed set of ways an external generation, embedding, or index call can fail.
///
/// Pipeline stages never let these escape; each stage converts them into its
/// own fail-safe output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The call did not complete within its budget
    #[error("call timed out")]
    Timeout,

    /// The upstream refused the call because of rate limiting
    #[error("rate limited by upstream")]
    RateLimited,

    /// The upstream could not be reached or returned a failure status
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// The upstream answered, but the answer could not be interpreted
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// Create a new unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a new malformed-response error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Short, stable identifier used in logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Unavailable(_) => "unavailable",
            Self::Malformed(_) => "malformed",
        }
    }
}
