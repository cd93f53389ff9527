use thiserror::Error;

/// Main error type for the document service
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Invalid request parameters or document shape
    #[error("InvalidInput: {0}")]
    InvalidInput(String),

    /// Missing or invalid credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Document or resource not found
    #[error("NotFound: {0}")]
    NotFound(String),

    /// Per-principal rate limit exceeded
    #[error("TooManyRequests: rate limit exceeded")]
    TooManyRequests,

    /// Caller-supplied version does not follow prior + 1
    #[error("VersionConflict: {0}")]
    VersionConflict(String),

    /// Metadata failed validation rules
    #[error("MetadataInvalid: {0}")]
    MetadataInvalid(String),

    /// Embedding provider unreachable or exhausted retries
    #[error("EmbeddingUnavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Similarity engine unreachable or exhausted retries
    #[error("VectorStoreUnavailable: {0}")]
    VectorStoreUnavailable(String),

    /// Document store unreachable or exhausted retries
    #[error("MetadataStoreUnavailable: {0}")]
    MetadataStoreUnavailable(String),

    /// Operation deadline crossed
    #[error("Timeout: operation deadline exceeded")]
    Timeout,

    /// Configuration error (bad env values, provider credentials)
    #[error("Config: {0}")]
    Config(String),

    /// Serialization error
    #[error("Internal: serialization: {0}")]
    Serialization(String),

    /// Generic internal error, redacted at the gateway
    #[error("Internal: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Serialization(err.to_string())
    }
}

/// Transience class used by the retry primitive; only `RateLimit` and
/// `Connection` are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RateLimit,
    Connection,
    Other,
}

impl ApiError {
    /// Stable kind tag used in wire error strings
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "InvalidInput",
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::NotFound(_) => "NotFound",
            ApiError::TooManyRequests => "TooManyRequests",
            ApiError::VersionConflict(_) => "VersionConflict",
            ApiError::MetadataInvalid(_) => "MetadataInvalid",
            ApiError::EmbeddingUnavailable(_) => "EmbeddingUnavailable",
            ApiError::VectorStoreUnavailable(_) => "VectorStoreUnavailable",
            ApiError::MetadataStoreUnavailable(_) => "MetadataStoreUnavailable",
            ApiError::Timeout => "Timeout",
            ApiError::Config(_) => "Config",
            ApiError::Serialization(_) => "Internal",
            ApiError::Internal(_) => "Internal",
        }
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidInput(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::TooManyRequests => 429,
            ApiError::VersionConflict(_) => 409,
            ApiError::MetadataInvalid(_) => 422,
            ApiError::EmbeddingUnavailable(_) => 503,
            ApiError::VectorStoreUnavailable(_) => 503,
            ApiError::MetadataStoreUnavailable(_) => 503,
            ApiError::Timeout => 504,
            ApiError::Config(_) => 500,
            ApiError::Serialization(_) => 500,
            ApiError::Internal(_) => 500,
        }
    }

    /// Classify for retry purposes. Adapter errors carry the upstream
    /// response class in their message ("rate limit" for 429-class
    /// responses), everything else on an unavailable service counts as a
    /// connection problem.
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::TooManyRequests => ErrorClass::RateLimit,
            ApiError::EmbeddingUnavailable(msg)
            | ApiError::VectorStoreUnavailable(msg)
            | ApiError::MetadataStoreUnavailable(msg) => {
                let msg = msg.to_lowercase();
                if msg.contains("rate limit") || msg.contains("429") {
                    ErrorClass::RateLimit
                } else {
                    ErrorClass::Connection
                }
            }
            ApiError::Timeout => ErrorClass::Connection,
            _ => ErrorClass::Other,
        }
    }

    /// Whether the retry primitive should re-attempt this error
    pub fn is_transient(&self) -> bool {
        matches!(self.class(), ErrorClass::RateLimit | ErrorClass::Connection)
    }

    /// Message surfaced to clients; `Internal` details stay in the logs
    pub fn client_message(&self) -> String {
        match self {
            ApiError::Internal(_) | ApiError::Serialization(_) => {
                "Internal: internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias for service operations
pub type ApiResult<T> = Result<T, ApiError>;
