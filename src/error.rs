use thiserror::Error;

/// Failures talking to the REST backend.
///
/// `Clone` so one outcome can be handed to every caller joined on a request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("backend rejected {action} on {resource}")]
    Rejected {
        resource: &'static str,
        action: &'static str,
    },

    #[error("{action} is not supported for {resource}")]
    Unsupported {
        resource: &'static str,
        action: &'static str,
    },
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Errors surfaced by store actions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("request {key} timed out")]
    Timeout { key: String },

    #[error("request {key} was aborted")]
    Aborted { key: String },

    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: i64 },
}

/// Durable storage failures. Swallowed by the cache, never returned to callers.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage quota exceeded writing {key} ({needed} bytes, {available} available)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
