use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Instagram API error: {0}")]
    InstagramApi(#[from] InstagramApiError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Coarse classification that drives retry, abort and stall decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing or invalid settings. The poll cycle is retried after a delay.
    Configuration,
    /// Credentials or session rejected. Fatal for the current attempt.
    Authentication,
    /// Network blips and rate limits. Retried with bounded backoff.
    RetryableTransport,
    /// Permanent platform failure. Aborts the current fetch only.
    FatalClient,
    /// Disk or encoding failure while saving results.
    Persistence,
}

#[derive(Error, Debug, Clone)]
pub enum InstagramApiError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Login required")]
    LoginRequired,

    #[error("Challenge required: {reason}")]
    ChallengeRequired { reason: String },

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },

    #[error("Media not found: {media_id}")]
    MediaNotFound { media_id: String },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Invalid post URL: {url}")]
    InvalidPostUrl { url: String },

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Client error {status_code}: {message}")]
    ClientError { status_code: u16, message: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration format: {details}")]
    InvalidFormat { details: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Permission denied accessing config: {path}")]
    PermissionDenied { path: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to create directory {path}: {reason}")]
    CreateDirFailed { path: String, reason: String },

    #[error("Failed to encode records for {resource_id}: {reason}")]
    EncodeFailed { resource_id: String, reason: String },

    #[error("Failed to write {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("Failed to replace {path}: {reason}")]
    RenameFailed { path: String, reason: String },

    #[error("Failed to read {path}: {reason}")]
    ReadFailed { path: String, reason: String },
}

impl CoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CoreError::InstagramApi(e) => e.class(),
            CoreError::Config(_) => ErrorClass::Configuration,
            CoreError::Persistence(_) | CoreError::Io(_) => ErrorClass::Persistence,
            CoreError::Network(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    ErrorClass::RetryableTransport
                } else {
                    ErrorClass::FatalClient
                }
            }
            CoreError::Serialization(_) => ErrorClass::FatalClient,
        }
    }
}

impl InstagramApiError {
    pub fn class(&self) -> ErrorClass {
        match self {
            InstagramApiError::AuthenticationFailed { .. }
            | InstagramApiError::LoginRequired
            | InstagramApiError::ChallengeRequired { .. } => ErrorClass::Authentication,
            InstagramApiError::RateLimitExceeded { .. }
            | InstagramApiError::RequestTimeout
            | InstagramApiError::ConnectionFailed { .. } => ErrorClass::RetryableTransport,
            InstagramApiError::ServerError { status_code } if *status_code >= 500 => {
                ErrorClass::RetryableTransport
            }
            _ => ErrorClass::FatalClient,
        }
    }
}
