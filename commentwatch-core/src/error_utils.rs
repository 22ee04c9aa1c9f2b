use crate::error::*;
use tracing::{error, warn};

/// Longest error text carried into a log line.
pub const MAX_LOGGED_ERROR_CHARS: usize = 200;

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

/// Cuts a message to `max_chars` characters without splitting a code point.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &message[..idx]),
        None => message.to_string(),
    }
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::InstagramApi(e) => {
                error!("Instagram API error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            CoreError::Persistence(e) => {
                error!("Persistence error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::RetryableTransport
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::InstagramApi(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Persistence(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::InstagramApi(_) => "INSTAGRAM_API".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Persistence(_) => "PERSISTENCE".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
        }
    }
}

impl ErrorExt for InstagramApiError {
    fn log_error(&self) -> &Self {
        error!("InstagramApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("InstagramApiError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::RetryableTransport
    }

    fn user_friendly_message(&self) -> String {
        match self {
            InstagramApiError::AuthenticationFailed { .. } => {
                "Instagram login failed. Please check your username and password.".to_string()
            }
            InstagramApiError::LoginRequired => {
                "The Instagram session has expired. A fresh login is needed.".to_string()
            }
            InstagramApiError::ChallengeRequired { .. } => {
                "Instagram requires a security challenge. Log in from a browser first."
                    .to_string()
            }
            InstagramApiError::RateLimitExceeded { retry_after } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                retry_after
            ),
            InstagramApiError::MediaNotFound { media_id } => {
                format!("Post {} could not be found. It may have been deleted.", media_id)
            }
            InstagramApiError::Forbidden { resource } => format!(
                "Access denied to {}. The account may not be allowed to view it.",
                resource
            ),
            InstagramApiError::InvalidPostUrl { url } => {
                format!("'{}' is not a recognizable Instagram post link.", url)
            }
            InstagramApiError::RequestTimeout => {
                "Request to Instagram timed out. Please try again.".to_string()
            }
            _ => "Instagram API error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            InstagramApiError::AuthenticationFailed { .. } => "IG_AUTH_FAILED".to_string(),
            InstagramApiError::LoginRequired => "IG_LOGIN_REQUIRED".to_string(),
            InstagramApiError::ChallengeRequired { .. } => "IG_CHALLENGE_REQUIRED".to_string(),
            InstagramApiError::RateLimitExceeded { .. } => "IG_RATE_LIMIT".to_string(),
            InstagramApiError::RequestTimeout => "IG_TIMEOUT".to_string(),
            InstagramApiError::ConnectionFailed { .. } => "IG_CONNECTION_FAILED".to_string(),
            InstagramApiError::ServerError { .. } => "IG_SERVER_ERROR".to_string(),
            InstagramApiError::MediaNotFound { .. } => "IG_MEDIA_NOT_FOUND".to_string(),
            InstagramApiError::Forbidden { .. } => "IG_FORBIDDEN".to_string(),
            InstagramApiError::InvalidPostUrl { .. } => "IG_INVALID_POST_URL".to_string(),
            InstagramApiError::InvalidResponse { .. } => "IG_INVALID_RESPONSE".to_string(),
            InstagramApiError::ClientError { .. } => "IG_CLIENT_ERROR".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false // the poller re-reads settings on its own schedule
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Settings file '{}' not found.", path)
            }
            ConfigError::InvalidFormat { .. } | ConfigError::Parse(_) => {
                "Settings file format is invalid. Please check the settings.".to_string()
            }
            ConfigError::MissingField { field } => {
                format!("Required settings field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for settings field '{}'.", field)
            }
            ConfigError::PermissionDenied { .. } => {
                "Permission denied reading settings. Please check file permissions.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::InvalidFormat { .. } => "CONFIG_INVALID_FORMAT".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::PermissionDenied { .. } => "CONFIG_PERMISSION_DENIED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

impl ErrorExt for PersistenceError {
    fn log_error(&self) -> &Self {
        error!("PersistenceError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("PersistenceError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            PersistenceError::CreateDirFailed { path, .. } => {
                format!("Could not create output directory {}.", path)
            }
            PersistenceError::WriteFailed { path, .. }
            | PersistenceError::RenameFailed { path, .. } => {
                format!("Could not save comments to {}. Check free space and permissions.", path)
            }
            PersistenceError::ReadFailed { path, .. } => format!("Could not read {}.", path),
            PersistenceError::EncodeFailed { resource_id, .. } => {
                format!("Comments for {} could not be encoded.", resource_id)
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            PersistenceError::CreateDirFailed { .. } => "STORE_CREATE_DIR_FAILED".to_string(),
            PersistenceError::EncodeFailed { .. } => "STORE_ENCODE_FAILED".to_string(),
            PersistenceError::WriteFailed { .. } => "STORE_WRITE_FAILED".to_string(),
            PersistenceError::RenameFailed { .. } => "STORE_RENAME_FAILED".to_string(),
            PersistenceError::ReadFailed { .. } => "STORE_READ_FAILED".to_string(),
        }
    }
}
