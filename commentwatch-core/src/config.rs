//! Settings file model and loader.
//!
//! The settings file is re-read at the start of every poll cycle so edits to
//! the post list or interval take effect without a restart. JSON is the
//! default format; a `.toml` extension selects TOML.

use crate::error::ConfigError;
use crate::types::{Credentials, DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_MAX_COMMENTS};
use serde::Deserialize;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One validated snapshot of the settings file.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub instagram_username: String,
    pub instagram_password: String,
    pub posts: Vec<String>,
    pub check_interval: u64,
    pub max_comments: usize,
    pub output_dir: Option<PathBuf>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("instagram_username", &self.instagram_username)
            .field("instagram_password", &"********")
            .field("posts", &self.posts)
            .field("check_interval", &self.check_interval)
            .field("max_comments", &self.max_comments)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

impl Settings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    /// Login credentials, rejecting blank values.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        if self.instagram_username.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "instagram_username".to_string(),
            });
        }
        if self.instagram_password.is_empty() {
            return Err(ConfigError::MissingField {
                field: "instagram_password".to_string(),
            });
        }
        Ok(Credentials {
            username: self.instagram_username.trim().to_string(),
            password: self.instagram_password.clone(),
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let raw: RawSettings =
            serde_json::from_str(raw).map_err(|e| ConfigError::InvalidFormat {
                details: e.to_string(),
            })?;
        raw.validate()
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let raw: RawSettings = toml::from_str(raw)?;
        raw.validate()
    }
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    instagram_username: Option<String>,
    instagram_password: Option<String>,
    posts: Option<Vec<String>>,
    check_interval: Option<u64>,
    max_comments: Option<usize>,
    output_dir: Option<PathBuf>,
}

impl RawSettings {
    fn validate(self) -> Result<Settings, ConfigError> {
        let instagram_username = self
            .instagram_username
            .ok_or_else(|| missing("instagram_username"))?;
        let instagram_password = self
            .instagram_password
            .ok_or_else(|| missing("instagram_password"))?;
        let posts = self.posts.ok_or_else(|| missing("posts"))?;

        // may only lower the ceiling
        let max_comments = match self.max_comments {
            Some(n) if n == 0 || n > DEFAULT_MAX_COMMENTS => {
                return Err(ConfigError::InvalidValue {
                    field: "max_comments".to_string(),
                    value: n.to_string(),
                })
            }
            Some(n) => n,
            None => DEFAULT_MAX_COMMENTS,
        };

        Ok(Settings {
            instagram_username,
            instagram_password,
            posts: posts
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            check_interval: self.check_interval.unwrap_or(DEFAULT_CHECK_INTERVAL_SECS),
            max_comments,
            output_dir: self.output_dir,
        })
    }
}

fn missing(field: &str) -> ConfigError {
    ConfigError::MissingField {
        field: field.to_string(),
    }
}

/// Reads [`Settings`] from a fixed path on demand.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    path: PathBuf,
}

impl SettingsLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Settings, ConfigError> {
        let shown = self.path.display().to_string();
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ConfigError::FileNotFound {
                    path: shown.clone(),
                },
                ErrorKind::PermissionDenied => ConfigError::PermissionDenied {
                    path: shown.clone(),
                },
                _ => ConfigError::InvalidFormat {
                    details: format!("{}: {}", shown, e),
                },
            })?;

        let is_toml = self
            .path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let settings = if is_toml {
            Settings::from_toml_str(&raw)?
        } else {
            Settings::from_json_str(&raw)?
        };

        tracing::debug!(
            path = %shown,
            posts = settings.posts.len(),
            check_interval = settings.check_interval,
            "Loaded settings"
        );
        Ok(settings)
    }
}
