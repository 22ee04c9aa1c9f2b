//! Session cache and the cookie-first login flow.
//!
//! [`SessionManager`] owns the platform client. It first tries the cached
//! session from disk and probes it; when there is no cache, or the server
//! rejects it, it falls back to a username/password login and caches the
//! fresh session for the next start.

use crate::client::InstagramApi;
use chrono::{DateTime, Utc};
use comment_store::write_atomic;
use commentwatch_core::{
    truncate_message, ConfigError, CoreError, Credentials, ErrorClass, MAX_LOGGED_ERROR_CHARS,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Identifiers the platform expects to stay stable for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIds {
    pub uuid: String,
    pub phone_id: String,
    pub device_id: String,
    pub client_session_id: String,
}

impl DeviceIds {
    pub fn generate() -> Self {
        let android = Uuid::new_v4().simple().to_string();
        Self {
            uuid: Uuid::new_v4().to_string(),
            phone_id: Uuid::new_v4().to_string(),
            device_id: format!("android-{}", &android[..16]),
            client_session_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Serialized form of an authenticated session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBlob {
    pub username: Option<String>,
    pub cookies: BTreeMap<String, String>,
    pub device: DeviceIds,
    pub user_agent: String,
    pub last_login: Option<DateTime<Utc>>,
}

impl fmt::Debug for SessionBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBlob")
            .field("username", &self.username)
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .field("device", &self.device)
            .field("user_agent", &self.user_agent)
            .field("last_login", &self.last_login)
            .finish()
    }
}

/// Reads and writes the session cache file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<SessionBlob, CoreError> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn save(&self, session: &SessionBlob) -> Result<(), CoreError> {
        let encoded = serde_json::to_vec_pretty(session)?;
        write_atomic(&self.path, &encoded).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    CachedSession,
    Credentials,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    NotAuthenticated,
    Probing,
    CredentialLogin,
    Authenticated {
        method: AuthMethod,
        since: DateTime<Utc>,
    },
    Failed {
        reason: String,
    },
}

pub struct SessionManager<C> {
    client: C,
    store: SessionStore,
    state: AuthState,
}

impl<C: InstagramApi> SessionManager<C> {
    pub fn new(client: C, store: SessionStore) -> Self {
        Self {
            client,
            store,
            state: AuthState::NotAuthenticated,
        }
    }

    /// Read access for callers that issue requests on the session.
    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, AuthState::Authenticated { .. })
    }

    /// Forgets the current session so the next [`ensure_session`] call
    /// re-validates or logs in again.
    ///
    /// [`ensure_session`]: SessionManager::ensure_session
    pub fn invalidate(&mut self) {
        if self.is_authenticated() {
            warn!("Session invalidated");
        }
        self.state = AuthState::NotAuthenticated;
    }

    /// Makes sure the client holds a session the server accepts.
    ///
    /// `credentials` is only consulted when the cached session is missing or
    /// rejected. Returns immediately when already authenticated.
    pub async fn ensure_session<F>(&mut self, credentials: F) -> Result<AuthMethod, CoreError>
    where
        F: FnOnce() -> Result<Credentials, ConfigError>,
    {
        if let AuthState::Authenticated { method, .. } = self.state {
            return Ok(method);
        }

        match self.try_cached_session().await {
            Ok(true) => return Ok(AuthMethod::CachedSession),
            Ok(false) => {}
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        }

        self.state = AuthState::CredentialLogin;
        let credentials = match credentials() {
            Ok(credentials) => credentials,
            Err(e) => {
                error!("Settings unavailable for credential login: {}", e);
                let e = CoreError::Config(e);
                self.fail(&e);
                return Err(e);
            }
        };

        info!(username = %credentials.username, "Logging in with username and password");
        if let Err(e) = self.client.login(&credentials).await {
            error!(
                username = %credentials.username,
                "Credential login failed: {}",
                truncate_message(&e.to_string(), MAX_LOGGED_ERROR_CHARS)
            );
            self.fail(&e);
            return Err(e);
        }
        info!(username = %credentials.username, "Logged in");

        match self.client.export_session() {
            Ok(blob) => match self.store.save(&blob).await {
                Ok(()) => info!(path = %self.store.path().display(), "Session cached"),
                Err(e) => error!("Failed to cache session: {}", e),
            },
            Err(e) => error!("Failed to export session: {}", e),
        }

        self.state = AuthState::Authenticated {
            method: AuthMethod::Credentials,
            since: Utc::now(),
        };
        Ok(AuthMethod::Credentials)
    }

    /// `Ok(false)` means fall back to credentials; `Err` means the attempt
    /// cannot continue at all.
    async fn try_cached_session(&mut self) -> Result<bool, CoreError> {
        let blob = match self.store.load().await {
            Ok(blob) => blob,
            Err(CoreError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %self.store.path().display(), "No cached session found");
                return Ok(false);
            }
            Err(e) => {
                warn!("Could not load cached session: {}", e);
                return Ok(false);
            }
        };
        debug!(session = ?blob, "Loaded cached session");

        if let Err(e) = self.client.resume_session(blob) {
            warn!("Cached session is unusable: {}", e);
            return Ok(false);
        }

        self.state = AuthState::Probing;
        info!("Checking cached session");
        match self.client.probe().await {
            Ok(()) => {
                info!("Authenticated with cached session");
                self.state = AuthState::Authenticated {
                    method: AuthMethod::CachedSession,
                    since: Utc::now(),
                };
                Ok(true)
            }
            Err(e) if matches!(e.class(), ErrorClass::Authentication | ErrorClass::FatalClient) => {
                warn!(
                    "Cached session rejected: {}",
                    truncate_message(&e.to_string(), MAX_LOGGED_ERROR_CHARS)
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn fail(&mut self, error: &CoreError) {
        self.state = AuthState::Failed {
            reason: truncate_message(&error.to_string(), MAX_LOGGED_ERROR_CHARS),
        };
    }
}
