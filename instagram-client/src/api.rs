use crate::client::{InstagramApi, PageRequest};
use crate::session::{DeviceIds, SessionBlob};
use crate::shortcode::media_pk_from_reference;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use commentwatch_core::{CoreError, Credentials, InstagramApiError, MediaMetadata};
use reqwest::header::{HeaderMap, COOKIE, REFERER, RETRY_AFTER, SET_COOKIE, USER_AGENT};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const API_BASE: &str = "https://i.instagram.com/api/v1";
const WEB_BASE: &str = "https://www.instagram.com";
const IG_APP_ID: &str = "1217981644879628";
const SESSION_COOKIE: &str = "sessionid";
const CSRF_COOKIE: &str = "csrftoken";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub user_agent: String,
    pub timeout: Duration,
    /// Each request is preceded by a random pause in this range.
    pub min_request_delay: Duration,
    pub max_request_delay: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            min_request_delay: Duration::from_secs(3),
            max_request_delay: Duration::from_secs(6),
        }
    }
}

/// [`InstagramApi`] over Instagram's web login and private JSON API.
pub struct InstagramApiClient {
    http_client: Client,
    config: ApiClientConfig,
    user_agent: String,
    cookies: Mutex<BTreeMap<String, String>>,
    device: DeviceIds,
    username: Option<String>,
    last_login: Option<DateTime<Utc>>,
}

impl InstagramApiClient {
    pub fn new(config: ApiClientConfig) -> Result<Self, CoreError> {
        let http_client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http_client,
            user_agent: config.user_agent.clone(),
            config,
            cookies: Mutex::new(BTreeMap::new()),
            device: DeviceIds::generate(),
            username: None,
            last_login: None,
        })
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    fn cookie_header(&self) -> String {
        self.cookies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn store_cookies(&self, headers: &HeaderMap) {
        let mut cookies = self.cookies.lock().unwrap_or_else(|e| e.into_inner());
        for raw in headers.get_all(SET_COOKIE) {
            let Ok(raw) = raw.to_str() else { continue };
            let pair = raw.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let (name, value) = (name.trim(), value.trim().trim_matches('"'));
            if value.is_empty() {
                cookies.remove(name);
            } else {
                cookies.insert(name.to_string(), value.to_string());
            }
        }
    }

    async fn pace(&self) {
        let min = self.config.min_request_delay.as_millis() as u64;
        let max = (self.config.max_request_delay.as_millis() as u64).max(min);
        if max == 0 {
            return;
        }
        sleep(Duration::from_millis(fastrand::u64(min..=max))).await;
    }

    fn api_request(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header("X-IG-App-ID", IG_APP_ID)
            .header("X-IG-Device-ID", &self.device.uuid)
            .header("X-IG-Android-ID", &self.device.device_id);
        match self.cookie(CSRF_COOKIE) {
            Some(csrf) => builder.header("X-CSRFToken", csrf),
            None => builder,
        }
    }

    /// Sends a request and returns the decoded JSON body, mapping failures
    /// onto [`InstagramApiError`].
    async fn send(&self, builder: RequestBuilder, endpoint: &str) -> Result<Value, CoreError> {
        self.pace().await;

        debug!("Instagram request: {}", endpoint);
        let response = builder
            .header(USER_AGENT, &self.user_agent)
            .header(COOKIE, self.cookie_header())
            .send()
            .await
            .map_err(transport_error)?;

        self.store_cookies(response.headers());
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body = response.text().await.map_err(transport_error)?;
        let json: Value = serde_json::from_str(&body).unwrap_or(Value::Null);

        let failed = json.get("status").and_then(Value::as_str) == Some("fail");
        if (200..300).contains(&status) && !failed {
            if json.is_null() {
                return Err(InstagramApiError::InvalidResponse {
                    details: format!("non-JSON body from {}", endpoint),
                }
                .into());
            }
            return Ok(json);
        }

        let error = map_failure(status, endpoint, &json, retry_after);
        warn!("Instagram request {} failed with status {}: {}", endpoint, status, error);
        Err(error.into())
    }

    /// Loads the login page so the server issues a CSRF cookie.
    async fn fetch_csrf_token(&self) -> Result<String, CoreError> {
        let response = self
            .http_client
            .get(format!("{}/accounts/login/", WEB_BASE))
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(transport_error)?;
        self.store_cookies(response.headers());

        self.cookie(CSRF_COOKIE).ok_or_else(|| {
            InstagramApiError::InvalidResponse {
                details: "login page did not set a CSRF token".to_string(),
            }
            .into()
        })
    }
}

fn transport_error(error: reqwest::Error) -> CoreError {
    if error.is_timeout() {
        InstagramApiError::RequestTimeout.into()
    } else if error.is_connect() || error.is_request() || error.is_body() {
        InstagramApiError::ConnectionFailed {
            reason: error.to_string(),
        }
        .into()
    } else {
        CoreError::Network(error)
    }
}

fn map_failure(
    status: u16,
    endpoint: &str,
    body: &Value,
    retry_after: Option<u64>,
) -> InstagramApiError {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if message == "login_required" {
        return InstagramApiError::LoginRequired;
    }
    if message.contains("challenge_required") || message.contains("checkpoint_required") {
        return InstagramApiError::ChallengeRequired {
            reason: message.to_string(),
        };
    }
    if status == 429 || message == "feedback_required" || message.contains("wait a few minutes")
    {
        return InstagramApiError::RateLimitExceeded {
            retry_after: retry_after.unwrap_or(60),
        };
    }

    match status {
        401 => InstagramApiError::LoginRequired,
        403 => InstagramApiError::Forbidden {
            resource: endpoint.to_string(),
        },
        500..=599 => InstagramApiError::ServerError {
            status_code: status,
        },
        _ => InstagramApiError::ClientError {
            status_code: status,
            message: if message.is_empty() {
                "request failed".to_string()
            } else {
                message.to_string()
            },
        },
    }
}

fn not_found_as_missing_media(error: CoreError, media_id: &str) -> CoreError {
    match error {
        CoreError::InstagramApi(InstagramApiError::ClientError {
            status_code: 404, ..
        }) => InstagramApiError::MediaNotFound {
            media_id: media_id.to_string(),
        }
        .into(),
        other => other,
    }
}

#[async_trait]
impl InstagramApi for InstagramApiClient {
    async fn login(&mut self, credentials: &Credentials) -> Result<(), CoreError> {
        self.cookies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();

        let csrf = self.fetch_csrf_token().await?;
        let enc_password = format!(
            "#PWD_INSTAGRAM_BROWSER:0:{}:{}",
            Utc::now().timestamp(),
            credentials.password
        );
        let form = [
            ("username", credentials.username.as_str()),
            ("enc_password", enc_password.as_str()),
            ("queryParams", "{}"),
            ("optIntoOneTap", "false"),
        ];

        let request = self
            .http_client
            .post(format!("{}/api/v1/web/accounts/login/ajax/", WEB_BASE))
            .header("X-CSRFToken", csrf)
            .header("X-IG-App-ID", IG_APP_ID)
            .header("X-Requested-With", "XMLHttpRequest")
            .header(REFERER, format!("{}/accounts/login/", WEB_BASE))
            .form(&form);

        let body = match self.send(request, "accounts/login").await {
            Ok(body) => body,
            Err(CoreError::InstagramApi(InstagramApiError::ClientError { message, .. })) => {
                return Err(InstagramApiError::AuthenticationFailed { reason: message }.into())
            }
            Err(e) => return Err(e),
        };

        if body.get("authenticated").and_then(Value::as_bool) != Some(true) {
            let reason = if body.get("user").and_then(Value::as_bool) == Some(false) {
                "unknown username"
            } else {
                "incorrect password"
            };
            return Err(InstagramApiError::AuthenticationFailed {
                reason: reason.to_string(),
            }
            .into());
        }

        if self.cookie(SESSION_COOKIE).is_none() {
            return Err(InstagramApiError::AuthenticationFailed {
                reason: "login response carried no session cookie".to_string(),
            }
            .into());
        }

        self.username = Some(credentials.username.clone());
        self.last_login = Some(Utc::now());
        info!(username = %credentials.username, "Instagram login accepted");
        Ok(())
    }

    fn resume_session(&mut self, session: SessionBlob) -> Result<(), CoreError> {
        let has_session_cookie = session
            .cookies
            .get(SESSION_COOKIE)
            .map(|v| !v.is_empty())
            .unwrap_or(false);
        if !has_session_cookie {
            return Err(InstagramApiError::LoginRequired.into());
        }

        *self.cookies.lock().unwrap_or_else(|e| e.into_inner()) = session.cookies;
        self.device = session.device;
        self.username = session.username;
        self.last_login = session.last_login;
        if !session.user_agent.is_empty() {
            self.user_agent = session.user_agent;
        }
        Ok(())
    }

    fn export_session(&self) -> Result<SessionBlob, CoreError> {
        let cookies = self
            .cookies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if !cookies.contains_key(SESSION_COOKIE) {
            return Err(InstagramApiError::LoginRequired.into());
        }

        Ok(SessionBlob {
            username: self.username.clone(),
            cookies,
            device: self.device.clone(),
            user_agent: self.user_agent.clone(),
            last_login: self.last_login,
        })
    }

    async fn probe(&self) -> Result<(), CoreError> {
        let request = self.api_request(self.http_client.get(format!("{}/news/inbox/", API_BASE)));
        self.send(request, "news/inbox").await.map(|_| ())
    }

    fn resolve_post_id(&self, post_reference: &str) -> Result<String, CoreError> {
        Ok(media_pk_from_reference(post_reference)?)
    }

    async fn media_metadata(&self, media_id: &str) -> Result<MediaMetadata, CoreError> {
        let endpoint = format!("media/{}/info", media_id);
        let request = self.api_request(
            self.http_client
                .get(format!("{}/media/{}/info/", API_BASE, media_id)),
        );
        let body = self
            .send(request, &endpoint)
            .await
            .map_err(|e| not_found_as_missing_media(e, media_id))?;

        let item = body
            .get("items")
            .and_then(|items| items.get(0))
            .ok_or_else(|| InstagramApiError::MediaNotFound {
                media_id: media_id.to_string(),
            })?;

        let code = item
            .get("code")
            .and_then(Value::as_str)
            .ok_or_else(|| InstagramApiError::InvalidResponse {
                details: format!("media {} has no shortcode", media_id),
            })?;

        Ok(MediaMetadata {
            comment_count: item
                .get("comment_count")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            code: code.to_string(),
        })
    }

    async fn comments_page(&self, request: PageRequest<'_>) -> Result<Vec<Value>, CoreError> {
        let endpoint = format!("media/{}/comments", request.media_id);
        let count = request.page_size.to_string();
        let mut params = vec![
            ("can_support_threading", "true"),
            ("permalink_enabled", "false"),
            ("count", count.as_str()),
        ];
        if let Some(cursor) = request.cursor {
            params.push(("max_id", cursor));
        }

        let builder = self.api_request(
            self.http_client
                .get(format!("{}/media/{}/comments/", API_BASE, request.media_id))
                .query(&params)
                .header(REFERER, format!("{}/p/{}/", WEB_BASE, request.code)),
        );

        let mut body = self
            .send(builder, &endpoint)
            .await
            .map_err(|e| not_found_as_missing_media(e, request.media_id))?;

        Ok(match body.get_mut("comments").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        })
    }
}
