use crate::session::SessionBlob;
use async_trait::async_trait;
use commentwatch_core::{CoreError, Credentials, MediaMetadata};
use serde_json::Value;

/// One comments page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest<'a> {
    pub media_id: &'a str,
    /// Shortcode of the post, used for the permalink referer.
    pub code: &'a str,
    /// `None` requests the newest page.
    pub cursor: Option<&'a str>,
    pub page_size: usize,
}

/// Everything the poller needs from the platform.
///
/// Errors are classified through [`CoreError::class`] so callers can tell a
/// retryable transport failure from a permanent one without inspecting
/// messages.
#[async_trait]
pub trait InstagramApi: Send + Sync {
    /// Logs in with a username and password, replacing any current session.
    async fn login(&mut self, credentials: &Credentials) -> Result<(), CoreError>;

    /// Restores a previously exported session without contacting the server.
    fn resume_session(&mut self, session: SessionBlob) -> Result<(), CoreError>;

    /// Snapshot of the current session suitable for the session cache.
    fn export_session(&self) -> Result<SessionBlob, CoreError>;

    /// Cheap authenticated call that fails with an authentication error when
    /// the server no longer accepts the session.
    async fn probe(&self) -> Result<(), CoreError>;

    fn resolve_post_id(&self, post_reference: &str) -> Result<String, CoreError>;

    async fn media_metadata(&self, media_id: &str) -> Result<MediaMetadata, CoreError>;

    /// Raw items of one comments page, newest first. Items are returned
    /// unvalidated.
    async fn comments_page(&self, request: PageRequest<'_>) -> Result<Vec<Value>, CoreError>;
}
