//! The long-running poll loop.
//!
//! Each cycle re-reads the settings file, walks the configured posts in order
//! and saves their comments, then sleeps for the configured interval. Problems
//! with a single post are logged and the loop moves on; a missing settings
//! file or an unreachable platform only delays the next attempt.

use crate::report::{CycleReport, CycleStatus, PostReport, PostResult};
use chrono::Utc;
use comment_store::JsonFileStore;
use commentwatch_core::{
    truncate_message, CoreError, ErrorClass, ErrorExt, Settings, SettingsLoader,
    MAX_LOGGED_ERROR_CHARS,
};
use instagram_client::{CommentFetcher, FetchConfig, InstagramApi, SessionManager};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Wait before retrying when settings or the session are unavailable
    pub stall_delay: Duration,
    /// Wait after each post
    pub post_delay: Duration,
    /// Where comment files go unless the settings override it
    pub output_dir: PathBuf,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            stall_delay: Duration::from_secs(10),
            post_delay: Duration::from_secs(10),
            output_dir: PathBuf::from("."),
        }
    }
}

pub struct SettingsPoller<C> {
    session: SessionManager<C>,
    loader: SettingsLoader,
    config: PollerConfig,
}

impl<C: InstagramApi> SettingsPoller<C> {
    pub fn new(session: SessionManager<C>, loader: SettingsLoader, config: PollerConfig) -> Self {
        Self {
            session,
            loader,
            config,
        }
    }

    pub fn session(&self) -> &SessionManager<C> {
        &self.session
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// Returns an error only when the first session cannot be established for
    /// a reason that waiting will not fix, such as rejected credentials.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), CoreError> {
        tokio::select! {
            started = self.start() => started?,
            _ = shutdown.cancelled() => {
                info!("Shutdown requested before startup finished");
                return Ok(());
            }
        }

        loop {
            let report = tokio::select! {
                report = self.run_cycle() => report,
                _ = shutdown.cancelled() => break,
            };

            info!(
                status = ?report.status,
                posts = report.posts.len(),
                failed = report.failed_posts(),
                saved = report.comments_saved(),
                next_in_secs = report.next_cycle_in.as_secs(),
                "Cycle finished"
            );

            tokio::select! {
                _ = sleep(report.next_cycle_in) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Poller stopped");
        Ok(())
    }

    /// Establishes the first session, stalling while settings are missing or
    /// the platform is unreachable.
    pub async fn start(&mut self) -> Result<(), CoreError> {
        loop {
            // only consulted when the cached session is missing or rejected
            let credentials = self.loader.load().await.and_then(|s| s.credentials());
            match self.session.ensure_session(move || credentials).await {
                Ok(method) => {
                    info!(?method, "Session ready");
                    return Ok(());
                }
                Err(e)
                    if matches!(
                        e.class(),
                        ErrorClass::Configuration | ErrorClass::RetryableTransport
                    ) =>
                {
                    e.log_warn();
                    warn!(
                        delay_secs = self.config.stall_delay.as_secs(),
                        "Could not establish a session yet, retrying"
                    );
                    sleep(self.config.stall_delay).await;
                }
                Err(e) => {
                    e.log_error();
                    return Err(e);
                }
            }
        }
    }

    /// One pass over the configured posts.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started_at = Utc::now();
        let stall = self.config.stall_delay;

        let settings = match self.loader.load().await {
            Ok(settings) => settings,
            Err(e) => {
                error!(
                    path = %self.loader.path().display(),
                    "Settings unavailable: {}",
                    e
                );
                let status = CycleStatus::SettingsUnavailable {
                    reason: e.user_friendly_message(),
                };
                return CycleReport::stalled(started_at, status, stall);
            }
        };
        debug!(settings = ?settings, "Settings loaded");

        if !self.session.is_authenticated() {
            let credentials = settings.credentials();
            if let Err(e) = self.session.ensure_session(move || credentials).await {
                e.log_warn();
                let status = CycleStatus::SessionUnavailable {
                    reason: truncate_message(&e.to_string(), MAX_LOGGED_ERROR_CHARS),
                };
                return CycleReport::stalled(started_at, status, stall);
            }
        }

        let (status, posts) = self.process_posts(&settings).await;
        CycleReport {
            started_at,
            status,
            posts,
            next_cycle_in: settings.check_interval(),
        }
    }

    async fn process_posts(&mut self, settings: &Settings) -> (CycleStatus, Vec<PostReport>) {
        let output_dir = settings
            .output_dir
            .clone()
            .unwrap_or_else(|| self.config.output_dir.clone());
        let store = JsonFileStore::new(output_dir);
        let fetch_config = FetchConfig::default().with_max_comments(settings.max_comments);

        info!(posts = settings.posts.len(), "Processing posts");
        let mut reports = Vec::with_capacity(settings.posts.len());

        for post in &settings.posts {
            let report = self.process_post(post, &store, &fetch_config).await;
            let expired = matches!(
                &report.result,
                PostResult::Fetched(outcome) if outcome.stop.needs_login()
            ) || matches!(
                &report.result,
                PostResult::Failed { class: ErrorClass::Authentication, .. }
            );
            reports.push(report);

            sleep(self.config.post_delay).await;

            if expired {
                warn!(post = %post, "Session expired mid-cycle, skipping remaining posts");
                self.session.invalidate();
                return (CycleStatus::SessionExpired, reports);
            }
        }

        (CycleStatus::Completed, reports)
    }

    async fn process_post(
        &self,
        post: &str,
        store: &JsonFileStore,
        fetch_config: &FetchConfig,
    ) -> PostReport {
        let client = self.session.client();

        let resource_id = match client.resolve_post_id(post) {
            Ok(id) => id,
            Err(e) => {
                error!(post = %post, code = %e.error_code(), "Could not resolve post: {}", e);
                return PostReport {
                    post: post.to_string(),
                    resource_id: None,
                    result: failed(&e),
                };
            }
        };
        debug!(post = %post, resource_id = %resource_id, "Resolved post");

        let result = match CommentFetcher::new(client, store, fetch_config)
            .fetch_all(&resource_id)
            .await
        {
            Ok(outcome) => PostResult::Fetched(outcome),
            Err(e) => {
                error!(resource_id = %resource_id, "Fetch failed: {}", e);
                failed(&e)
            }
        };

        PostReport {
            post: post.to_string(),
            resource_id: Some(resource_id),
            result,
        }
    }
}

fn failed(error: &CoreError) -> PostResult {
    PostResult::Failed {
        class: error.class(),
        message: truncate_message(&error.to_string(), MAX_LOGGED_ERROR_CHARS),
    }
}
