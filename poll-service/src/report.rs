use chrono::{DateTime, Utc};
use commentwatch_core::ErrorClass;
use instagram_client::FetchOutcome;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    /// Every configured post was attempted.
    Completed,
    SettingsUnavailable { reason: String },
    SessionUnavailable { reason: String },
    /// A fetch reported the session as expired; remaining posts were skipped.
    SessionExpired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostResult {
    Fetched(FetchOutcome),
    Failed { class: ErrorClass, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostReport {
    pub post: String,
    pub resource_id: Option<String>,
    pub result: PostResult,
}

impl PostReport {
    pub fn comments_saved(&self) -> usize {
        match &self.result {
            PostResult::Fetched(outcome) => outcome.records_saved,
            PostResult::Failed { .. } => 0,
        }
    }
}

/// Summary of one pass over the configured posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub status: CycleStatus,
    pub posts: Vec<PostReport>,
    /// Pause before the next cycle starts.
    pub next_cycle_in: Duration,
}

impl CycleReport {
    pub(crate) fn stalled(started_at: DateTime<Utc>, status: CycleStatus, delay: Duration) -> Self {
        Self {
            started_at,
            status,
            posts: Vec::new(),
            next_cycle_in: delay,
        }
    }

    pub fn failed_posts(&self) -> usize {
        self.posts
            .iter()
            .filter(|p| matches!(p.result, PostResult::Failed { .. }))
            .count()
    }

    pub fn comments_saved(&self) -> usize {
        self.posts.iter().map(PostReport::comments_saved).sum()
    }
}
