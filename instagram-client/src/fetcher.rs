use crate::client::{InstagramApi, PageRequest};
use crate::retry::{
    calculate_delay, get_retry_strategy, page_delay, PacingConfig, RetryConfig, RetryStrategy,
};
use comment_store::CommentSink;
use commentwatch_core::{
    truncate_message, CommentRecord, CoreError, ErrorClass, ErrorExt, MediaMetadata,
    COMMENTS_PAGE_SIZE, DEFAULT_MAX_COMMENTS, MAX_LOGGED_ERROR_CHARS,
};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub page_size: usize,
    /// Ceiling on comments collected per post, never above the default
    pub max_comments: usize,
    pub retry: RetryConfig,
    pub pacing: PacingConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: COMMENTS_PAGE_SIZE,
            max_comments: DEFAULT_MAX_COMMENTS,
            retry: RetryConfig::default(),
            pacing: PacingConfig::default(),
        }
    }
}

impl FetchConfig {
    /// Lowers the ceiling; values above [`DEFAULT_MAX_COMMENTS`] are clamped.
    pub fn with_max_comments(mut self, max_comments: usize) -> Self {
        self.max_comments = max_comments.min(DEFAULT_MAX_COMMENTS);
        self
    }

    fn ceiling(&self) -> usize {
        self.max_comments.min(DEFAULT_MAX_COMMENTS)
    }
}

/// Why a fetch stopped paging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The post reported zero comments; no page was requested.
    NoComments,
    /// The expected count or the ceiling was reached.
    TargetReached,
    /// The server returned an empty page.
    Exhausted,
    /// A non-empty page held no usable comment.
    Stalled,
    RetriesExhausted { last_error: String },
    Fatal { class: ErrorClass, message: String },
    MetadataUnavailable { class: ErrorClass, message: String },
}

impl StopReason {
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            StopReason::NoComments | StopReason::TargetReached | StopReason::Exhausted
        )
    }

    /// The fetch was cut short because the session is no longer accepted.
    pub fn needs_login(&self) -> bool {
        matches!(
            self,
            StopReason::Fatal { class: ErrorClass::Authentication, .. }
                | StopReason::MetadataUnavailable { class: ErrorClass::Authentication, .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub resource_id: String,
    /// Ids of every accumulated comment, in fetch order.
    pub record_ids: Vec<String>,
    /// Comments written in the final snapshot, including any without an id.
    pub records_saved: usize,
    pub expected: u64,
    pub pages: usize,
    pub stop: StopReason,
}

/// Pages through one post's comments, flushing progress after every page.
pub struct CommentFetcher<'a, C, S> {
    client: &'a C,
    sink: &'a S,
    config: &'a FetchConfig,
}

struct PageLoop {
    records: Vec<CommentRecord>,
    pages: usize,
    last_flush_failed: bool,
}

impl<'a, C, S> CommentFetcher<'a, C, S>
where
    C: InstagramApi,
    S: CommentSink,
{
    pub fn new(client: &'a C, sink: &'a S, config: &'a FetchConfig) -> Self {
        Self {
            client,
            sink,
            config,
        }
    }

    /// Collects up to `max_comments` comments for `resource_id`.
    ///
    /// Platform failures end the fetch early and are reported through
    /// [`FetchOutcome::stop`]; whatever was collected is still saved. The only
    /// error returned is a persistence failure where both the last page flush
    /// and the final flush failed.
    pub async fn fetch_all(&self, resource_id: &str) -> Result<FetchOutcome, CoreError> {
        info!(resource_id, "Loading comments");

        let mut state = PageLoop {
            records: Vec::new(),
            pages: 0,
            last_flush_failed: false,
        };

        let (expected, stop) = match self.client.media_metadata(resource_id).await {
            Ok(meta) if meta.comment_count == 0 => {
                info!(resource_id, "No comments to load");
                return Ok(FetchOutcome {
                    resource_id: resource_id.to_string(),
                    record_ids: Vec::new(),
                    records_saved: 0,
                    expected: 0,
                    pages: 0,
                    stop: StopReason::NoComments,
                });
            }
            Ok(meta) => {
                info!(resource_id, total = meta.comment_count, "Comments reported");
                let stop = self.paginate(resource_id, &meta, &mut state).await;
                (meta.comment_count, stop)
            }
            Err(e) => {
                let message = truncate_message(&e.to_string(), MAX_LOGGED_ERROR_CHARS);
                error!(resource_id, code = %e.error_code(), "Media lookup failed: {}", message);
                (
                    0,
                    StopReason::MetadataUnavailable {
                        class: e.class(),
                        message,
                    },
                )
            }
        };

        match self.sink.flush(resource_id, &state.records).await {
            Ok(()) => info!(resource_id, saved = state.records.len(), "Comments saved"),
            Err(e) if state.last_flush_failed => {
                error!(resource_id, "Final save failed after a failed page save: {}", e);
                return Err(e.into());
            }
            Err(e) => error!(resource_id, "Final save failed: {}", e),
        }

        let record_ids: Vec<String> = state.records.iter().filter_map(CommentRecord::id).collect();
        info!(
            resource_id,
            loaded = state.records.len(),
            expected,
            pages = state.pages,
            stop = ?stop,
            "Finished loading comments"
        );

        Ok(FetchOutcome {
            resource_id: resource_id.to_string(),
            record_ids,
            records_saved: state.records.len(),
            expected,
            pages: state.pages,
            stop,
        })
    }

    async fn paginate(
        &self,
        resource_id: &str,
        meta: &MediaMetadata,
        state: &mut PageLoop,
    ) -> StopReason {
        let expected = usize::try_from(meta.comment_count).unwrap_or(usize::MAX);
        let target = expected.min(self.config.ceiling());
        let retry = &self.config.retry;
        let mut cursor: Option<String> = None;
        let mut retries = 0u32;

        loop {
            if state.records.len() >= target {
                return StopReason::TargetReached;
            }

            let request = PageRequest {
                media_id: resource_id,
                code: &meta.code,
                cursor: cursor.as_deref(),
                page_size: self.config.page_size,
            };

            let raw = match self.client.comments_page(request).await {
                Ok(raw) => raw,
                Err(e) => {
                    let message = truncate_message(&e.to_string(), MAX_LOGGED_ERROR_CHARS);
                    match get_retry_strategy(&e) {
                        RetryStrategy::Retry => {
                            retries += 1;
                            warn!(
                                resource_id,
                                retry = retries,
                                max = retry.max_attempts,
                                "Page request failed: {}",
                                message
                            );
                            if retries >= retry.max_attempts {
                                error!(resource_id, "Retry limit reached, giving up on this post");
                                return StopReason::RetriesExhausted {
                                    last_error: message,
                                };
                            }
                            let delay = calculate_delay(retries, retry);
                            info!(resource_id, delay_secs = delay.as_secs(), "Retrying page");
                            sleep(delay).await;
                            continue;
                        }
                        RetryStrategy::Abort => {
                            error!(
                                resource_id,
                                code = %e.error_code(),
                                "Page request failed permanently: {}",
                                message
                            );
                            return StopReason::Fatal {
                                class: e.class(),
                                message,
                            };
                        }
                    }
                }
            };

            if raw.is_empty() {
                info!(resource_id, "No more comments found");
                return StopReason::Exhausted;
            }

            let raw_len = raw.len();
            let mut page: Vec<CommentRecord> =
                raw.into_iter().filter_map(CommentRecord::from_value).collect();
            if page.is_empty() {
                warn!(resource_id, raw = raw_len, "Page held no usable comments, stopping");
                return StopReason::Stalled;
            }
            if page.len() < raw_len {
                debug!(resource_id, dropped = raw_len - page.len(), "Dropped malformed items");
            }

            page.truncate(target - state.records.len());
            cursor = page.last().and_then(CommentRecord::id);
            let page_len = page.len();
            state.records.extend(page);
            state.pages += 1;
            retries = 0;

            info!(
                resource_id,
                page = page_len,
                loaded = state.records.len(),
                total = meta.comment_count,
                "Loaded page"
            );

            state.last_flush_failed = match self.sink.flush(resource_id, &state.records).await {
                Ok(()) => false,
                Err(e) => {
                    error!(resource_id, "Saving progress failed: {}", e);
                    true
                }
            };

            if state.records.len() >= target {
                return StopReason::TargetReached;
            }

            let delay = page_delay(state.records.len(), &self.config.pacing);
            debug!(resource_id, delay_secs = delay.as_secs(), "Pausing between pages");
            sleep(delay).await;
        }
    }
}
