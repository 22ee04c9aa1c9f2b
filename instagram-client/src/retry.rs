use commentwatch_core::{CoreError, ErrorExt};
use std::time::Duration;

/// Configuration for retry behavior while paging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Consecutive retryable failures that abort a fetch
    pub max_attempts: u32,
    /// Backoff added per consecutive failure
    pub backoff_step: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(10),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Pause between successful pages. Grows with the number of comments already
/// loaded so long threads are read more gently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingConfig {
    pub base_delay: Duration,
    /// One extra `step_delay` per this many loaded comments
    pub items_per_step: usize,
    pub step_delay: Duration,
    pub max_delay: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            items_per_step: 100,
            step_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Retry the same page after a backoff
    Retry,
    /// Stop fetching this post
    Abort,
}

pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    if error.is_retryable() {
        RetryStrategy::Retry
    } else {
        RetryStrategy::Abort
    }
}

/// Backoff before retry number `attempt` (1-based): `min(max, step * attempt)`.
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    config
        .backoff_step
        .saturating_mul(attempt)
        .min(config.max_delay)
}

/// Pause after a page once `loaded` comments are held.
pub fn page_delay(loaded: usize, config: &PacingConfig) -> Duration {
    let steps = loaded / config.items_per_step.max(1);
    let steps = u32::try_from(steps).unwrap_or(u32::MAX);
    config
        .base_delay
        .saturating_add(config.step_delay.saturating_mul(steps))
        .min(config.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use commentwatch_core::InstagramApiError;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff_step, Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_is_linear_and_capped() {
        let config = RetryConfig::default();
        assert_eq!(calculate_delay(1, &config), Duration::from_secs(10));
        assert_eq!(calculate_delay(2, &config), Duration::from_secs(20));
        assert_eq!(calculate_delay(3, &config), Duration::from_secs(30));
        assert_eq!(calculate_delay(7, &config), Duration::from_secs(30));
    }

    #[test]
    fn test_page_delay_grows_with_loaded_count() {
        let config = PacingConfig::default();
        assert_eq!(page_delay(20, &config), Duration::from_secs(5));
        assert_eq!(page_delay(100, &config), Duration::from_secs(6));
        assert_eq!(page_delay(499, &config), Duration::from_secs(9));
        assert_eq!(page_delay(500, &config), Duration::from_secs(10));
        assert_eq!(page_delay(2000, &config), Duration::from_secs(10));
    }

    #[test]
    fn test_retry_strategy_for_errors() {
        let timeout = CoreError::InstagramApi(InstagramApiError::RequestTimeout);
        assert_eq!(get_retry_strategy(&timeout), RetryStrategy::Retry);

        let rate_limited =
            CoreError::InstagramApi(InstagramApiError::RateLimitExceeded { retry_after: 60 });
        assert_eq!(get_retry_strategy(&rate_limited), RetryStrategy::Retry);

        let login = CoreError::InstagramApi(InstagramApiError::LoginRequired);
        assert_eq!(get_retry_strategy(&login), RetryStrategy::Abort);

        let gone = CoreError::InstagramApi(InstagramApiError::MediaNotFound {
            media_id: "1".to_string(),
        });
        assert_eq!(get_retry_strategy(&gone), RetryStrategy::Abort);
    }
}
