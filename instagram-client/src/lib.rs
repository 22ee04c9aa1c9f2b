pub mod api;
pub mod client;
pub mod fetcher;
pub mod retry;
pub mod session;
pub mod shortcode;


pub use api::{ApiClientConfig, InstagramApiClient};
pub use client::{InstagramApi, PageRequest};
pub use fetcher::{CommentFetcher, FetchConfig, FetchOutcome, StopReason};
pub use retry::{PacingConfig, RetryConfig};
pub use session::{AuthMethod, AuthState, DeviceIds, SessionBlob, SessionManager, SessionStore};
