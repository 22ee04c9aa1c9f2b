use async_trait::async_trait;
use commentwatch_core::{CommentRecord, PersistenceError};

mod atomic;
mod json_store;

pub use atomic::write_atomic;
pub use json_store::JsonFileStore;

/// Durable destination for the comments accumulated for one post.
///
/// Every call replaces whatever was stored for `resource_id` with exactly
/// `records`; there is no append mode.
#[async_trait]
pub trait CommentSink: Send + Sync {
    async fn flush(&self, resource_id: &str, records: &[CommentRecord])
        -> Result<(), PersistenceError>;
}
