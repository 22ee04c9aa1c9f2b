use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Largest number of comments collected for a single post.
pub const DEFAULT_MAX_COMMENTS: usize = 2000;

/// Comments requested per page.
pub const COMMENTS_PAGE_SIZE: usize = 20;

/// Default pause between poll cycles, in seconds.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// A single fetched comment, kept exactly as the platform returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentRecord(Map<String, Value>);

impl CommentRecord {
    /// Accepts JSON objects only; anything else is malformed and rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// The comment's `pk`, rendered as a string whether it arrived as a
    /// number or a string.
    pub fn id(&self) -> Option<String> {
        match self.0.get("pk")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Metadata needed before paging through a post's comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMetadata {
    pub comment_count: u64,
    /// Shortcode used in the post's permalink.
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}
