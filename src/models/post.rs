//! Post record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A submission fetched from a subreddit.
///
/// `id` is stable across re-fetches and is the sole deduplication key:
/// saving a post whose `id` already exists replaces the stored copy
/// wholesale. Serde field names double as the persisted column/key names
/// for every storage backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub author: String,
    pub created_utc: DateTime<Utc>,
    pub score: i64,
    pub upvote_ratio: Option<f64>,
    pub num_comments: i64,
    pub url: String,
    pub selftext: Option<String>,
    pub is_self: bool,
    pub permalink: String,
    pub flair: Option<String>,
    pub domain: Option<String>,
    pub is_video: bool,
    pub is_original_content: bool,
    pub subreddit: String,
}

impl Post {
    /// Persisted field names, in schema order.
    ///
    /// Filter maps are validated against this list before any backend is
    /// consulted, so unknown filter keys fail identically everywhere.
    pub const FIELDS: &'static [&'static str] = &[
        "id",
        "title",
        "author",
        "created_utc",
        "score",
        "upvote_ratio",
        "num_comments",
        "url",
        "selftext",
        "is_self",
        "permalink",
        "flair",
        "domain",
        "is_video",
        "is_original_content",
        "subreddit",
    ];
}
