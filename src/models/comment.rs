//! Comment record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A comment fetched from a post's reply tree.
///
/// `post_id` references the owning [`Post`](super::Post); `parent_id`
/// references either the post itself (for top-level comments) or another
/// comment, so the comments of a post form a forest. `depth` counts the
/// ancestor edges to the post, with 0 meaning top-level. Storage does not
/// enforce referential ordering at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub parent_id: String,
    pub author: String,
    pub created_utc: DateTime<Utc>,
    pub score: i64,
    pub body: String,
    pub permalink: Option<String>,
    pub depth: i64,
    pub is_submitter: bool,
    pub subreddit: String,
}

impl Comment {
    /// Persisted field names, in schema order.
    pub const FIELDS: &'static [&'static str] = &[
        "id",
        "post_id",
        "parent_id",
        "author",
        "created_utc",
        "score",
        "body",
        "permalink",
        "depth",
        "is_submitter",
        "subreddit",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fields_cover_serialized_keys() {
        let comment = Comment {
            id: "c1".to_string(),
            post_id: "abc123".to_string(),
            parent_id: "abc123".to_string(),
            author: "tester".to_string(),
            created_utc: Utc.with_ymd_and_hms(2024, 6, 1, 12, 5, 0).unwrap(),
            score: 7,
            body: "a reply".to_string(),
            permalink: None,
            depth: 0,
            is_submitter: false,
            subreddit: "test".to_string(),
        };
        let json = serde_json::to_value(&comment).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), Comment::FIELDS.len());
        for field in Comment::FIELDS {
            assert!(object.contains_key(*field), "missing field {field}");
        }
    }
}
