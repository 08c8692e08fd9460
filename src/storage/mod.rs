//! Storage abstractions for harvested records.
//!
//! Three interchangeable backends persist posts and comments:
//!
//! - [`SqliteStorage`] - two related tables in one SQLite database
//! - [`JsonStorage`] - `posts.json` / `comments.json`, one JSON array each
//! - [`CsvStorage`] - `posts.csv` / `comments.csv` with a header row
//!
//! All variants share the same upsert semantics: saving a record whose
//! identifier already exists replaces the stored copy wholesale. Result
//! ordering from the `get_*` operations is backend-native and must not be
//! relied upon.

pub mod csv;
pub mod json;
pub mod sqlite;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Comment, Post};

// Re-export for convenience
pub use self::csv::CsvStorage;
pub use self::json::JsonStorage;
pub use self::sqlite::SqliteStorage;

/// Equality-only predicate: field name to required value, ANDed together.
///
/// An empty map matches every record. A record whose field is null (or
/// absent) never matches. Keys must name declared fields of the record
/// type; an unknown key is a configuration error on every backend.
pub type FilterMap = BTreeMap<String, Value>;

/// Trait for record storage backends.
///
/// Backends are not internally synchronized; a single instance must not be
/// shared across concurrent tasks without external locking.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Insert or fully replace posts, keyed by `Post::id`.
    ///
    /// The sqlite variant applies the whole batch in one transaction; the
    /// file variants rewrite their target file and give no partial-failure
    /// guarantee.
    async fn save_posts(&self, posts: &[Post]) -> Result<()>;

    /// Insert or fully replace comments, keyed by `Comment::id`.
    async fn save_comments(&self, comments: &[Comment]) -> Result<()>;

    /// All stored posts, or only those matching `filter`.
    async fn get_posts(&self, filter: Option<&FilterMap>) -> Result<Vec<Post>>;

    /// All stored comments, or only those matching `filter`.
    async fn get_comments(&self, filter: Option<&FilterMap>) -> Result<Vec<Comment>>;

    /// Release held resources. Safe to call more than once; a no-op for
    /// the file-based variants.
    async fn close(&self) -> Result<()>;
}

/// Reject filter keys that are not declared fields of the record type.
pub fn validate_filter(filter: &FilterMap, fields: &[&str]) -> Result<()> {
    for key in filter.keys() {
        if !fields.contains(&key.as_str()) {
            return Err(AppError::config(format!("unknown filter field '{key}'")));
        }
    }
    Ok(())
}

/// Pure equality match of a serialized record against a filter map.
pub fn matches(record: &Value, filter: &FilterMap) -> bool {
    filter.iter().all(|(key, want)| {
        record
            .get(key)
            .is_some_and(|have| !have.is_null() && have == want)
    })
}

/// Retain only records matching `filter`; an empty filter keeps everything.
pub fn apply_filter<T: Serialize>(records: Vec<T>, filter: &FilterMap) -> Result<Vec<T>> {
    if filter.is_empty() {
        return Ok(records);
    }
    let mut kept = Vec::new();
    for record in records {
        let value = serde_json::to_value(&record)?;
        if matches(&value, filter) {
            kept.push(record);
        }
    }
    Ok(kept)
}

/// Storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Sqlite,
    Json,
    Csv,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for StorageKind {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, AppError> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(AppError::config(format!("unknown storage kind '{s}'"))),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Construction options; each variant reads its own subset and ignores the
/// rest.
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Database file (sqlite variant)
    pub db_path: Option<PathBuf>,
    /// Data directory (json and csv variants)
    pub data_dir: Option<PathBuf>,
}

/// Select and construct a storage backend from a configuration tag.
pub async fn create_storage(
    kind: StorageKind,
    options: &StorageOptions,
) -> Result<Box<dyn StorageBackend>> {
    match kind {
        StorageKind::Sqlite => {
            let path = options
                .db_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("harvest.db"));
            Ok(Box::new(SqliteStorage::open(&path).await?))
        }
        StorageKind::Json => {
            let dir = options
                .data_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("data"));
            Ok(Box::new(JsonStorage::new(dir).await?))
        }
        StorageKind::Csv => {
            let dir = options
                .data_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("data"));
            Ok(Box::new(CsvStorage::new(dir)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_filter_matches_everything() {
        let record = json!({"id": "a", "score": 5});
        assert!(matches(&record, &FilterMap::new()));
    }

    #[test]
    fn test_all_entries_must_match() {
        let record = json!({"id": "a", "score": 5, "subreddit": "rust"});

        let mut filter = FilterMap::new();
        filter.insert("score".into(), json!(5));
        filter.insert("subreddit".into(), json!("rust"));
        assert!(matches(&record, &filter));

        filter.insert("id".into(), json!("b"));
        assert!(!matches(&record, &filter));
    }

    #[test]
    fn test_null_field_never_matches() {
        let record = json!({"id": "a", "flair": null});

        let mut filter = FilterMap::new();
        filter.insert("flair".into(), json!("Discussion"));
        assert!(!matches(&record, &filter));

        // Even a null target does not match a null field.
        let mut filter = FilterMap::new();
        filter.insert("flair".into(), Value::Null);
        assert!(!matches(&record, &filter));
    }

    #[test]
    fn test_missing_field_never_matches() {
        let record = json!({"id": "a"});
        let mut filter = FilterMap::new();
        filter.insert("score".into(), json!(1));
        assert!(!matches(&record, &filter));
    }

    #[test]
    fn test_unknown_filter_key_is_config_error() {
        let mut filter = FilterMap::new();
        filter.insert("karma".into(), json!(1));
        assert!(matches!(
            validate_filter(&filter, crate::models::Post::FIELDS),
            Err(AppError::Config(_))
        ));
        filter.clear();
        filter.insert("score".into(), json!(1));
        assert!(validate_filter(&filter, crate::models::Post::FIELDS).is_ok());
    }

    #[test]
    fn test_unknown_storage_kind() {
        assert!(matches!(
            "parquet".parse::<StorageKind>(),
            Err(AppError::Config(_))
        ));
        assert_eq!("csv".parse::<StorageKind>().unwrap(), StorageKind::Csv);
    }
}
