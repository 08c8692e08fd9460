//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{CommentSort, PostSort, TimeFilter};
use crate::storage::StorageKind;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Reddit API client settings
    #[serde(default)]
    pub reddit: RedditConfig,

    /// What to fetch per run
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Storage backend selection
    #[serde(default)]
    pub storage: StorageConfig,

    /// Cleaning pipeline settings
    #[serde(default)]
    pub cleaning: CleaningConfig,

    /// Retry policy for transient remote failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.reddit.user_agent.trim().is_empty() {
            return Err(AppError::config("reddit.user_agent is empty"));
        }
        if self.reddit.timeout_secs == 0 {
            return Err(AppError::config("reddit.timeout_secs must be > 0"));
        }
        if self.fetch.subreddit.trim().is_empty() {
            return Err(AppError::config("fetch.subreddit is empty"));
        }
        if self.fetch.limit == 0 {
            return Err(AppError::config("fetch.limit must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::config("retry.max_attempts must be > 0"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(AppError::config("retry.multiplier must be >= 1.0"));
        }
        if let (Some(min), Some(max)) = (self.cleaning.min_score, self.cleaning.max_score) {
            if min > max {
                return Err(AppError::config("cleaning.min_score exceeds max_score"));
            }
        }
        Ok(())
    }
}

/// Reddit API client settings.
///
/// Credentials left empty here are resolved from the environment
/// (`REDDIT_CLIENT_ID`, `REDDIT_CLIENT_SECRET`, `REDDIT_USERNAME`,
/// `REDDIT_PASSWORD`) at client construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditConfig {
    /// User-Agent header for API requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// OAuth application id
    #[serde(default)]
    pub client_id: Option<String>,

    /// OAuth application secret
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Account name for the password grant (optional)
    #[serde(default)]
    pub username: Option<String>,

    /// Account password for the password grant (optional)
    #[serde(default)]
    pub password: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Minimum delay between successive API calls in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            client_id: None,
            client_secret: None,
            username: None,
            password: None,
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
        }
    }
}

/// What to fetch per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Target subreddit
    #[serde(default = "defaults::subreddit")]
    pub subreddit: String,

    /// Maximum number of posts to fetch
    #[serde(default = "defaults::limit")]
    pub limit: u32,

    /// Post sort mode
    #[serde(default = "defaults::post_sort")]
    pub sort: PostSort,

    /// Time window for top/controversial listings
    #[serde(default = "defaults::time_filter")]
    pub time: TimeFilter,

    /// Comment sort mode
    #[serde(default = "defaults::comment_sort")]
    pub comment_sort: CommentSort,

    /// Maximum comments per post (absent = whole tree window)
    #[serde(default)]
    pub comment_limit: Option<u32>,

    /// Skip comment fetching entirely
    #[serde(default)]
    pub skip_comments: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            subreddit: defaults::subreddit(),
            limit: defaults::limit(),
            sort: defaults::post_sort(),
            time: defaults::time_filter(),
            comment_sort: defaults::comment_sort(),
            comment_limit: None,
            skip_comments: false,
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend kind: sqlite, json, or csv
    #[serde(default = "defaults::storage_kind")]
    pub kind: StorageKind,

    /// Database file for the sqlite backend
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Directory for the file-based backends
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: defaults::storage_kind(),
            db_path: None,
            data_dir: defaults::data_dir(),
        }
    }
}

/// Cleaning pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// Collapse duplicate identifiers, keeping the last-seen record
    #[serde(default = "defaults::yes")]
    pub dedupe: bool,

    /// Inclusive lower score bound
    #[serde(default)]
    pub min_score: Option<i64>,

    /// Inclusive upper score bound
    #[serde(default)]
    pub max_score: Option<i64>,

    /// Inclusive start of the timestamp window
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,

    /// Inclusive end of the timestamp window
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,

    /// Run the text normalizer over title/selftext/body fields
    #[serde(default)]
    pub clean_text: bool,

    /// Text normalizer stages
    #[serde(default)]
    pub text: TextOptions,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            dedupe: true,
            min_score: None,
            max_score: None,
            start_date: None,
            end_date: None,
            clean_text: false,
            text: TextOptions::default(),
        }
    }
}

/// Text normalizer stages, each independently toggleable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextOptions {
    #[serde(default = "defaults::yes")]
    pub strip_urls: bool,

    #[serde(default = "defaults::yes")]
    pub strip_special_chars: bool,

    #[serde(default)]
    pub strip_numbers: bool,

    #[serde(default = "defaults::yes")]
    pub strip_stopwords: bool,

    #[serde(default = "defaults::yes")]
    pub lowercase: bool,

    #[serde(default)]
    pub stem: bool,

    #[serde(default)]
    pub lemmatize: bool,

    /// Language for stopword lists and the stemmer
    #[serde(default = "defaults::language")]
    pub language: String,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            strip_urls: true,
            strip_special_chars: true,
            strip_numbers: false,
            strip_stopwords: true,
            lowercase: true,
            stem: false,
            lemmatize: false,
            language: defaults::language(),
        }
    }
}

/// Retry policy for transient remote failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts including the first
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "defaults::base_delay")]
    pub base_delay_ms: u64,

    /// Backoff multiplier applied after each retry
    #[serde(default = "defaults::multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay(),
            multiplier: defaults::multiplier(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use crate::models::{CommentSort, PostSort, TimeFilter};
    use crate::storage::StorageKind;

    // Reddit client defaults
    pub fn user_agent() -> String {
        "harvest/0.1 (snapshot collector)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        1000
    }

    // Fetch defaults
    pub fn subreddit() -> String {
        "MachineLearning".into()
    }
    pub fn limit() -> u32 {
        10
    }
    pub fn post_sort() -> PostSort {
        PostSort::Hot
    }
    pub fn time_filter() -> TimeFilter {
        TimeFilter::Week
    }
    pub fn comment_sort() -> CommentSort {
        CommentSort::Best
    }

    // Storage defaults
    pub fn storage_kind() -> StorageKind {
        StorageKind::Sqlite
    }
    pub fn data_dir() -> PathBuf {
        PathBuf::from("data")
    }

    // Cleaning defaults
    pub fn language() -> String {
        "english".into()
    }
    pub fn yes() -> bool {
        true
    }

    // Retry defaults
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn base_delay() -> u64 {
        1000
    }
    pub fn multiplier() -> f64 {
        2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [fetch]
            subreddit = "rust"
            limit = 25

            [storage]
            kind = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.fetch.subreddit, "rust");
        assert_eq!(config.fetch.limit, 25);
        assert_eq!(config.storage.kind, StorageKind::Json);
        assert_eq!(config.reddit.request_delay_ms, 1000);
        assert!(config.cleaning.dedupe);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.fetch.limit = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = Config::default();
        config.cleaning.min_score = Some(10);
        config.cleaning.max_score = Some(1);
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }
}
