//! Record-batch cleaning.
//!
//! A fixed sequence of independently toggleable stages applied to an owned
//! batch: dedupe, inclusive date-range filter, inclusive score-range
//! filter, text-field normalization. Each stage returns a new batch. The
//! custom-predicate filter is exposed separately and is not part of the
//! fixed sequence.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{CleaningConfig, Comment, Post};
use crate::pipeline::normalize::TextNormalizer;

/// Collapse records sharing a key, keeping the last-seen record at the
/// key's first-seen position.
pub fn dedupe_by_key<T, K, F>(records: Vec<T>, key_of: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut kept: Vec<T> = Vec::new();

    for record in records {
        match positions.entry(key_of(&record)) {
            Entry::Occupied(entry) => kept[*entry.get()] = record,
            Entry::Vacant(entry) => {
                entry.insert(kept.len());
                kept.push(record);
            }
        }
    }
    kept
}

/// Keep records whose timestamp falls within the inclusive window.
///
/// With no window supplied every record passes through, including those
/// whose accessor yields no timestamp; once either bound is set, records
/// without a usable timestamp are dropped.
pub fn filter_by_date<T, F>(
    records: Vec<T>,
    date_of: F,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Vec<T>
where
    F: Fn(&T) -> Option<DateTime<Utc>>,
{
    if start.is_none() && end.is_none() {
        return records;
    }

    records
        .into_iter()
        .filter(|record| match date_of(record) {
            Some(date) => {
                start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
            }
            None => false,
        })
        .collect()
}

/// Keep records whose score falls within the inclusive window.
pub fn filter_by_score<T, F>(
    records: Vec<T>,
    score_of: F,
    min: Option<i64>,
    max: Option<i64>,
) -> Vec<T>
where
    F: Fn(&T) -> i64,
{
    if min.is_none() && max.is_none() {
        return records;
    }

    records
        .into_iter()
        .filter(|record| {
            let score = score_of(record);
            min.is_none_or(|m| score >= m) && max.is_none_or(|m| score <= m)
        })
        .collect()
}

/// Keep records for which the predicate returns true.
pub fn filter_custom<T, F>(records: Vec<T>, predicate: F) -> Vec<T>
where
    F: Fn(&T) -> bool,
{
    records.into_iter().filter(|r| predicate(r)).collect()
}

/// Cleans post and comment batches according to a [`CleaningConfig`].
pub struct Cleaner {
    config: CleaningConfig,
    normalizer: Option<TextNormalizer>,
}

impl Cleaner {
    pub fn new(config: &CleaningConfig) -> Result<Self> {
        let normalizer = if config.clean_text {
            Some(TextNormalizer::new(&config.text)?)
        } else {
            None
        };
        Ok(Self {
            config: config.clone(),
            normalizer,
        })
    }

    /// Run the fixed stage sequence over a post batch.
    pub fn clean_posts(&self, posts: Vec<Post>) -> Vec<Post> {
        let before = posts.len();
        let mut posts = posts;

        if self.config.dedupe {
            posts = dedupe_by_key(posts, |p| p.id.clone());
        }
        posts = filter_by_date(
            posts,
            |p| Some(p.created_utc),
            self.config.start_date,
            self.config.end_date,
        );
        posts = filter_by_score(
            posts,
            |p| p.score,
            self.config.min_score,
            self.config.max_score,
        );
        if let Some(normalizer) = &self.normalizer {
            posts = posts
                .into_iter()
                .map(|mut post| {
                    post.title = normalizer.normalize(&post.title);
                    post.selftext = post.selftext.map(|text| normalizer.normalize(&text));
                    post
                })
                .collect();
        }

        log::info!("Cleaned posts: {} in, {} kept", before, posts.len());
        posts
    }

    /// Run the fixed stage sequence over a comment batch.
    pub fn clean_comments(&self, comments: Vec<Comment>) -> Vec<Comment> {
        let before = comments.len();
        let mut comments = comments;

        if self.config.dedupe {
            comments = dedupe_by_key(comments, |c| c.id.clone());
        }
        comments = filter_by_date(
            comments,
            |c| Some(c.created_utc),
            self.config.start_date,
            self.config.end_date,
        );
        comments = filter_by_score(
            comments,
            |c| c.score,
            self.config.min_score,
            self.config.max_score,
        );
        if let Some(normalizer) = &self.normalizer {
            comments = comments
                .into_iter()
                .map(|mut comment| {
                    comment.body = normalizer.normalize(&comment.body);
                    comment
                })
                .collect();
        }

        log::info!("Cleaned comments: {} in, {} kept", before, comments.len());
        comments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post(id: &str, score: i64) -> Post {
        Post {
            id: id.to_string(),
            title: "Title".to_string(),
            author: "tester".to_string(),
            created_utc: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            score,
            upvote_ratio: None,
            num_comments: 0,
            url: "https://example.com".to_string(),
            selftext: None,
            is_self: false,
            permalink: "/r/test/".to_string(),
            flair: None,
            domain: None,
            is_video: false,
            is_original_content: false,
            subreddit: "test".to_string(),
        }
    }

    #[test]
    fn test_dedupe_keeps_last_record_at_first_position() {
        let batch = vec![post("a", 1), post("b", 2), post("a", 9)];
        let deduped = dedupe_by_key(batch, |p| p.id.clone());

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, "a");
        assert_eq!(deduped[0].score, 9);
        assert_eq!(deduped[1].id, "b");
    }

    #[test]
    fn test_score_window_is_inclusive() {
        let batch = vec![post("a", 5), post("b", 1), post("c", 9)];
        let kept = filter_by_score(batch, |p| p.score, Some(2), None);

        let ids: Vec<&str> = kept.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        let batch = vec![post("a", 5), post("b", 1), post("c", 9)];
        let kept = filter_by_score(batch, |p| p.score, Some(1), Some(5));
        let ids: Vec<&str> = kept.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_date_window_start_equals_end() {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let records = vec![
            ("2024-06-01T12:00:00Z", "hit"),
            ("2024-06-02T12:00:00Z", "late"),
            ("not-a-date", "junk"),
        ];

        let date_of = |r: &(&str, &str)| {
            DateTime::parse_from_rfc3339(r.0)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        };

        let kept = filter_by_date(records.clone(), date_of, Some(t), Some(t));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].1, "hit");

        // No window: everything passes through, unparsable included.
        let kept = filter_by_date(records, date_of, None, None);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn test_unparsable_timestamp_dropped_once_window_set() {
        let records = vec![("not-a-date", "junk"), ("2024-06-01T12:00:00Z", "ok")];
        let date_of = |r: &(&str, &str)| {
            DateTime::parse_from_rfc3339(r.0)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        };

        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let kept = filter_by_date(records, date_of, Some(start), None);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].1, "ok");
    }

    #[test]
    fn test_custom_predicate() {
        let batch = vec![post("a", 5), post("b", -2)];
        let kept = filter_custom(batch, |p| p.score > 0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "a");
    }

    #[test]
    fn test_cleaner_min_score_end_to_end() {
        let config = CleaningConfig {
            min_score: Some(2),
            ..CleaningConfig::default()
        };
        let cleaner = Cleaner::new(&config).unwrap();

        let batch = vec![post("a", 5), post("b", 1), post("c", 9)];
        let kept = cleaner.clean_posts(batch);

        let ids: Vec<&str> = kept.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_cleaner_normalizes_text_fields() {
        let config = CleaningConfig {
            clean_text: true,
            ..CleaningConfig::default()
        };
        let cleaner = Cleaner::new(&config).unwrap();

        let mut p = post("a", 5);
        p.title = "Amazing Results: https://example.com (Benchmarks)".to_string();
        p.selftext = Some(String::new());

        let cleaned = cleaner.clean_posts(vec![p]);
        assert_eq!(cleaned[0].title, "amazing results benchmarks");
        // Empty fields pass through as empty strings.
        assert_eq!(cleaned[0].selftext.as_deref(), Some(""));
    }
}
