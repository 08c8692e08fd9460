//! CSV tabular-file storage backend.
//!
//! Each entity type is one delimited file with a header row (`posts.csv`,
//! `comments.csv`). An upsert reads the existing table, appends the
//! incoming batch, drops duplicate identifiers keeping the newest
//! occurrence (the surviving row sits at the last occurrence's position),
//! and rewrites the whole file. Timestamps are stored as ISO-8601 strings.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::Result;
use crate::models::{Comment, Post};
use crate::storage::{FilterMap, StorageBackend, apply_filter, validate_filter};

const POSTS_FILE: &str = "posts.csv";
const COMMENTS_FILE: &str = "comments.csv";

/// CSV-file storage rooted at a data directory.
pub struct CsvStorage {
    data_dir: PathBuf,
}

impl CsvStorage {
    /// Create a CSV storage rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage = Self {
            data_dir: data_dir.into(),
        };
        std::fs::create_dir_all(&storage.data_dir)?;
        log::info!("Initialized csv storage in {}", storage.data_dir.display());
        Ok(storage)
    }

    fn path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    fn read_all<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.path(file);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let mut records = Vec::new();
        for row in reader.deserialize() {
            records.push(row?);
        }
        Ok(records)
    }

    /// Rewrite the whole table via temp file and rename.
    fn write_all<T: Serialize>(&self, file: &str, records: &[T]) -> Result<()> {
        let path = self.path(file);
        let tmp = path.with_extension("tmp");

        let mut writer = csv::Writer::from_path(&tmp)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        drop(writer);

        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Append the batch and drop duplicate identifiers keeping the newest
    /// occurrence.
    fn upsert<T>(&self, file: &str, records: &[T], id_of: fn(&T) -> &str) -> Result<()>
    where
        T: Clone + Serialize + DeserializeOwned,
    {
        let mut combined: Vec<T> = self.read_all(file)?;
        combined.extend_from_slice(records);

        let mut last_index: HashMap<String, usize> = HashMap::new();
        for (i, record) in combined.iter().enumerate() {
            last_index.insert(id_of(record).to_string(), i);
        }

        let kept: Vec<T> = combined
            .into_iter()
            .enumerate()
            .filter(|(i, record)| last_index[id_of(record)] == *i)
            .map(|(_, record)| record)
            .collect();

        self.write_all(file, &kept)
    }

    fn get<T>(&self, file: &str, filter: Option<&FilterMap>, fields: &[&str]) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let records: Vec<T> = self.read_all(file)?;
        match filter {
            Some(filter) => {
                validate_filter(filter, fields)?;
                apply_filter(records, filter)
            }
            None => Ok(records),
        }
    }
}

#[async_trait]
impl StorageBackend for CsvStorage {
    async fn save_posts(&self, posts: &[Post]) -> Result<()> {
        self.upsert(POSTS_FILE, posts, |p| &p.id)?;
        log::info!("Saved {} posts to {}", posts.len(), POSTS_FILE);
        Ok(())
    }

    async fn save_comments(&self, comments: &[Comment]) -> Result<()> {
        self.upsert(COMMENTS_FILE, comments, |c| &c.id)?;
        log::info!("Saved {} comments to {}", comments.len(), COMMENTS_FILE);
        Ok(())
    }

    async fn get_posts(&self, filter: Option<&FilterMap>) -> Result<Vec<Post>> {
        self.get(POSTS_FILE, filter, Post::FIELDS)
    }

    async fn get_comments(&self, filter: Option<&FilterMap>) -> Result<Vec<Comment>> {
        self.get(COMMENTS_FILE, filter, Comment::FIELDS)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_post(id: &str, score: i64) -> Post {
        Post {
            id: id.to_string(),
            title: "Test Post".to_string(),
            author: "tester".to_string(),
            created_utc: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            score,
            upvote_ratio: Some(0.9),
            num_comments: 1,
            url: "https://example.com/x".to_string(),
            selftext: None,
            is_self: false,
            permalink: format!("/r/test/comments/{id}/"),
            flair: None,
            domain: Some("example.com".to_string()),
            is_video: false,
            is_original_content: false,
            subreddit: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_reads_back_empty() {
        let tmp = TempDir::new().unwrap();
        let storage = CsvStorage::new(tmp.path()).unwrap();
        assert!(storage.get_posts(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_header_row_written() {
        let tmp = TempDir::new().unwrap();
        let storage = CsvStorage::new(tmp.path()).unwrap();

        storage.save_posts(&[sample_post("p1", 5)]).await.unwrap();

        let raw = std::fs::read_to_string(tmp.path().join(POSTS_FILE)).unwrap();
        let header = raw.lines().next().unwrap();
        assert_eq!(header.split(',').count(), Post::FIELDS.len());
        assert!(header.starts_with("id,title,author,created_utc"));
    }

    #[tokio::test]
    async fn test_duplicate_ids_keep_newest_occurrence() {
        let tmp = TempDir::new().unwrap();
        let storage = CsvStorage::new(tmp.path()).unwrap();

        storage
            .save_posts(&[sample_post("p1", 5), sample_post("p2", 1)])
            .await
            .unwrap();
        storage.save_posts(&[sample_post("p1", 99)]).await.unwrap();

        let stored = storage.get_posts(None).await.unwrap();
        assert_eq!(stored.len(), 2);
        // The updated row moves to the appended (newest) position.
        assert_eq!(stored[0].id, "p2");
        assert_eq!(stored[1].id, "p1");
        assert_eq!(stored[1].score, 99);
    }

    #[tokio::test]
    async fn test_round_trip_preserves_fields() {
        let tmp = TempDir::new().unwrap();
        let storage = CsvStorage::new(tmp.path()).unwrap();

        let post = sample_post("p1", 5);
        storage.save_posts(std::slice::from_ref(&post)).await.unwrap();

        let mut filter = FilterMap::new();
        filter.insert("id".into(), json!("p1"));
        let stored = storage.get_posts(Some(&filter)).await.unwrap();
        assert_eq!(stored, vec![post]);
    }

    #[tokio::test]
    async fn test_filter_semantics_match_other_backends() {
        let tmp = TempDir::new().unwrap();
        let storage = CsvStorage::new(tmp.path()).unwrap();

        storage
            .save_posts(&[sample_post("p1", 5), sample_post("p2", 9)])
            .await
            .unwrap();

        let mut filter = FilterMap::new();
        filter.insert("score".into(), json!(9));
        let stored = storage.get_posts(Some(&filter)).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "p2");

        let mut filter = FilterMap::new();
        filter.insert("karma".into(), json!(9));
        assert!(matches!(
            storage.get_posts(Some(&filter)).await,
            Err(crate::error::AppError::Config(_))
        ));
    }
}
