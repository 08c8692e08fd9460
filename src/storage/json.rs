//! JSON document-file storage backend.
//!
//! Each entity type is one JSON array in one file (`posts.json`,
//! `comments.json`). An upsert loads the full array, overlays incoming
//! records by identifier (existing records keep their position, new ones
//! append), and rewrites the whole file. Timestamps are stored as ISO-8601
//! strings since the format has no native temporal type. There is no
//! partial-failure guarantee across the read-modify-rewrite cycle.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{Comment, Post};
use crate::storage::{FilterMap, StorageBackend, apply_filter, validate_filter};

const POSTS_FILE: &str = "posts.json";
const COMMENTS_FILE: &str = "comments.json";

/// JSON-file storage rooted at a data directory.
pub struct JsonStorage {
    data_dir: PathBuf,
}

impl JsonStorage {
    /// Create a JSON storage rooted at `data_dir`, seeding empty arrays so
    /// a fresh directory reads back cleanly.
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage = Self {
            data_dir: data_dir.into(),
        };
        tokio::fs::create_dir_all(&storage.data_dir).await?;

        for file in [POSTS_FILE, COMMENTS_FILE] {
            if !tokio::fs::try_exists(storage.path(file)).await? {
                storage
                    .write_json(file, &Vec::<serde_json::Value>::new())
                    .await?;
            }
        }

        log::info!("Initialized json storage in {}", storage.data_dir.display());
        Ok(storage)
    }

    fn path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    /// Write bytes via temp file and rename.
    async fn write_bytes(&self, file: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(file);
        let tmp = path.with_extension("tmp");

        let mut out = tokio::fs::File::create(&tmp).await?;
        out.write_all(bytes).await?;
        out.flush().await?;
        drop(out);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(file, &bytes).await
    }

    /// Read bytes, returning None if the file doesn't exist.
    async fn read_bytes(&self, file: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(file)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>> {
        match self.read_bytes(file).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Overlay `records` onto the stored array by identifier and rewrite
    /// the file.
    async fn upsert<T>(&self, file: &str, records: &[T], id_of: fn(&T) -> &str) -> Result<()>
    where
        T: Clone + Serialize + DeserializeOwned,
    {
        let mut stored: Vec<T> = self.read_json(file).await?.unwrap_or_default();

        let mut index: HashMap<String, usize> = stored
            .iter()
            .enumerate()
            .map(|(i, record)| (id_of(record).to_string(), i))
            .collect();

        for record in records {
            match index.get(id_of(record)) {
                Some(&i) => stored[i] = record.clone(),
                None => {
                    index.insert(id_of(record).to_string(), stored.len());
                    stored.push(record.clone());
                }
            }
        }

        self.write_json(file, &stored).await
    }

    async fn get<T>(&self, file: &str, filter: Option<&FilterMap>, fields: &[&str]) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let stored: Vec<T> = self.read_json(file).await?.unwrap_or_default();
        match filter {
            Some(filter) => {
                validate_filter(filter, fields)?;
                apply_filter(stored, filter)
            }
            None => Ok(stored),
        }
    }
}

#[async_trait]
impl StorageBackend for JsonStorage {
    async fn save_posts(&self, posts: &[Post]) -> Result<()> {
        self.upsert(POSTS_FILE, posts, |p| &p.id).await?;
        log::info!("Saved {} posts to {}", posts.len(), POSTS_FILE);
        Ok(())
    }

    async fn save_comments(&self, comments: &[Comment]) -> Result<()> {
        self.upsert(COMMENTS_FILE, comments, |c| &c.id).await?;
        log::info!("Saved {} comments to {}", comments.len(), COMMENTS_FILE);
        Ok(())
    }

    async fn get_posts(&self, filter: Option<&FilterMap>) -> Result<Vec<Post>> {
        self.get(POSTS_FILE, filter, Post::FIELDS).await
    }

    async fn get_comments(&self, filter: Option<&FilterMap>) -> Result<Vec<Comment>> {
        self.get(COMMENTS_FILE, filter, Comment::FIELDS).await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
