//! SQLite storage backend.
//!
//! Two related tables, `posts` and `comments`, with `comments.post_id`
//! declared as a foreign key to `posts.id`. Upserts use a
//! lookup-by-primary-key then update-or-insert pattern, with every
//! `save_*` call wrapped in a single transaction: on any failure the
//! transaction rolls back and no partial write persists.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::Sqlite;
use sqlx::query::QueryAs;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::{AppError, Result};
use crate::models::{Comment, Post};
use crate::storage::{FilterMap, StorageBackend, validate_filter};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id                  TEXT PRIMARY KEY,
    title               TEXT NOT NULL,
    author              TEXT NOT NULL,
    created_utc         TEXT NOT NULL,
    score               INTEGER NOT NULL,
    upvote_ratio        REAL,
    num_comments        INTEGER NOT NULL,
    url                 TEXT NOT NULL,
    selftext            TEXT,
    is_self             INTEGER NOT NULL,
    permalink           TEXT NOT NULL,
    flair               TEXT,
    domain              TEXT,
    is_video            INTEGER NOT NULL,
    is_original_content INTEGER NOT NULL,
    subreddit           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    id           TEXT PRIMARY KEY,
    post_id      TEXT NOT NULL REFERENCES posts(id),
    parent_id    TEXT NOT NULL,
    author       TEXT NOT NULL,
    created_utc  TEXT NOT NULL,
    score        INTEGER NOT NULL,
    body         TEXT NOT NULL,
    permalink    TEXT,
    depth        INTEGER NOT NULL,
    is_submitter INTEGER NOT NULL,
    subreddit    TEXT NOT NULL
);
"#;

const INSERT_POST: &str = "INSERT INTO posts (id, title, author, created_utc, score, \
     upvote_ratio, num_comments, url, selftext, is_self, permalink, flair, domain, \
     is_video, is_original_content, subreddit) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const UPDATE_POST: &str = "UPDATE posts SET title = ?, author = ?, created_utc = ?, \
     score = ?, upvote_ratio = ?, num_comments = ?, url = ?, selftext = ?, is_self = ?, \
     permalink = ?, flair = ?, domain = ?, is_video = ?, is_original_content = ?, \
     subreddit = ? WHERE id = ?";

const INSERT_COMMENT: &str = "INSERT INTO comments (id, post_id, parent_id, author, \
     created_utc, score, body, permalink, depth, is_submitter, subreddit) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const UPDATE_COMMENT: &str = "UPDATE comments SET post_id = ?, parent_id = ?, author = ?, \
     created_utc = ?, score = ?, body = ?, permalink = ?, depth = ?, is_submitter = ?, \
     subreddit = ? WHERE id = ?";

/// SQLite-backed storage.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) the database at `path` and ensure the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;

        log::info!("Opened sqlite storage at {}", path.as_ref().display());
        Ok(Self { pool })
    }

    /// Build a `SELECT *` statement with an AND-joined equality WHERE
    /// clause over the filter keys. Keys are validated against the record
    /// field list before this is called.
    fn select_sql(table: &str, filter: Option<&FilterMap>) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT * FROM {table}");
        let mut binds = Vec::new();
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            let clauses: Vec<String> = filter.keys().map(|k| format!("\"{k}\" = ?")).collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
            binds.extend(filter.values().cloned());
        }
        (sql, binds)
    }
}

/// Bind a JSON filter value to the query.
///
/// A null target binds SQL NULL, which `=` never matches; that keeps the
/// "missing field does not match" rule identical to the file backends.
fn bind_value<'q, O>(
    query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    value: &Value,
) -> Result<QueryAs<'q, Sqlite, O, SqliteArguments<'q>>> {
    let query = match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                return Err(AppError::config(format!(
                    "unsupported numeric filter value {n}"
                )));
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => {
            return Err(AppError::config(format!(
                "unsupported filter value {other}"
            )));
        }
    };
    Ok(query)
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    async fn save_posts(&self, posts: &[Post]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for post in posts {
            let exists = sqlx::query_scalar::<_, i64>("SELECT 1 FROM posts WHERE id = ?")
                .bind(&post.id)
                .fetch_optional(&mut *tx)
                .await?;

            if exists.is_some() {
                sqlx::query(UPDATE_POST)
                    .bind(&post.title)
                    .bind(&post.author)
                    .bind(post.created_utc)
                    .bind(post.score)
                    .bind(post.upvote_ratio)
                    .bind(post.num_comments)
                    .bind(&post.url)
                    .bind(&post.selftext)
                    .bind(post.is_self)
                    .bind(&post.permalink)
                    .bind(&post.flair)
                    .bind(&post.domain)
                    .bind(post.is_video)
                    .bind(post.is_original_content)
                    .bind(&post.subreddit)
                    .bind(&post.id)
                    .execute(&mut *tx)
                    .await?;
            } else {
                sqlx::query(INSERT_POST)
                    .bind(&post.id)
                    .bind(&post.title)
                    .bind(&post.author)
                    .bind(post.created_utc)
                    .bind(post.score)
                    .bind(post.upvote_ratio)
                    .bind(post.num_comments)
                    .bind(&post.url)
                    .bind(&post.selftext)
                    .bind(post.is_self)
                    .bind(&post.permalink)
                    .bind(&post.flair)
                    .bind(&post.domain)
                    .bind(post.is_video)
                    .bind(post.is_original_content)
                    .bind(&post.subreddit)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        log::info!("Saved {} posts to sqlite", posts.len());
        Ok(())
    }

    async fn save_comments(&self, comments: &[Comment]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for comment in comments {
            let exists = sqlx::query_scalar::<_, i64>("SELECT 1 FROM comments WHERE id = ?")
                .bind(&comment.id)
                .fetch_optional(&mut *tx)
                .await?;

            if exists.is_some() {
                sqlx::query(UPDATE_COMMENT)
                    .bind(&comment.post_id)
                    .bind(&comment.parent_id)
                    .bind(&comment.author)
                    .bind(comment.created_utc)
                    .bind(comment.score)
                    .bind(&comment.body)
                    .bind(&comment.permalink)
                    .bind(comment.depth)
                    .bind(comment.is_submitter)
                    .bind(&comment.subreddit)
                    .bind(&comment.id)
                    .execute(&mut *tx)
                    .await?;
            } else {
                sqlx::query(INSERT_COMMENT)
                    .bind(&comment.id)
                    .bind(&comment.post_id)
                    .bind(&comment.parent_id)
                    .bind(&comment.author)
                    .bind(comment.created_utc)
                    .bind(comment.score)
                    .bind(&comment.body)
                    .bind(&comment.permalink)
                    .bind(comment.depth)
                    .bind(comment.is_submitter)
                    .bind(&comment.subreddit)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        log::info!("Saved {} comments to sqlite", comments.len());
        Ok(())
    }

    async fn get_posts(&self, filter: Option<&FilterMap>) -> Result<Vec<Post>> {
        if let Some(filter) = filter {
            validate_filter(filter, Post::FIELDS)?;
        }
        let (sql, binds) = Self::select_sql("posts", filter);
        let mut query = sqlx::query_as::<_, Post>(&sql);
        for value in &binds {
            query = bind_value(query, value)?;
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn get_comments(&self, filter: Option<&FilterMap>) -> Result<Vec<Comment>> {
        if let Some(filter) = filter {
            validate_filter(filter, Comment::FIELDS)?;
        }
        let (sql, binds) = Self::select_sql("comments", filter);
        let mut query = sqlx::query_as::<_, Comment>(&sql);
        for value in &binds {
            query = bind_value(query, value)?;
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
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

    fn sample_comment(id: &str, post_id: &str) -> Comment {
        Comment {
            id: id.to_string(),
            post_id: post_id.to_string(),
            parent_id: post_id.to_string(),
            author: "replier".to_string(),
            created_utc: Utc.with_ymd_and_hms(2024, 6, 1, 12, 5, 0).unwrap(),
            score: 3,
            body: "a reply".to_string(),
            permalink: None,
            depth: 0,
            is_submitter: false,
            subreddit: "test".to_string(),
        }
    }

    async fn open_temp() -> (TempDir, SqliteStorage) {
        let tmp = TempDir::new().unwrap();
        let storage = SqliteStorage::open(tmp.path().join("harvest.db"))
            .await
            .unwrap();
        (tmp, storage)
    }

    #[tokio::test]
    async fn test_saving_twice_keeps_latest_values() {
        let (_tmp, storage) = open_temp().await;

        let mut post = sample_post("p1", 5);
        storage.save_posts(std::slice::from_ref(&post)).await.unwrap();

        post.score = 9;
        post.title = "Updated".to_string();
        storage.save_posts(std::slice::from_ref(&post)).await.unwrap();

        let stored = storage.get_posts(None).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].score, 9);
        assert_eq!(stored[0].title, "Updated");
    }

    #[tokio::test]
    async fn test_round_trip_preserves_all_fields() {
        let (_tmp, storage) = open_temp().await;

        let post = sample_post("p1", 5);
        storage.save_posts(std::slice::from_ref(&post)).await.unwrap();

        let mut filter = FilterMap::new();
        filter.insert("id".into(), json!("p1"));
        let stored = storage.get_posts(Some(&filter)).await.unwrap();
        assert_eq!(stored, vec![post]);
    }

    #[tokio::test]
    async fn test_filter_by_score() {
        let (_tmp, storage) = open_temp().await;

        storage
            .save_posts(&[sample_post("p1", 5), sample_post("p2", 9)])
            .await
            .unwrap();

        let mut filter = FilterMap::new();
        filter.insert("score".into(), json!(9));
        let stored = storage.get_posts(Some(&filter)).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "p2");

        let all = storage.get_posts(Some(&FilterMap::new())).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_filter_key_rejected() {
        let (_tmp, storage) = open_temp().await;

        let mut filter = FilterMap::new();
        filter.insert("karma".into(), json!(1));
        assert!(matches!(
            storage.get_posts(Some(&filter)).await,
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_comments_save_and_filter() {
        let (_tmp, storage) = open_temp().await;

        storage.save_posts(&[sample_post("p1", 5)]).await.unwrap();
        storage
            .save_comments(&[sample_comment("c1", "p1"), sample_comment("c2", "p1")])
            .await
            .unwrap();

        let mut updated = sample_comment("c1", "p1");
        updated.score = 10;
        storage.save_comments(&[updated]).await.unwrap();

        let all = storage.get_comments(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let mut filter = FilterMap::new();
        filter.insert("id".into(), json!("c1"));
        let stored = storage.get_comments(Some(&filter)).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].score, 10);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_tmp, storage) = open_temp().await;
        storage.close().await.unwrap();
        storage.close().await.unwrap();
    }
}
