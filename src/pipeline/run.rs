// src/pipeline/run.rs

//! End-to-end harvest orchestration.

use crate::error::Result;
use crate::models::Config;
use crate::pipeline::clean::Cleaner;
use crate::services::RedditClient;
use crate::storage::StorageBackend;

/// Counts from one harvest run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub fetched_posts: usize,
    pub fetched_comments: usize,
    pub kept_posts: usize,
    pub kept_comments: usize,
    pub stored_posts: usize,
    pub stored_comments: usize,
}

/// Fetch, clean, persist, and verify one snapshot.
pub async fn run_harvest(
    config: &Config,
    client: &RedditClient,
    storage: &dyn StorageBackend,
) -> Result<RunSummary> {
    let fetch = &config.fetch;
    log::info!(
        "Harvesting {} {} posts from r/{}",
        fetch.limit,
        fetch.sort,
        fetch.subreddit
    );

    let (posts, comments) = if fetch.skip_comments {
        let posts = client
            .fetch_posts(&fetch.subreddit, fetch.limit, fetch.sort, fetch.time)
            .await?;
        (posts, Vec::new())
    } else {
        client
            .fetch_posts_with_comments(
                &fetch.subreddit,
                fetch.limit,
                fetch.sort,
                fetch.time,
                fetch.comment_limit,
                fetch.comment_sort,
            )
            .await?
    };

    let mut summary = RunSummary {
        fetched_posts: posts.len(),
        fetched_comments: comments.len(),
        ..RunSummary::default()
    };
    log::info!(
        "Fetched {} posts and {} comments",
        summary.fetched_posts,
        summary.fetched_comments
    );

    let cleaner = Cleaner::new(&config.cleaning)?;
    let posts = cleaner.clean_posts(posts);
    let comments = cleaner.clean_comments(comments);
    summary.kept_posts = posts.len();
    summary.kept_comments = comments.len();

    storage.save_posts(&posts).await?;
    storage.save_comments(&comments).await?;

    // Read back through the same backend to confirm the upsert landed.
    summary.stored_posts = storage.get_posts(None).await?.len();
    summary.stored_comments = storage.get_comments(None).await?.len();
    log::info!(
        "Verified storage: {} posts and {} comments retrievable",
        summary.stored_posts,
        summary.stored_comments
    );

    Ok(summary)
}
