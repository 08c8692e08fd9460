// src/services/reddit.rs

//! Reddit API client.
//!
//! Fetches posts and comments through the OAuth listing endpoints. A
//! minimum delay is enforced between successive remote calls, and every
//! call goes through the retry helper so rate-limit responses and
//! transient network failures are backed off before surfacing.
//!
//! Comment trees are flattened with an explicit work queue: the queue is
//! seeded with the top-level comments, each popped comment is emitted and
//! its direct replies are appended at the tail. Collapsed `more` stubs are
//! skipped.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{
    Comment, CommentSort, Config, Post, PostSort, RedditConfig, SearchSort, TimeFilter,
};
use crate::utils::retry::{RetryPolicy, retry_with_policy};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";

/// Listing page size cap imposed by the API.
const PAGE_SIZE: u32 = 100;

/// Safety margin subtracted from the reported token lifetime.
const TOKEN_SLACK_SECS: u64 = 30;

/// Placeholder author for removed accounts.
const DELETED_AUTHOR: &str = "[deleted]";

/// API credentials, resolved from config with environment fallbacks.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    /// Resolve credentials, falling back to `REDDIT_*` environment
    /// variables for anything the config leaves empty. A `.env` file is
    /// honored. Missing id or secret is a configuration error raised
    /// before any network call.
    pub fn resolve(config: &RedditConfig) -> Result<Self> {
        dotenvy::dotenv().ok();

        let client_id = config
            .client_id
            .clone()
            .or_else(|| std::env::var("REDDIT_CLIENT_ID").ok());
        let client_secret = config
            .client_secret
            .clone()
            .or_else(|| std::env::var("REDDIT_CLIENT_SECRET").ok());
        let username = config
            .username
            .clone()
            .or_else(|| std::env::var("REDDIT_USERNAME").ok());
        let password = config
            .password
            .clone()
            .or_else(|| std::env::var("REDDIT_PASSWORD").ok());

        match (client_id, client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(Self {
                client_id,
                client_secret,
                username,
                password,
            }),
            _ => Err(AppError::config(
                "missing Reddit API credentials: set reddit.client_id/client_secret \
                 or REDDIT_CLIENT_ID/REDDIT_CLIENT_SECRET",
            )),
        }
    }
}

struct Token {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_lifetime")]
    expires_in: u64,
}

fn default_token_lifetime() -> u64 {
    3600
}

struct ClientState {
    token: Option<Token>,
    last_request: Option<Instant>,
}

/// Client for the Reddit API.
///
/// All operations are sequential; the client keeps no state beyond the
/// OAuth token and the last-request instant used for throttling.
pub struct RedditClient {
    http: Client,
    credentials: Credentials,
    retry: RetryPolicy,
    min_delay: Duration,
    state: Mutex<ClientState>,
}

impl RedditClient {
    /// Create a client from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let credentials = Credentials::resolve(&config.reddit)?;
        let http = Client::builder()
            .user_agent(&config.reddit.user_agent)
            .timeout(Duration::from_secs(config.reddit.timeout_secs))
            .build()?;

        log::info!("Initialized Reddit client");
        Ok(Self {
            http,
            credentials,
            retry: RetryPolicy::from(&config.retry),
            min_delay: Duration::from_millis(config.reddit.request_delay_ms),
            state: Mutex::new(ClientState {
                token: None,
                last_request: None,
            }),
        })
    }

    /// Enforce the minimum delay between successive remote calls.
    async fn throttle(&self) {
        let wait = {
            let state = self.state.lock().await;
            state
                .last_request
                .and_then(|last| self.min_delay.checked_sub(last.elapsed()))
        };
        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }
        self.state.lock().await.last_request = Some(Instant::now());
    }

    /// Return a valid bearer token, requesting or refreshing as needed.
    async fn ensure_token(&self) -> Result<String> {
        {
            let state = self.state.lock().await;
            if let Some(token) = &state.token {
                if token.expires_at > Instant::now() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        log::debug!("Requesting OAuth token");
        let form: Vec<(&str, String)> = match (&self.credentials.username, &self.credentials.password)
        {
            (Some(username), Some(password)) => vec![
                ("grant_type", "password".to_string()),
                ("username", username.clone()),
                ("password", password.clone()),
            ],
            _ => vec![("grant_type", "client_credentials".to_string())],
        };

        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::api(
                status.as_u16(),
                format!("token request failed: {}", truncate_body(&body)),
            ));
        }

        let token: TokenResponse = response.json().await?;
        let access_token = token.access_token.clone();
        let expires_at =
            Instant::now() + Duration::from_secs(token.expires_in.saturating_sub(TOKEN_SLACK_SECS));

        self.state.lock().await.token = Some(Token {
            access_token: token.access_token,
            expires_at,
        });
        Ok(access_token)
    }

    /// GET a JSON document from the API, throttled and retried.
    async fn get_json(&self, url: Url) -> Result<Value> {
        retry_with_policy(&self.retry, || {
            let url = url.clone();
            async move {
                self.throttle().await;
                let token = self.ensure_token().await?;

                let response = self.http.get(url).bearer_auth(token).send().await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(AppError::api(status.as_u16(), truncate_body(&body)));
                }
                Ok(response.json::<Value>().await?)
            }
        })
        .await
    }

    fn listing_url(
        subreddit: &str,
        sort: PostSort,
        time: TimeFilter,
        page: u32,
        after: Option<&str>,
    ) -> Result<Url> {
        let mut url = Url::parse(&format!("{API_BASE}/r/{subreddit}/{}", sort.as_str()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &page.to_string());
            query.append_pair("raw_json", "1");
            if sort.supports_time_filter() {
                query.append_pair("t", time.as_str());
            }
            if let Some(after) = after {
                query.append_pair("after", after);
            }
        }
        Ok(url)
    }

    /// Retrieve up to `limit` posts from a subreddit, paginating with the
    /// listing cursor.
    pub async fn fetch_posts(
        &self,
        subreddit: &str,
        limit: u32,
        sort: PostSort,
        time: TimeFilter,
    ) -> Result<Vec<Post>> {
        log::info!("Retrieving {limit} {sort} posts from r/{subreddit} (time filter: {time})");

        let mut posts: Vec<Post> = Vec::new();
        let mut after: Option<String> = None;

        while (posts.len() as u32) < limit {
            let page = (limit - posts.len() as u32).min(PAGE_SIZE);
            let url = Self::listing_url(subreddit, sort, time, page, after.as_deref())?;
            let value = self.get_json(url).await?;
            let listing = Listing::from_value(&value)?;

            if listing.children.is_empty() {
                break;
            }
            for thing in listing.children {
                if thing.kind != "t3" {
                    continue;
                }
                let data: PostData = serde_json::from_value(thing.data)?;
                posts.push(Post::from(data));
            }

            after = listing.after;
            if after.is_none() {
                break;
            }
        }

        posts.truncate(limit as usize);
        log::info!("Fetched {} posts from r/{subreddit}", posts.len());
        Ok(posts)
    }

    /// Retrieve the comment forest of a post.
    ///
    /// `limit` caps the number of comments returned; `None` walks the
    /// whole tree window served by the API.
    pub async fn fetch_comments(
        &self,
        post_id: &str,
        limit: Option<u32>,
        sort: CommentSort,
    ) -> Result<Vec<Comment>> {
        log::info!("Retrieving comments for post {post_id} sorted by {sort}");

        let mut url = Url::parse(&format!("{API_BASE}/comments/{post_id}"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("sort", sort.as_str());
            query.append_pair("raw_json", "1");
            if let Some(limit) = limit {
                query.append_pair("limit", &limit.to_string());
            }
        }

        let value = self.get_json(url).await?;
        // The endpoint returns a two-element array: post listing, then
        // comment listing.
        let comment_listing = value
            .get(1)
            .ok_or_else(|| AppError::data(format!("no comment listing for post {post_id}")))?;
        let listing = Listing::from_value(comment_listing)?;

        let comments = flatten_comment_tree(listing, post_id, limit)?;
        log::info!("Fetched {} comments for post {post_id}", comments.len());
        Ok(comments)
    }

    /// Retrieve posts and their comment forests in one operation.
    pub async fn fetch_posts_with_comments(
        &self,
        subreddit: &str,
        limit: u32,
        sort: PostSort,
        time: TimeFilter,
        comment_limit: Option<u32>,
        comment_sort: CommentSort,
    ) -> Result<(Vec<Post>, Vec<Comment>)> {
        let posts = self.fetch_posts(subreddit, limit, sort, time).await?;

        let mut comments = Vec::new();
        for post in &posts {
            let post_comments = self
                .fetch_comments(&post.id, comment_limit, comment_sort)
                .await?;
            log::info!(
                "Retrieved {} comments for post {}",
                post_comments.len(),
                post.id
            );
            comments.extend(post_comments);
        }

        Ok((posts, comments))
    }

    /// Search for posts within a subreddit.
    pub async fn search_posts(
        &self,
        subreddit: &str,
        query: &str,
        limit: u32,
        sort: SearchSort,
        time: TimeFilter,
    ) -> Result<Vec<Post>> {
        log::info!("Searching for '{query}' in r/{subreddit}");

        let mut posts: Vec<Post> = Vec::new();
        let mut after: Option<String> = None;

        while (posts.len() as u32) < limit {
            let page = (limit - posts.len() as u32).min(PAGE_SIZE);
            let mut url = Url::parse(&format!("{API_BASE}/r/{subreddit}/search"))?;
            {
                let mut pairs = url.query_pairs_mut();
                pairs.append_pair("q", query);
                pairs.append_pair("restrict_sr", "1");
                pairs.append_pair("sort", sort.as_str());
                pairs.append_pair("t", time.as_str());
                pairs.append_pair("limit", &page.to_string());
                pairs.append_pair("raw_json", "1");
                if let Some(after) = &after {
                    pairs.append_pair("after", after);
                }
            }

            let value = self.get_json(url).await?;
            let listing = Listing::from_value(&value)?;

            if listing.children.is_empty() {
                break;
            }
            for thing in listing.children {
                if thing.kind != "t3" {
                    continue;
                }
                let data: PostData = serde_json::from_value(thing.data)?;
                posts.push(Post::from(data));
            }

            after = listing.after;
            if after.is_none() {
                break;
            }
        }

        posts.truncate(limit as usize);
        log::info!("Search returned {} posts", posts.len());
        Ok(posts)
    }

    /// Retrieve subreddit metadata.
    pub async fn subreddit_info(&self, subreddit: &str) -> Result<SubredditInfo> {
        log::info!("Retrieving information for r/{subreddit}");

        let url = Url::parse(&format!("{API_BASE}/r/{subreddit}/about"))?;
        let value = self.get_json(url).await?;
        let data = value
            .get("data")
            .cloned()
            .ok_or_else(|| AppError::data("about response without data envelope"))?;
        Ok(serde_json::from_value(data)?)
    }
}

/// Subreddit metadata from the about endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SubredditInfo {
    pub id: String,
    pub display_name: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub public_description: String,
    #[serde(default)]
    pub subscribers: Option<i64>,
    pub created_utc: f64,
    #[serde(default)]
    pub over18: bool,
    #[serde(default)]
    pub url: String,
}

impl SubredditInfo {
    pub fn created_at(&self) -> DateTime<Utc> {
        epoch_to_datetime(self.created_utc)
    }
}

/// Listing envelope shared by all endpoints.
#[derive(Debug, Default, Deserialize)]
struct Listing {
    #[serde(default)]
    children: Vec<Thing>,
    #[serde(default)]
    after: Option<String>,
}

impl Listing {
    fn from_value(value: &Value) -> Result<Self> {
        let data = value
            .get("data")
            .cloned()
            .ok_or_else(|| AppError::data("listing without data envelope"))?;
        Ok(serde_json::from_value(data)?)
    }
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Post fields as served by the listing endpoints.
#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    title: String,
    #[serde(default)]
    author: Option<String>,
    created_utc: f64,
    score: i64,
    #[serde(default)]
    upvote_ratio: Option<f64>,
    num_comments: i64,
    #[serde(default)]
    url: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    is_self: bool,
    permalink: String,
    #[serde(default)]
    link_flair_text: Option<String>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    is_original_content: bool,
    subreddit: String,
}

impl From<PostData> for Post {
    fn from(data: PostData) -> Self {
        Self {
            id: data.id,
            title: data.title,
            author: data.author.unwrap_or_else(|| DELETED_AUTHOR.to_string()),
            created_utc: epoch_to_datetime(data.created_utc),
            score: data.score,
            upvote_ratio: data.upvote_ratio,
            num_comments: data.num_comments,
            url: data.url,
            selftext: (!data.selftext.is_empty()).then_some(data.selftext),
            is_self: data.is_self,
            permalink: data.permalink,
            flair: data.link_flair_text,
            domain: data.domain,
            is_video: data.is_video,
            is_original_content: data.is_original_content,
            subreddit: data.subreddit,
        }
    }
}

/// Comment fields as served by the comment-tree endpoint.
#[derive(Debug, Deserialize)]
struct CommentData {
    id: String,
    parent_id: String,
    #[serde(default)]
    author: Option<String>,
    created_utc: f64,
    score: i64,
    body: String,
    #[serde(default)]
    permalink: Option<String>,
    #[serde(default)]
    is_submitter: bool,
    subreddit: String,
    /// Either an empty string or a nested listing.
    #[serde(default)]
    replies: Value,
}

fn comment_from(data: CommentData, post_id: &str, depth: i64) -> Comment {
    // "t1_abc" / "t3_abc" prefixes strip to the bare identifier.
    let parent_id = data
        .parent_id
        .split('_')
        .next_back()
        .unwrap_or(&data.parent_id)
        .to_string();

    Comment {
        id: data.id,
        post_id: post_id.to_string(),
        parent_id,
        author: data.author.unwrap_or_else(|| DELETED_AUTHOR.to_string()),
        created_utc: epoch_to_datetime(data.created_utc),
        score: data.score,
        body: data.body,
        permalink: data.permalink,
        depth,
        is_submitter: data.is_submitter,
        subreddit: data.subreddit,
    }
}

/// Flatten a comment listing with the work-queue traversal: pop front,
/// emit, append replies at the tail.
fn flatten_comment_tree(
    listing: Listing,
    post_id: &str,
    limit: Option<u32>,
) -> Result<Vec<Comment>> {
    let mut queue: VecDeque<(Thing, i64)> =
        listing.children.into_iter().map(|thing| (thing, 0)).collect();
    let mut comments = Vec::new();

    while let Some((thing, depth)) = queue.pop_front() {
        if limit.is_some_and(|limit| comments.len() as u32 >= limit) {
            break;
        }
        if thing.kind != "t1" {
            log::debug!("Skipping '{}' node in comment tree for {post_id}", thing.kind);
            continue;
        }

        let mut data: CommentData = serde_json::from_value(thing.data)?;
        let replies = std::mem::take(&mut data.replies);
        comments.push(comment_from(data, post_id, depth));

        if replies.is_object() {
            let reply_listing = Listing::from_value(&replies)?;
            queue.extend(
                reply_listing
                    .children
                    .into_iter()
                    .map(|thing| (thing, depth + 1)),
            );
        }
    }

    Ok(comments)
}

fn epoch_to_datetime(epoch_secs: f64) -> DateTime<Utc> {
    DateTime::from_timestamp(epoch_secs as i64, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

fn truncate_body(body: &str) -> String {
    const MAX_CHARS: usize = 200;
    if body.chars().count() <= MAX_CHARS {
        body.to_string()
    } else {
        let mut truncated: String = body.chars().take(MAX_CHARS).collect();
        truncated.push_str("...");
        truncated
    }
}
