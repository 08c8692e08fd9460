//! Service layer for the harvester application.
//!
//! This module contains the remote collaborators:
//! - Reddit API access (`RedditClient`)

pub mod reddit;

pub use reddit::{Credentials, RedditClient, SubredditInfo};
