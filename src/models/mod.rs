// src/models/mod.rs

//! Domain models for the harvester application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod comment;
mod config;
mod listing;
mod post;

// Re-export all public types
pub use comment::Comment;
pub use config::{
    CleaningConfig, Config, FetchConfig, RedditConfig, RetryConfig, StorageConfig, TextOptions,
};
pub use listing::{CommentSort, PostSort, SearchSort, TimeFilter};
pub use post::Post;
