// src/models/listing.rs

//! Listing parameters: sort modes and time windows.
//!
//! Each enum parses from its lowercase tag; an unknown tag is a
//! configuration error surfaced before any remote call is made.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Sort order for subreddit listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostSort {
    Hot,
    New,
    Top,
    Rising,
    Controversial,
}

impl PostSort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::New => "new",
            Self::Top => "top",
            Self::Rising => "rising",
            Self::Controversial => "controversial",
        }
    }

    /// Whether the listing endpoint accepts a time window.
    pub fn supports_time_filter(self) -> bool {
        matches!(self, Self::Top | Self::Controversial)
    }
}

impl FromStr for PostSort {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, AppError> {
        match s.to_ascii_lowercase().as_str() {
            "hot" => Ok(Self::Hot),
            "new" => Ok(Self::New),
            "top" => Ok(Self::Top),
            "rising" => Ok(Self::Rising),
            "controversial" => Ok(Self::Controversial),
            _ => Err(AppError::config(format!("unknown post sort '{s}'"))),
        }
    }
}

impl fmt::Display for PostSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort order for a post's comment tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentSort {
    Best,
    Top,
    New,
    Controversial,
    Old,
    Qa,
}

impl CommentSort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::Top => "top",
            Self::New => "new",
            Self::Controversial => "controversial",
            Self::Old => "old",
            Self::Qa => "qa",
        }
    }
}

impl FromStr for CommentSort {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, AppError> {
        match s.to_ascii_lowercase().as_str() {
            "best" => Ok(Self::Best),
            "top" => Ok(Self::Top),
            "new" => Ok(Self::New),
            "controversial" => Ok(Self::Controversial),
            "old" => Ok(Self::Old),
            "qa" => Ok(Self::Qa),
            _ => Err(AppError::config(format!("unknown comment sort '{s}'"))),
        }
    }
}

impl fmt::Display for CommentSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort order for subreddit search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSort {
    Relevance,
    Hot,
    New,
    Top,
    Comments,
}

impl SearchSort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::Hot => "hot",
            Self::New => "new",
            Self::Top => "top",
            Self::Comments => "comments",
        }
    }
}

impl FromStr for SearchSort {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, AppError> {
        match s.to_ascii_lowercase().as_str() {
            "relevance" => Ok(Self::Relevance),
            "hot" => Ok(Self::Hot),
            "new" => Ok(Self::New),
            "top" => Ok(Self::Top),
            "comments" => Ok(Self::Comments),
            _ => Err(AppError::config(format!("unknown search sort '{s}'"))),
        }
    }
}

impl fmt::Display for SearchSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time window for `top`, `controversial`, and search listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::All => "all",
        }
    }
}

impl FromStr for TimeFilter {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, AppError> {
        match s.to_ascii_lowercase().as_str() {
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "all" => Ok(Self::All),
            _ => Err(AppError::config(format!("unknown time filter '{s}'"))),
        }
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_tags() {
        assert_eq!("hot".parse::<PostSort>().unwrap(), PostSort::Hot);
        assert_eq!("TOP".parse::<PostSort>().unwrap(), PostSort::Top);
        assert_eq!("qa".parse::<CommentSort>().unwrap(), CommentSort::Qa);
        assert_eq!("all".parse::<TimeFilter>().unwrap(), TimeFilter::All);
    }

    #[test]
    fn test_unknown_tag_is_config_error() {
        assert!(matches!(
            "spicy".parse::<PostSort>(),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            "worst".parse::<CommentSort>(),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_time_filter_applicability() {
        assert!(PostSort::Top.supports_time_filter());
        assert!(PostSort::Controversial.supports_time_filter());
        assert!(!PostSort::Hot.supports_time_filter());
    }
}
