//! Wire types and trait seams for the two content sources.
//!
//! The authenticated source is a paginated listing API behind OAuth;
//! the anonymous source exposes a full per-board catalog and per-thread
//! snapshots with no auth and no "since" cursor. Both traits are the
//! seams handlers depend on, so unit tests run against mocks.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One page of posts from the authenticated source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Listing {
    /// Opaque pagination cursor for the next page, if any.
    pub after: Option<String>,
    pub posts: Vec<RawPost>,
}

/// A post as returned by the authenticated source, before enrichment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPost {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    /// Epoch seconds; the source serialises this as a float.
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub url: String,
}

/// A comment as returned by the authenticated source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawComment {
    pub id: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub score: i64,
}

/// Full content of one anonymous-source thread.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadSnapshot {
    #[serde(default)]
    pub posts: Vec<RawBoardPost>,
}

/// A post within an anonymous-source thread.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBoardPost {
    pub no: u64,
    #[serde(default)]
    pub time: f64,
    #[serde(default)]
    pub name: Option<String>,
    /// Comment body (HTML-ish). Absent on image-only posts.
    #[serde(default)]
    pub com: String,
    #[serde(default)]
    pub replies: i64,
    #[serde(default)]
    pub images: i64,
}

/// One page of the anonymous source's board catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogPage {
    #[serde(default)]
    pub threads: Vec<CatalogEntry>,
}

/// Thread summary within a catalog page. Only the id matters here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub no: u64,
}

/// The authenticated, rate-limited source.
pub trait AuthedSource: Send + Sync + Clone {
    /// Fetch the newest posts for a subreddit, optionally resuming from
    /// an opaque pagination cursor.
    fn fetch_new_posts(
        &self,
        subreddit: &str,
        after: Option<&str>,
    ) -> impl Future<Output = Result<Listing, AppError>> + Send;

    /// Fetch posts created within `[after, before]` epoch seconds
    /// (inclusive on both ends).
    fn fetch_posts_by_window(
        &self,
        subreddit: &str,
        after: i64,
        before: i64,
        limit: u32,
    ) -> impl Future<Output = Result<Listing, AppError>> + Send;

    /// Fetch the top-ranked comments for a post, truncated to `limit`.
    fn fetch_top_comments(
        &self,
        subreddit: &str,
        post_id: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<RawComment>, AppError>> + Send;
}

/// The anonymous, high-churn source.
pub trait AnonSource: Send + Sync + Clone {
    fn get_thread(
        &self,
        board: &str,
        thread_no: u64,
    ) -> impl Future<Output = Result<ThreadSnapshot, AppError>> + Send;

    fn get_catalog(
        &self,
        board: &str,
    ) -> impl Future<Output = Result<Vec<CatalogPage>, AppError>> + Send;
}
