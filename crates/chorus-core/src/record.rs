//! Enriched content records and the store seam.
//!
//! Natural keys (`post_id`, `comment_id`, `post_no`) are unique per
//! collection; upserting the same key twice updates in place. Records
//! are never deleted by this subsystem.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// An enriched post from the authenticated source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub subreddit: String,
    /// Natural key.
    pub post_id: String,
    pub title: String,
    pub author: String,
    pub created_utc: DateTime<Utc>,
    pub content: String,
    pub comments_count: i64,
    pub score: i64,
    pub url: String,
    /// Compound sentiment in [-1, +1]; `None` when there was no text.
    pub sentiment: Option<f64>,
    pub is_toxic: bool,
}

/// An enriched comment from the authenticated source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub subreddit: String,
    pub post_id: String,
    /// Natural key.
    pub comment_id: String,
    pub author: String,
    pub created_utc: DateTime<Utc>,
    pub body: String,
    pub score: i64,
    pub sentiment: Option<f64>,
    pub is_toxic: bool,
}

/// An enriched post from the anonymous source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardPost {
    pub board: String,
    pub thread_no: i64,
    /// Natural key.
    pub post_no: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub comment: String,
    pub replies: i64,
    pub images: i64,
    pub sentiment: Option<f64>,
    pub is_toxic: bool,
}

/// Idempotent writer for enriched records.
///
/// Implementations rely on a store-level unique constraint on the
/// natural key, so concurrent upserts from parallel workers are
/// serialized by the store, never by the pipeline.
pub trait ContentStore: Send + Sync + Clone {
    fn upsert_post(&self, post: &Post) -> impl Future<Output = Result<(), AppError>> + Send;

    fn upsert_comment(
        &self,
        comment: &Comment,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn upsert_board_post(
        &self,
        post: &BoardPost,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}
