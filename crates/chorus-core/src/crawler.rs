//! Crawl handlers: one method per job type, plus the continuation
//! policy that keeps each chain alive.
//!
//! Recurring polls (`poll_subreddit`, `poll_catalog`) never propagate a
//! fetch failure — they enqueue a delayed retry copy of themselves and
//! complete, because "source unreachable, try later" is a domain
//! condition, not a malformed job. Leaf fetches (`fetch_thread`,
//! `fetch_post_comments`) propagate errors and consume the broker-level
//! retry budget instead.

use std::collections::HashSet;

use crate::enrich::Enricher;
use crate::error::AppError;
use crate::frontier;
use crate::job::{JobPayload, NewCrawlJob, POLL_DELAY};
use crate::job_queue::JobQueue;
use crate::parse::{self, Parsed};
use crate::record::{BoardPost, Comment, ContentStore, Post};
use crate::source::{AnonSource, AuthedSource, RawBoardPost, RawComment, RawPost};

/// Top-ranked comments fetched per post.
const COMMENT_LIMIT: u32 = 10;

/// Author fallbacks for deleted/anonymous content.
const UNKNOWN_AUTHOR: &str = "unknown";
const ANON_NAME: &str = "Anonymous";

/// Dispatch target for all crawl jobs. Generic over every external
/// collaborator so unit tests run against mocks.
#[derive(Clone)]
pub struct CrawlerService<A, N, E, S, Q>
where
    A: AuthedSource,
    N: AnonSource,
    E: Enricher,
    S: ContentStore,
    Q: JobQueue,
{
    authed: A,
    anon: N,
    enricher: E,
    store: S,
    queue: Q,
}

impl<A, N, E, S, Q> CrawlerService<A, N, E, S, Q>
where
    A: AuthedSource,
    N: AnonSource,
    E: Enricher,
    S: ContentStore,
    Q: JobQueue,
{
    pub fn new(authed: A, anon: N, enricher: E, store: S, queue: Q) -> Self {
        Self {
            authed,
            anon,
            enricher,
            store,
            queue,
        }
    }

    /// Handle a `crawl-subreddit` job.
    ///
    /// On success: store each post, enqueue its comment fetch, then
    /// enqueue an immediate same-type job if the listing carried a next
    /// cursor, and always a cursor-less re-poll after [`POLL_DELAY`].
    pub async fn poll_subreddit(
        &self,
        subreddit: &str,
        after: Option<&str>,
    ) -> Result<(), AppError> {
        let listing = match self.authed.fetch_new_posts(subreddit, after).await {
            Ok(listing) => listing,
            Err(e) => {
                tracing::warn!(%subreddit, ?after, error = %e, "Subreddit poll failed, rescheduling");
                self.queue
                    .enqueue(
                        NewCrawlJob::new(&JobPayload::PollSubreddit {
                            subreddit: subreddit.to_string(),
                            after: after.map(str::to_string),
                        })
                        .delayed_by(POLL_DELAY),
                    )
                    .await?;
                return Ok(());
            }
        };

        tracing::info!(%subreddit, count = listing.posts.len(), "Fetched posts");

        for raw in &listing.posts {
            self.ingest_post(subreddit, raw).await;
        }

        if let Some(cursor) = &listing.after {
            // Drain the next page without delay.
            self.queue
                .enqueue(NewCrawlJob::new(&JobPayload::PollSubreddit {
                    subreddit: subreddit.to_string(),
                    after: Some(cursor.clone()),
                }))
                .await?;
        }

        // Restart the feed from the top after the delay.
        self.queue
            .enqueue(
                NewCrawlJob::new(&JobPayload::PollSubreddit {
                    subreddit: subreddit.to_string(),
                    after: None,
                })
                .delayed_by(POLL_DELAY),
            )
            .await?;

        Ok(())
    }

    /// Handle a `crawl-reddit-comments` job.
    pub async fn fetch_post_comments(
        &self,
        subreddit: &str,
        post_id: &str,
    ) -> Result<(), AppError> {
        let comments = self
            .authed
            .fetch_top_comments(subreddit, post_id, COMMENT_LIMIT)
            .await?;

        tracing::info!(%subreddit, %post_id, count = comments.len(), "Fetched top comments");

        for raw in &comments {
            self.ingest_comment(subreddit, post_id, raw).await;
        }
        Ok(())
    }

    /// Handle a `crawl-catalog` job.
    ///
    /// Diffs the board catalog against the previous frontier, spawns a
    /// thread fetch per new id, and enqueues the next poll carrying the
    /// current snapshot.
    pub async fn poll_catalog(
        &self,
        board: &str,
        previous: Option<&[u64]>,
    ) -> Result<(), AppError> {
        let catalog = match self.anon.get_catalog(board).await {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!(%board, error = %e, "Catalog poll failed, rescheduling");
                self.queue
                    .enqueue(
                        NewCrawlJob::new(&JobPayload::PollCatalog {
                            board: board.to_string(),
                            previous: previous.map(<[u64]>::to_vec),
                        })
                        .delayed_by(POLL_DELAY),
                    )
                    .await?;
                return Ok(());
            }
        };

        let current: Vec<u64> = catalog
            .iter()
            .flat_map(|page| page.threads.iter().map(|t| t.no))
            .collect();

        let previous_set: Option<HashSet<u64>> =
            previous.map(|ids| ids.iter().copied().collect());
        let new_threads = frontier::diff(&current, previous_set.as_ref());

        tracing::info!(
            %board,
            catalog_size = current.len(),
            new = new_threads.len(),
            "Catalog diffed"
        );

        for thread_no in new_threads {
            self.queue
                .enqueue(NewCrawlJob::new(&JobPayload::FetchThread {
                    board: board.to_string(),
                    thread_no,
                }))
                .await?;
        }

        self.queue
            .enqueue(
                NewCrawlJob::new(&JobPayload::PollCatalog {
                    board: board.to_string(),
                    previous: Some(current),
                })
                .delayed_by(POLL_DELAY),
            )
            .await?;

        Ok(())
    }

    /// Handle a `crawl-thread` job.
    pub async fn fetch_thread(&self, board: &str, thread_no: u64) -> Result<(), AppError> {
        let snapshot = self.anon.get_thread(board, thread_no).await?;

        // The opening post's number is the thread id for every reply.
        let thread_no = snapshot
            .posts
            .first()
            .map(|p| p.no)
            .unwrap_or(thread_no);

        tracing::info!(%board, %thread_no, count = snapshot.posts.len(), "Fetched thread");

        for raw in &snapshot.posts {
            self.ingest_board_post(board, thread_no, raw).await;
        }
        Ok(())
    }

    async fn ingest_post(&self, subreddit: &str, raw: &RawPost) {
        let created_utc = match parse::epoch_secs(raw.created_utc) {
            Parsed::Ok(ts) => ts,
            Parsed::Skip(reason) => {
                tracing::warn!(post_id = %raw.id, %reason, "Skipping post");
                return;
            }
        };

        let enrichment = self.enricher.enrich(&raw.selftext).await;
        let post = Post {
            subreddit: subreddit.to_string(),
            post_id: raw.id.clone(),
            title: raw.title.clone(),
            author: raw.author.clone().unwrap_or_else(|| UNKNOWN_AUTHOR.into()),
            created_utc,
            content: raw.selftext.clone(),
            comments_count: raw.num_comments,
            score: raw.score,
            url: raw.url.clone(),
            sentiment: enrichment.sentiment,
            is_toxic: enrichment.is_toxic,
        };

        if let Err(e) = self.store.upsert_post(&post).await {
            // The fetch is cheap to repeat; a failed write self-heals on
            // the next ingestion of the same key.
            tracing::error!(post_id = %post.post_id, error = %e, "Failed to store post");
        }

        if let Err(e) = self
            .queue
            .enqueue(NewCrawlJob::new(&JobPayload::FetchPostComments {
                subreddit: subreddit.to_string(),
                post_id: post.post_id.clone(),
            }))
            .await
        {
            // Same self-healing as a failed write: the next poll sees
            // the post again and re-enqueues its comment fetch.
            tracing::error!(post_id = %post.post_id, error = %e, "Failed to enqueue comment fetch");
        }
    }

    async fn ingest_comment(&self, subreddit: &str, post_id: &str, raw: &RawComment) {
        let created_utc = match parse::epoch_secs(raw.created_utc) {
            Parsed::Ok(ts) => ts,
            Parsed::Skip(reason) => {
                tracing::warn!(comment_id = %raw.id, %reason, "Skipping comment");
                return;
            }
        };

        let enrichment = self.enricher.enrich(&raw.body).await;
        let comment = Comment {
            subreddit: subreddit.to_string(),
            post_id: post_id.to_string(),
            comment_id: raw.id.clone(),
            author: raw.author.clone().unwrap_or_else(|| UNKNOWN_AUTHOR.into()),
            created_utc,
            body: raw.body.clone(),
            score: raw.score,
            sentiment: enrichment.sentiment,
            is_toxic: enrichment.is_toxic,
        };

        if let Err(e) = self.store.upsert_comment(&comment).await {
            tracing::error!(comment_id = %comment.comment_id, error = %e, "Failed to store comment");
        }
    }

    async fn ingest_board_post(&self, board: &str, thread_no: u64, raw: &RawBoardPost) {
        let created_at = match parse::epoch_secs(raw.time) {
            Parsed::Ok(ts) => ts,
            Parsed::Skip(reason) => {
                tracing::warn!(post_no = %raw.no, %reason, "Skipping board post");
                return;
            }
        };

        let enrichment = self.enricher.enrich(&raw.com).await;
        let post = BoardPost {
            board: board.to_string(),
            thread_no: thread_no as i64,
            post_no: raw.no as i64,
            created_at,
            name: raw.name.clone().unwrap_or_else(|| ANON_NAME.into()),
            comment: raw.com.clone(),
            replies: raw.replies,
            images: raw.images,
            sentiment: enrichment.sentiment,
            is_toxic: enrichment.is_toxic,
        };

        if let Err(e) = self.store.upsert_board_post(&post).await {
            tracing::error!(post_no = %post.post_no, error = %e, "Failed to store board post");
        }
    }
}
