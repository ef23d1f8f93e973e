//! Historical backfill for the authenticated source.
//!
//! Walks a fixed date range one day at a time, fetching up to a daily
//! cap of posts per day via timestamp-window search and ingesting their
//! comments inline instead of through the job queue. When the walk
//! passes the end date it wraps back to the start and begins another
//! pass after a long sleep, so slowly-arriving archive content is
//! eventually picked up. Re-ingestion is idempotent.

use std::time::Duration;

use chrono::{NaiveDate, TimeDelta};
use tokio_util::sync::CancellationToken;

use crate::enrich::Enricher;
use crate::error::AppError;
use crate::parse::{self, Parsed};
use crate::record::{Comment, ContentStore, Post};
use crate::source::AuthedSource;

/// Top-ranked comments fetched per backfilled post.
const COMMENT_LIMIT: u32 = 10;

const UNKNOWN_AUTHOR: &str = "unknown";

/// Date range and pacing for one backfill run.
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Maximum posts fetched per day window.
    pub daily_limit: u32,
    /// Sleep between consecutive day windows.
    pub day_delay: Duration,
    /// Sleep after a full pass over the range, before wrapping around.
    pub pass_delay: Duration,
}

impl BackfillConfig {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            daily_limit: 100,
            day_delay: Duration::from_secs(1),
            pass_delay: Duration::from_secs(600),
        }
    }

    pub fn with_daily_limit(mut self, limit: u32) -> Self {
        self.daily_limit = limit;
        self
    }

    pub fn with_pass_delay(mut self, delay: Duration) -> Self {
        self.pass_delay = delay;
        self
    }
}

/// Advance the walk by one day, wrapping past `end` back to `start`.
/// Returns the next day and whether a full pass just completed.
pub fn advance_day(current: NaiveDate, start: NaiveDate, end: NaiveDate) -> (NaiveDate, bool) {
    let next = current + TimeDelta::days(1);
    if next > end { (start, true) } else { (next, false) }
}

/// Inclusive epoch-second bounds of one UTC day.
pub fn day_window(date: NaiveDate) -> (i64, i64) {
    let start = date.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp());
    // Midnight always exists; fall back to 0 keeps the signature infallible.
    let start = start.unwrap_or(0);
    (start, start + 86_399)
}

/// Day-walking backfill over a subreddit's history.
pub struct BackfillService<A, E, S>
where
    A: AuthedSource,
    E: Enricher,
    S: ContentStore,
{
    authed: A,
    enricher: E,
    store: S,
    config: BackfillConfig,
}

impl<A, E, S> BackfillService<A, E, S>
where
    A: AuthedSource,
    E: Enricher,
    S: ContentStore,
{
    pub fn new(authed: A, enricher: E, store: S, config: BackfillConfig) -> Self {
        Self {
            authed,
            enricher,
            store,
            config,
        }
    }

    /// Walk the configured range until cancelled.
    pub async fn run(&self, subreddit: &str, cancel_token: CancellationToken) {
        let mut day = self.config.start;
        let mut pass = 1u64;

        tracing::info!(
            %subreddit,
            start = %self.config.start,
            end = %self.config.end,
            "Backfill started"
        );

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            match self.crawl_day(subreddit, day).await {
                Ok(count) => {
                    tracing::info!(%subreddit, %day, %count, "Backfilled day");
                }
                Err(e) => {
                    // A failed day is retried on the next pass.
                    tracing::warn!(%subreddit, %day, error = %e, "Day fetch failed, skipping");
                }
            }

            let (next, wrapped) = advance_day(day, self.config.start, self.config.end);
            day = next;

            let delay = if wrapped {
                tracing::info!(%subreddit, %pass, "Backfill pass complete, wrapping around");
                pass += 1;
                self.config.pass_delay
            } else {
                self.config.day_delay
            };

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel_token.cancelled() => break,
            }
        }

        tracing::info!(%subreddit, "Backfill stopped");
    }

    /// Fetch and ingest one day's window. Returns the number of posts
    /// ingested.
    async fn crawl_day(&self, subreddit: &str, day: NaiveDate) -> Result<usize, AppError> {
        let (after, before) = day_window(day);
        let listing = self
            .authed
            .fetch_posts_by_window(subreddit, after, before, self.config.daily_limit)
            .await?;

        let mut ingested = 0;
        for raw in &listing.posts {
            let created_utc = match parse::epoch_secs(raw.created_utc) {
                Parsed::Ok(ts) => ts,
                Parsed::Skip(reason) => {
                    tracing::warn!(post_id = %raw.id, %reason, "Skipping post");
                    continue;
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
                tracing::error!(post_id = %post.post_id, error = %e, "Failed to store post");
            }
            ingested += 1;

            // No queue in the backfill path; comments come inline.
            if let Err(e) = self.crawl_comments(subreddit, &raw.id).await {
                tracing::warn!(post_id = %raw.id, error = %e, "Comment fetch failed");
            }
        }

        Ok(ingested)
    }

    async fn crawl_comments(&self, subreddit: &str, post_id: &str) -> Result<(), AppError> {
        let comments = self
            .authed
            .fetch_top_comments(subreddit, post_id, COMMENT_LIMIT)
            .await?;

        for raw in &comments {
            let created_utc = match parse::epoch_secs(raw.created_utc) {
                Parsed::Ok(ts) => ts,
                Parsed::Skip(reason) => {
                    tracing::warn!(comment_id = %raw.id, %reason, "Skipping comment");
                    continue;
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
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn service(
        authed: MockAuthedSource,
        store: MockContentStore,
        config: BackfillConfig,
    ) -> BackfillService<MockAuthedSource, MockEnricher, MockContentStore> {
        BackfillService::new(authed, MockEnricher::fixed(Some(0.2), false), store, config)
    }

    #[test]
    fn advance_walks_forward_within_range() {
        let (start, end) = (date(2024, 1, 1), date(2024, 1, 3));
        assert_eq!(advance_day(date(2024, 1, 1), start, end), (date(2024, 1, 2), false));
        assert_eq!(advance_day(date(2024, 1, 2), start, end), (date(2024, 1, 3), false));
    }

    #[test]
    fn advance_wraps_past_the_end() {
        let (start, end) = (date(2024, 1, 1), date(2024, 1, 3));
        assert_eq!(advance_day(end, start, end), (start, true));
    }

    #[test]
    fn single_day_range_always_wraps() {
        let d = date(2024, 6, 15);
        assert_eq!(advance_day(d, d, d), (d, true));
    }

    #[test]
    fn day_window_is_inclusive_of_both_midnights() {
        let (after, before) = day_window(date(2024, 12, 1));
        assert_eq!(after, 1_733_011_200);
        assert_eq!(before - after, 86_399);
    }

    #[tokio::test]
    async fn crawl_day_requests_the_day_window_with_the_daily_limit() {
        let authed = MockAuthedSource::with_listing(make_listing(&[], None));
        let svc = service(
            authed.clone(),
            MockContentStore::empty(),
            BackfillConfig::new(date(2024, 12, 1), date(2024, 12, 2)).with_daily_limit(50),
        );

        svc.crawl_day("rust", date(2024, 12, 1)).await.unwrap();

        let calls = authed.window_calls();
        assert_eq!(calls.len(), 1);
        let (subreddit, after, before, limit) = &calls[0];
        assert_eq!(subreddit, "rust");
        assert_eq!(*after, 1_733_011_200);
        assert_eq!(*before, 1_733_011_200 + 86_399);
        assert_eq!(*limit, 50);
    }

    #[tokio::test]
    async fn crawl_day_ingests_posts_and_inline_comments() {
        let authed = MockAuthedSource::with_listing(make_listing(&["p1", "p2"], None))
            .and_comments(vec![make_comment("c1", "old thread")]);
        let store = MockContentStore::empty();
        let svc = service(
            authed,
            store.clone(),
            BackfillConfig::new(date(2024, 12, 1), date(2024, 12, 2)),
        );

        let count = svc.crawl_day("rust", date(2024, 12, 1)).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(store.posts().len(), 2);
        assert_eq!(store.posts()[0].sentiment, Some(0.2));
        // One comment served per post.
        assert_eq!(store.comments().len(), 2);
        assert_eq!(store.comments()[0].post_id, "p1");
        assert_eq!(store.comments()[1].post_id, "p2");
    }

    #[tokio::test]
    async fn crawl_day_propagates_fetch_failure() {
        let svc = service(
            MockAuthedSource::failing(AppError::Timeout(10)),
            MockContentStore::empty(),
            BackfillConfig::new(date(2024, 12, 1), date(2024, 12, 2)),
        );

        let err = svc.crawl_day("rust", date(2024, 12, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let mut config = BackfillConfig::new(date(2024, 12, 1), date(2024, 12, 5));
        config.day_delay = Duration::from_millis(1);
        config.pass_delay = Duration::from_millis(1);
        let svc = service(
            MockAuthedSource::with_listing(make_listing(&[], None)),
            MockContentStore::empty(),
            config,
        );

        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        // Terminates instead of walking forever.
        svc.run("rust", token).await;
    }
}
