//! Handwritten mocks for dependency injection in unit tests.
//!
//! All mocks use `Arc<Mutex<_>>` for interior mutability so clones
//! handed to a service under test share state with the copy the test
//! keeps for assertions.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::enrich::{Enricher, Enrichment, Moderation, SentimentScorer, ToxicityClassifier};
use crate::error::AppError;
use crate::job::{CrawlJob, JobStatus, JobType, NewCrawlJob};
use crate::job_queue::JobQueue;
use crate::record::{BoardPost, Comment, ContentStore, Post};
use crate::source::{
    AnonSource, AuthedSource, CatalogEntry, CatalogPage, Listing, RawBoardPost, RawComment,
    RawPost, ThreadSnapshot,
};
use crate::worker::{WorkerEvent, WorkerReporter};

/// `AppError` holds non-clonable payloads, so failing mocks re-mint
/// the error on every call.
fn clone_err(e: &AppError) -> AppError {
    match e {
        AppError::ConfigError(m) => AppError::ConfigError(m.clone()),
        AppError::HttpError(m) => AppError::HttpError(m.clone()),
        AppError::NetworkError(m) => AppError::NetworkError(m.clone()),
        AppError::Timeout(s) => AppError::Timeout(*s),
        AppError::RateLimitExceeded => AppError::RateLimitExceeded,
        AppError::AuthError(m) => AppError::AuthError(m.clone()),
        AppError::InvalidJob(m) => AppError::InvalidJob(m.clone()),
        AppError::DatabaseError(m) => AppError::DatabaseError(m.clone()),
        AppError::SerializationError(e) => AppError::Generic(e.to_string()),
        AppError::Generic(m) => AppError::Generic(m.clone()),
    }
}

// --- sources ---

#[derive(Clone, Default)]
pub struct MockAuthedSource {
    listing: Option<Listing>,
    comments: Vec<RawComment>,
    error: Option<Arc<AppError>>,
    window_calls: Arc<Mutex<Vec<(String, i64, i64, u32)>>>,
}

impl MockAuthedSource {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_listing(listing: Listing) -> Self {
        Self {
            listing: Some(listing),
            ..Self::default()
        }
    }

    pub fn with_comments(comments: Vec<RawComment>) -> Self {
        Self {
            comments,
            ..Self::default()
        }
    }

    pub fn failing(error: AppError) -> Self {
        Self {
            error: Some(Arc::new(error)),
            ..Self::default()
        }
    }

    /// Also serve these comments for every post.
    pub fn and_comments(mut self, comments: Vec<RawComment>) -> Self {
        self.comments = comments;
        self
    }

    /// `(subreddit, after, before, limit)` tuples seen by
    /// `fetch_posts_by_window`, in call order.
    pub fn window_calls(&self) -> Vec<(String, i64, i64, u32)> {
        self.window_calls.lock().unwrap().clone()
    }
}

impl AuthedSource for MockAuthedSource {
    async fn fetch_new_posts(
        &self,
        _subreddit: &str,
        _after: Option<&str>,
    ) -> Result<Listing, AppError> {
        if let Some(e) = &self.error {
            return Err(clone_err(e));
        }
        Ok(self.listing.clone().unwrap_or_default())
    }

    async fn fetch_posts_by_window(
        &self,
        subreddit: &str,
        after: i64,
        before: i64,
        limit: u32,
    ) -> Result<Listing, AppError> {
        self.window_calls
            .lock()
            .unwrap()
            .push((subreddit.to_string(), after, before, limit));
        if let Some(e) = &self.error {
            return Err(clone_err(e));
        }
        Ok(self.listing.clone().unwrap_or_default())
    }

    async fn fetch_top_comments(
        &self,
        _subreddit: &str,
        _post_id: &str,
        limit: u32,
    ) -> Result<Vec<RawComment>, AppError> {
        if let Some(e) = &self.error {
            return Err(clone_err(e));
        }
        Ok(self.comments.iter().take(limit as usize).cloned().collect())
    }
}

#[derive(Clone, Default)]
pub struct MockAnonSource {
    catalog: Vec<CatalogPage>,
    thread: Option<ThreadSnapshot>,
    error: Option<Arc<AppError>>,
}

impl MockAnonSource {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_catalog(thread_nos: Vec<u64>) -> Self {
        Self {
            catalog: vec![CatalogPage {
                threads: thread_nos.into_iter().map(|no| CatalogEntry { no }).collect(),
            }],
            ..Self::default()
        }
    }

    pub fn with_thread(posts: Vec<RawBoardPost>) -> Self {
        Self {
            thread: Some(ThreadSnapshot { posts }),
            ..Self::default()
        }
    }

    pub fn failing(error: AppError) -> Self {
        Self {
            error: Some(Arc::new(error)),
            ..Self::default()
        }
    }
}

impl AnonSource for MockAnonSource {
    async fn get_thread(&self, _board: &str, _thread_no: u64) -> Result<ThreadSnapshot, AppError> {
        if let Some(e) = &self.error {
            return Err(clone_err(e));
        }
        Ok(self.thread.clone().unwrap_or_default())
    }

    async fn get_catalog(&self, _board: &str) -> Result<Vec<CatalogPage>, AppError> {
        if let Some(e) = &self.error {
            return Err(clone_err(e));
        }
        Ok(self.catalog.clone())
    }
}

// --- store ---

#[derive(Clone, Default)]
pub struct MockContentStore {
    posts: Arc<Mutex<Vec<Post>>>,
    comments: Arc<Mutex<Vec<Comment>>>,
    board_posts: Arc<Mutex<Vec<BoardPost>>>,
    error: Option<Arc<AppError>>,
}

impl MockContentStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_upsert_error(error: AppError) -> Self {
        Self {
            error: Some(Arc::new(error)),
            ..Self::default()
        }
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.lock().unwrap().clone()
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.comments.lock().unwrap().clone()
    }

    pub fn board_posts(&self) -> Vec<BoardPost> {
        self.board_posts.lock().unwrap().clone()
    }
}

impl ContentStore for MockContentStore {
    async fn upsert_post(&self, post: &Post) -> Result<(), AppError> {
        if let Some(e) = &self.error {
            return Err(clone_err(e));
        }
        self.posts.lock().unwrap().push(post.clone());
        Ok(())
    }

    async fn upsert_comment(&self, comment: &Comment) -> Result<(), AppError> {
        if let Some(e) = &self.error {
            return Err(clone_err(e));
        }
        self.comments.lock().unwrap().push(comment.clone());
        Ok(())
    }

    async fn upsert_board_post(&self, post: &BoardPost) -> Result<(), AppError> {
        if let Some(e) = &self.error {
            return Err(clone_err(e));
        }
        self.board_posts.lock().unwrap().push(post.clone());
        Ok(())
    }
}

// --- queue ---

fn crawl_job_from_request(request: &NewCrawlJob) -> CrawlJob {
    let now = Utc::now();
    CrawlJob {
        id: Uuid::new_v4(),
        job_type: request.job_type,
        args: request.args.clone(),
        queue: request.queue.clone(),
        status: JobStatus::Pending,
        created_at: now,
        updated_at: now,
        started_at: None,
        completed_at: None,
        retry_count: 0,
        max_retries: request.max_retries.unwrap_or(3),
        run_at: request.run_at,
        error_message: None,
        worker_id: None,
    }
}

#[derive(Clone, Default)]
pub struct MockJobQueue {
    enqueued: Arc<Mutex<Vec<NewCrawlJob>>>,
    completed: Arc<Mutex<Vec<Uuid>>>,
    failed: Arc<Mutex<Vec<(Uuid, String, Option<DateTime<Utc>>)>>>,
    released: Arc<Mutex<Vec<String>>>,
    reject: Option<(JobType, Arc<AppError>)>,
}

impl MockJobQueue {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Accept every enqueue except for the given job type.
    pub fn rejecting(job_type: JobType, error: AppError) -> Self {
        Self {
            reject: Some((job_type, Arc::new(error))),
            ..Self::default()
        }
    }

    pub fn enqueued(&self) -> Vec<NewCrawlJob> {
        self.enqueued.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<Uuid> {
        self.completed.lock().unwrap().clone()
    }

    pub fn failed(&self) -> Vec<(Uuid, String, Option<DateTime<Utc>>)> {
        self.failed.lock().unwrap().clone()
    }

    pub fn released_workers(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

impl JobQueue for MockJobQueue {
    async fn enqueue(&self, request: NewCrawlJob) -> Result<CrawlJob, AppError> {
        if let Some((job_type, error)) = &self.reject
            && *job_type == request.job_type
        {
            return Err(clone_err(error));
        }
        let job = crawl_job_from_request(&request);
        self.enqueued.lock().unwrap().push(request);
        Ok(job)
    }

    async fn claim(
        &self,
        _queues: &[String],
        _worker_id: &str,
    ) -> Result<Option<CrawlJob>, AppError> {
        Ok(None)
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), AppError> {
        self.completed.lock().unwrap().push(job_id);
        Ok(())
    }

    async fn fail(
        &self,
        job_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        self.failed
            .lock()
            .unwrap()
            .push((job_id, error.to_string(), next_retry_at));
        Ok(())
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        self.released.lock().unwrap().push(worker_id.to_string());
        Ok(0)
    }

    async fn count_by_status(&self, _status: JobStatus) -> Result<i64, AppError> {
        Ok(self.enqueued.lock().unwrap().len() as i64)
    }
}

// --- enrichment ---

#[derive(Clone)]
pub struct MockEnricher {
    sentiment: Option<f64>,
    is_toxic: bool,
}

impl MockEnricher {
    pub fn fixed(sentiment: Option<f64>, is_toxic: bool) -> Self {
        Self {
            sentiment,
            is_toxic,
        }
    }
}

impl Enricher for MockEnricher {
    async fn enrich(&self, _text: &str) -> Enrichment {
        Enrichment {
            sentiment: self.sentiment,
            is_toxic: self.is_toxic,
        }
    }
}

#[derive(Clone)]
pub struct MockToxicity {
    class: &'static str,
    confidence: f64,
    error: Option<Arc<AppError>>,
    calls: Arc<Mutex<usize>>,
}

impl MockToxicity {
    pub fn flagging(confidence: f64) -> Self {
        Self {
            class: "flag",
            confidence,
            error: None,
            calls: Arc::default(),
        }
    }

    pub fn normal(confidence: f64) -> Self {
        Self {
            class: "normal",
            confidence,
            error: None,
            calls: Arc::default(),
        }
    }

    pub fn failing(error: AppError) -> Self {
        Self {
            class: "flag",
            confidence: 0.0,
            error: Some(Arc::new(error)),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl ToxicityClassifier for MockToxicity {
    async fn classify(&self, _text: &str) -> Result<Moderation, AppError> {
        *self.calls.lock().unwrap() += 1;
        if let Some(e) = &self.error {
            return Err(clone_err(e));
        }
        Ok(Moderation {
            class: self.class.to_string(),
            confidence: self.confidence,
        })
    }
}

#[derive(Clone, Copy)]
pub struct MockScorer {
    value: f64,
}

impl MockScorer {
    pub fn fixed(value: f64) -> Self {
        Self { value }
    }
}

impl SentimentScorer for MockScorer {
    fn score(&self, _text: &str) -> Option<f64> {
        Some(self.value)
    }
}

// --- worker ---

/// Records the variant name of every event it sees.
#[derive(Clone, Default)]
pub struct MockReporter {
    labels: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().unwrap().clone()
    }
}

impl WorkerReporter for MockReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        let label = match event {
            WorkerEvent::Started { .. } => "Started",
            WorkerEvent::Polling => "Polling",
            WorkerEvent::JobClaimed { .. } => "JobClaimed",
            WorkerEvent::JobStarted { .. } => "JobStarted",
            WorkerEvent::JobCompleted { .. } => "JobCompleted",
            WorkerEvent::JobFailed { .. } => "JobFailed",
            WorkerEvent::ShuttingDown { .. } => "ShuttingDown",
            WorkerEvent::Stopped { .. } => "Stopped",
        };
        self.labels.lock().unwrap().push(label.to_string());
    }
}

// --- fixtures ---

const TEST_EPOCH: f64 = 1_733_011_200.0;

/// A listing with one post per id, all with valid timestamps.
pub fn make_listing(ids: &[&str], after: Option<&str>) -> Listing {
    Listing {
        after: after.map(str::to_string),
        posts: ids
            .iter()
            .map(|id| RawPost {
                id: (*id).to_string(),
                title: format!("title {id}"),
                author: Some("alice".to_string()),
                created_utc: TEST_EPOCH,
                selftext: format!("body of {id}"),
                num_comments: 2,
                score: 10,
                url: format!("https://example.com/{id}"),
            })
            .collect(),
    }
}

pub fn make_comment(id: &str, body: &str) -> RawComment {
    RawComment {
        id: id.to_string(),
        author: Some("bob".to_string()),
        created_utc: TEST_EPOCH,
        body: body.to_string(),
        score: 3,
    }
}

/// Board post with no name set, so fallbacks are exercised.
pub fn make_board_post(no: u64, com: &str) -> RawBoardPost {
    RawBoardPost {
        no,
        time: TEST_EPOCH,
        name: None,
        com: com.to_string(),
        replies: 0,
        images: 0,
    }
}

/// A claimed job in `running` state, as the worker would see it.
pub fn make_test_job(job_type: JobType, args: Value) -> CrawlJob {
    let now = Utc::now();
    CrawlJob {
        id: Uuid::new_v4(),
        job_type,
        args,
        queue: job_type.queue().to_string(),
        status: JobStatus::Running,
        created_at: now,
        updated_at: now,
        started_at: Some(now),
        completed_at: None,
        retry_count: 0,
        max_retries: 3,
        run_at: None,
        error_message: None,
        worker_id: Some("test-worker".to_string()),
    }
}
