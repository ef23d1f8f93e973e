use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{CrawlJob, JobStatus, NewCrawlJob};

/// Persistent job queue for crawl jobs.
///
/// Delivery is at-least-once: implementations must support atomic
/// claiming via `SELECT FOR UPDATE SKIP LOCKED` or equivalent so two
/// workers never claim the same job, but handlers must still be
/// idempotent. Jobs with a `run_at` timestamp must not be delivered
/// before it.
pub trait JobQueue: Send + Sync + Clone {
    fn enqueue(
        &self,
        request: NewCrawlJob,
    ) -> impl Future<Output = Result<CrawlJob, AppError>> + Send;

    /// Atomically claim the next runnable job from any of the given queues.
    ///
    /// Returns `None` if no jobs are available.
    fn claim(
        &self,
        queues: &[String],
        worker_id: &str,
    ) -> impl Future<Output = Result<Option<CrawlJob>, AppError>> + Send;

    fn complete(&self, job_id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Mark a job as failed. If `next_retry_at` is provided, the job is
    /// reset to `pending` for retry; otherwise it is permanently `failed`.
    fn fail(
        &self,
        job_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Release all jobs held by a specific worker (for graceful shutdown).
    fn release_worker_jobs(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn count_by_status(
        &self,
        status: JobStatus,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;
}
