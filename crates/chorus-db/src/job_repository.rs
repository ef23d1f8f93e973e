use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use chorus_core::error::AppError;
use chorus_core::job::{CrawlJob, JobStatus, NewCrawlJob};
use chorus_core::job_queue::JobQueue;

/// PostgreSQL-backed job queue using `SELECT FOR UPDATE SKIP LOCKED`.
#[derive(Clone)]
pub struct CrawlJobRepository {
    pool: Pool<Postgres>,
}

impl CrawlJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct CrawlJobRow {
    id: Uuid,
    job_type: String,
    args: serde_json::Value,
    queue: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    retry_count: i32,
    max_retries: i32,
    run_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    worker_id: Option<String>,
}

impl TryFrom<CrawlJobRow> for CrawlJob {
    type Error = AppError;

    fn try_from(row: CrawlJobRow) -> Result<Self, AppError> {
        // A row with an unknown type tag is unprocessable; surface it
        // instead of guessing.
        let job_type = row
            .job_type
            .parse()
            .map_err(|e: String| AppError::InvalidJob(e))?;

        Ok(CrawlJob {
            id: row.id,
            job_type,
            args: row.args,
            queue: row.queue,
            status: row.status.parse().unwrap_or(JobStatus::Pending),
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            retry_count: row.retry_count as u32,
            max_retries: row.max_retries as u32,
            run_at: row.run_at,
            error_message: row.error_message,
            worker_id: row.worker_id,
        })
    }
}

impl JobQueue for CrawlJobRepository {
    async fn enqueue(&self, request: NewCrawlJob) -> Result<CrawlJob, AppError> {
        let row = sqlx::query_as::<_, CrawlJobRow>(
            r#"
            INSERT INTO crawl_jobs (job_type, args, queue, max_retries, run_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(request.job_type.as_str())
        .bind(&request.args)
        .bind(&request.queue)
        .bind(request.max_retries.unwrap_or(3) as i32)
        .bind(request.run_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        row.try_into()
    }

    async fn claim(&self, queues: &[String], worker_id: &str) -> Result<Option<CrawlJob>, AppError> {
        let row = sqlx::query_as::<_, CrawlJobRow>(
            r#"
            UPDATE crawl_jobs
            SET status = 'running', worker_id = $2, started_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM crawl_jobs
                WHERE status = 'pending'
                  AND queue = ANY($1)
                  AND (run_at IS NULL OR run_at <= NOW())
                ORDER BY run_at NULLS FIRST, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(queues)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        row.map(TryInto::try_into).transpose()
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET status = 'completed', completed_at = NOW(), updated_at = NOW(),
                error_message = NULL, worker_id = NULL
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn fail(
        &self,
        job_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        // If next_retry_at is set, reset to pending for retry.
        // Otherwise mark as permanently failed.
        sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET
                status = CASE WHEN $3::timestamptz IS NOT NULL THEN 'pending' ELSE 'failed' END,
                retry_count = CASE WHEN $3::timestamptz IS NOT NULL THEN retry_count + 1 ELSE retry_count END,
                run_at = $3,
                error_message = $2,
                updated_at = NOW(),
                worker_id = NULL,
                started_at = CASE WHEN $3::timestamptz IS NOT NULL THEN NULL ELSE started_at END
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .bind(next_retry_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET status = 'pending', worker_id = NULL, started_at = NULL, updated_at = NOW()
            WHERE worker_id = $1 AND status = 'running'
            "#,
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM crawl_jobs WHERE status = $1"#)
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(count)
    }
}
