use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::AppError;

/// Delay before a recurring poll re-runs, and before a poll retries
/// after a fetch failure.
pub const POLL_DELAY: TimeDelta = TimeDelta::minutes(5);

/// Status of a crawl job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// The closed set of crawl job types. Each type has a fixed queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    PollSubreddit,
    FetchPostComments,
    PollCatalog,
    FetchThread,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::PollSubreddit => "crawl-subreddit",
            JobType::FetchPostComments => "crawl-reddit-comments",
            JobType::PollCatalog => "crawl-catalog",
            JobType::FetchThread => "crawl-thread",
        }
    }

    /// Queue the job type is enqueued to and consumed from.
    pub fn queue(&self) -> &'static str {
        // One queue per job type, same name as the type tag.
        self.as_str()
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crawl-subreddit" => Ok(JobType::PollSubreddit),
            "crawl-reddit-comments" => Ok(JobType::FetchPostComments),
            "crawl-catalog" => Ok(JobType::PollCatalog),
            "crawl-thread" => Ok(JobType::FetchThread),
            _ => Err(format!("Unknown job type: {}", s)),
        }
    }
}

/// Typed view of a job's ordered argument tuple.
///
/// Jobs carry their arguments as a JSON array (position-significant,
/// `null` for absent options) so the queue stays schema-free; this enum
/// is the single place where tuples are encoded and decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPayload {
    PollSubreddit {
        subreddit: String,
        after: Option<String>,
    },
    FetchPostComments {
        subreddit: String,
        post_id: String,
    },
    PollCatalog {
        board: String,
        /// Thread ids seen on the previous catalog poll. `None` on cold start.
        previous: Option<Vec<u64>>,
    },
    FetchThread {
        board: String,
        thread_no: u64,
    },
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::PollSubreddit { .. } => JobType::PollSubreddit,
            JobPayload::FetchPostComments { .. } => JobType::FetchPostComments,
            JobPayload::PollCatalog { .. } => JobType::PollCatalog,
            JobPayload::FetchThread { .. } => JobType::FetchThread,
        }
    }

    pub fn to_args(&self) -> Value {
        match self {
            JobPayload::PollSubreddit { subreddit, after } => json!([subreddit, after]),
            JobPayload::FetchPostComments { subreddit, post_id } => json!([subreddit, post_id]),
            JobPayload::PollCatalog { board, previous } => json!([board, previous]),
            JobPayload::FetchThread { board, thread_no } => json!([board, thread_no]),
        }
    }

    /// Decode an argument tuple for the given job type.
    pub fn from_args(job_type: JobType, args: &Value) -> Result<Self, AppError> {
        let tuple = args
            .as_array()
            .ok_or_else(|| AppError::InvalidJob(format!("{job_type}: args must be an array")))?;

        let str_arg = |i: usize| -> Result<String, AppError> {
            tuple
                .get(i)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    AppError::InvalidJob(format!("{job_type}: missing string arg {i}"))
                })
        };

        match job_type {
            JobType::PollSubreddit => Ok(JobPayload::PollSubreddit {
                subreddit: str_arg(0)?,
                after: tuple.get(1).and_then(Value::as_str).map(str::to_string),
            }),
            JobType::FetchPostComments => Ok(JobPayload::FetchPostComments {
                subreddit: str_arg(0)?,
                post_id: str_arg(1)?,
            }),
            JobType::PollCatalog => {
                let previous = match tuple.get(1) {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(
                        serde_json::from_value::<Vec<u64>>(v.clone()).map_err(|e| {
                            AppError::InvalidJob(format!("crawl-catalog: bad frontier: {e}"))
                        })?,
                    ),
                };
                Ok(JobPayload::PollCatalog {
                    board: str_arg(0)?,
                    previous,
                })
            }
            JobType::FetchThread => Ok(JobPayload::FetchThread {
                board: str_arg(0)?,
                thread_no: tuple.get(1).and_then(Value::as_u64).ok_or_else(|| {
                    AppError::InvalidJob("crawl-thread: missing thread number".into())
                })?,
            }),
        }
    }
}

/// Broker-level retry with exponential backoff.
///
/// Delay schedule: 1min, 5min, 30min, 60min (capped). Applies to jobs
/// that fail by returning an error; handlers that detect a recoverable
/// domain failure schedule their own delayed retry copy instead.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub max_delay: TimeDelta,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_delay: TimeDelta::minutes(60),
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> TimeDelta {
        let delay = match attempt {
            0 | 1 => TimeDelta::minutes(1),
            2 => TimeDelta::minutes(5),
            3 => TimeDelta::minutes(30),
            _ => TimeDelta::minutes(60),
        };
        std::cmp::min(delay, self.max_delay)
    }
}

/// A crawl job in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub id: Uuid,
    pub job_type: JobType,
    /// Ordered argument tuple, see [`JobPayload`].
    pub args: Value,
    pub queue: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Earliest delivery time. The broker must not deliver before it.
    pub run_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
}

impl CrawlJob {
    pub fn payload(&self) -> Result<JobPayload, AppError> {
        JobPayload::from_args(self.job_type, &self.args)
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn calculate_next_retry(&self, config: &RetryConfig) -> DateTime<Utc> {
        let delay = config.delay_for_attempt(self.retry_count + 1);
        Utc::now() + delay
    }
}

/// Request to enqueue a new crawl job.
#[derive(Debug, Clone)]
pub struct NewCrawlJob {
    pub job_type: JobType,
    pub args: Value,
    pub queue: String,
    pub max_retries: Option<u32>,
    pub run_at: Option<DateTime<Utc>>,
}

impl NewCrawlJob {
    pub fn new(payload: &JobPayload) -> Self {
        let job_type = payload.job_type();
        Self {
            job_type,
            args: payload.to_args(),
            queue: job_type.queue().to_string(),
            max_retries: None,
            run_at: None,
        }
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    /// Delay delivery by the given interval from now.
    pub fn delayed_by(mut self, delay: TimeDelta) -> Self {
        self.run_at = Some(Utc::now() + delay);
        self
    }
}

/// Configuration for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    /// Queues this worker consumes, in claim-priority order.
    pub queues: Vec<String>,
    pub poll_interval: Duration,
    pub retry_config: RetryConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            queues: vec![
                JobType::PollSubreddit.queue().to_string(),
                JobType::FetchPostComments.queue().to_string(),
                JobType::PollCatalog.queue().to_string(),
                JobType::FetchThread.queue().to_string(),
            ],
            poll_interval: Duration::from_secs(5),
            retry_config: RetryConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_queues(mut self, queues: Vec<String>) -> Self {
        self.queues = queues;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            let s = status.as_str();
            let parsed: JobStatus = s.parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_job_type_queue_mapping() {
        assert_eq!(JobType::PollSubreddit.queue(), "crawl-subreddit");
        assert_eq!(JobType::FetchPostComments.queue(), "crawl-reddit-comments");
        assert_eq!(JobType::PollCatalog.queue(), "crawl-catalog");
        assert_eq!(JobType::FetchThread.queue(), "crawl-thread");
    }

    #[test]
    fn test_payload_roundtrip() {
        let payloads = [
            JobPayload::PollSubreddit {
                subreddit: "rust".into(),
                after: Some("t3_abc".into()),
            },
            JobPayload::PollSubreddit {
                subreddit: "rust".into(),
                after: None,
            },
            JobPayload::FetchPostComments {
                subreddit: "rust".into(),
                post_id: "1hxyz".into(),
            },
            JobPayload::PollCatalog {
                board: "g".into(),
                previous: Some(vec![101, 102]),
            },
            JobPayload::PollCatalog {
                board: "g".into(),
                previous: None,
            },
            JobPayload::FetchThread {
                board: "g".into(),
                thread_no: 12345,
            },
        ];
        for payload in payloads {
            let args = payload.to_args();
            let decoded = JobPayload::from_args(payload.job_type(), &args).unwrap();
            assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn test_payload_rejects_malformed_args() {
        let err = JobPayload::from_args(JobType::FetchThread, &json!(["g"])).unwrap_err();
        assert!(matches!(err, AppError::InvalidJob(_)));

        let err = JobPayload::from_args(JobType::PollSubreddit, &json!("not-an-array"))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidJob(_)));
    }

    #[test]
    fn test_retry_delay_schedule() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(1), TimeDelta::minutes(1));
        assert_eq!(config.delay_for_attempt(2), TimeDelta::minutes(5));
        assert_eq!(config.delay_for_attempt(3), TimeDelta::minutes(30));
        assert_eq!(config.delay_for_attempt(4), TimeDelta::minutes(60));
    }

    #[test]
    fn test_new_job_defaults_to_type_queue() {
        let req = NewCrawlJob::new(&JobPayload::FetchThread {
            board: "g".into(),
            thread_no: 7,
        });
        assert_eq!(req.queue, "crawl-thread");
        assert!(req.run_at.is_none());

        let delayed = req.delayed_by(POLL_DELAY);
        let run_at = delayed.run_at.unwrap();
        assert!(run_at > Utc::now() + TimeDelta::minutes(4));
        assert!(run_at <= Utc::now() + TimeDelta::minutes(5));
    }
}
