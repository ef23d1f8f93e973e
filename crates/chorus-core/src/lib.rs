pub mod backfill;
pub mod crawler;
pub mod enrich;
pub mod error;
pub mod frontier;
pub mod job;
pub mod job_queue;
pub mod parse;
pub mod record;
pub mod source;
pub mod worker;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::AppError;
pub use job::{CrawlJob, JobPayload, JobStatus, JobType, NewCrawlJob, POLL_DELAY, WorkerConfig};
pub use job_queue::JobQueue;
pub use record::{BoardPost, Comment, ContentStore, Post};
pub use source::{AnonSource, AuthedSource};
