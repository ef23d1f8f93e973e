//! Worker loop: claims crawl jobs and dispatches them by type.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::crawler::CrawlerService;
use crate::enrich::Enricher;
use crate::error::AppError;
use crate::job::{CrawlJob, JobPayload, JobType, WorkerConfig};
use crate::job_queue::JobQueue;
use crate::record::ContentStore;
use crate::source::{AnonSource, AuthedSource};

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    Polling,
    JobClaimed {
        job: &'a CrawlJob,
    },
    JobStarted {
        job_id: Uuid,
        job_type: JobType,
    },
    JobCompleted {
        job_id: Uuid,
        job_type: JobType,
    },
    JobFailed {
        job_id: Uuid,
        error: &'a str,
        will_retry: bool,
    },
    ShuttingDown {
        worker_id: &'a str,
        jobs_released: u64,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::Polling => {
                tracing::debug!("Polling for jobs");
            }
            WorkerEvent::JobClaimed { job } => {
                tracing::info!(job_id = %job.id, job_type = %job.job_type, args = %job.args, "Job claimed");
            }
            WorkerEvent::JobStarted { job_id, job_type } => {
                tracing::info!(%job_id, %job_type, "Processing job");
            }
            WorkerEvent::JobCompleted { job_id, job_type } => {
                tracing::info!(%job_id, %job_type, "Job completed");
            }
            WorkerEvent::JobFailed {
                job_id,
                error,
                will_retry,
            } => {
                tracing::warn!(%job_id, %error, %will_retry, "Job failed");
            }
            WorkerEvent::ShuttingDown {
                worker_id,
                jobs_released,
            } => {
                tracing::info!(%worker_id, %jobs_released, "Worker shutting down");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// Worker that polls the job queue and dispatches crawl jobs.
///
/// One instance per worker task; the CLI spawns several sharing clones
/// of the same queue and crawler collaborators.
pub struct WorkerService<A, N, E, S, Q>
where
    A: AuthedSource,
    N: AnonSource,
    E: Enricher,
    S: ContentStore,
    Q: JobQueue,
{
    queue: Q,
    crawler: CrawlerService<A, N, E, S, Q>,
    config: WorkerConfig,
}

impl<A, N, E, S, Q> WorkerService<A, N, E, S, Q>
where
    A: AuthedSource,
    N: AnonSource,
    E: Enricher,
    S: ContentStore,
    Q: JobQueue,
{
    pub fn new(queue: Q, crawler: CrawlerService<A, N, E, S, Q>, config: WorkerConfig) -> Self {
        Self {
            queue,
            crawler,
            config,
        }
    }

    /// Run the worker loop until cancellation.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            reporter.report(WorkerEvent::Polling);

            match self
                .queue
                .claim(&self.config.queues, &self.config.worker_id)
                .await
            {
                Ok(Some(job)) => {
                    reporter.report(WorkerEvent::JobClaimed { job: &job });
                    self.process_job(&job, reporter).await;
                }
                Ok(None) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim job");
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval * 2) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
            }
        }

        // Graceful shutdown: release all claimed jobs.
        let released = self
            .queue
            .release_worker_jobs(&self.config.worker_id)
            .await
            .unwrap_or(0);

        reporter.report(WorkerEvent::ShuttingDown {
            worker_id: &self.config.worker_id,
            jobs_released: released,
        });
        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });

        Ok(())
    }

    async fn process_job<WR: WorkerReporter>(&self, job: &CrawlJob, reporter: &WR) {
        reporter.report(WorkerEvent::JobStarted {
            job_id: job.id,
            job_type: job.job_type,
        });

        // A payload that does not decode can never succeed; fail it
        // permanently without touching the retry budget.
        let payload = match job.payload() {
            Ok(p) => p,
            Err(e) => {
                let error_msg = e.to_string();
                reporter.report(WorkerEvent::JobFailed {
                    job_id: job.id,
                    error: &error_msg,
                    will_retry: false,
                });
                if let Err(e) = self.queue.fail(job.id, &error_msg, None).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as failed");
                }
                return;
            }
        };

        let result = match &payload {
            JobPayload::PollSubreddit { subreddit, after } => {
                self.crawler
                    .poll_subreddit(subreddit, after.as_deref())
                    .await
            }
            JobPayload::FetchPostComments { subreddit, post_id } => {
                self.crawler.fetch_post_comments(subreddit, post_id).await
            }
            JobPayload::PollCatalog { board, previous } => {
                self.crawler.poll_catalog(board, previous.as_deref()).await
            }
            JobPayload::FetchThread { board, thread_no } => {
                self.crawler.fetch_thread(board, *thread_no).await
            }
        };

        match result {
            Ok(()) => {
                reporter.report(WorkerEvent::JobCompleted {
                    job_id: job.id,
                    job_type: job.job_type,
                });
                if let Err(e) = self.queue.complete(job.id).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job completed");
                }
            }
            Err(e) => {
                let error_msg = e.to_string();
                let can_retry = job.can_retry() && e.is_retryable();
                reporter.report(WorkerEvent::JobFailed {
                    job_id: job.id,
                    error: &error_msg,
                    will_retry: can_retry,
                });

                let next_retry = if can_retry {
                    Some(job.calculate_next_retry(&self.config.retry_config))
                } else {
                    None
                };

                if let Err(e) = self.queue.fail(job.id, &error_msg, next_retry).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as failed");
                }
            }
        }
    }
}
