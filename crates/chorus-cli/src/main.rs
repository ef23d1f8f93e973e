use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use chorus_client::{ChanClient, CredentialPool, HateSpeechClient, LexiconScorer, RedditClient};
use chorus_core::backfill::{BackfillConfig, BackfillService};
use chorus_core::crawler::CrawlerService;
use chorus_core::enrich::EnrichmentService;
use chorus_core::job::{JobPayload, JobStatus, NewCrawlJob, WorkerConfig};
use chorus_core::job_queue::JobQueue;
use chorus_core::worker::{TracingWorkerReporter, WorkerService};
use chorus_db::{Database, DatabaseConfig};

type Enricher = EnrichmentService<HateSpeechClient, LexiconScorer>;

#[derive(Parser)]
#[command(name = "chorus", version, about = "Discussion crawl and enrichment pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run crawl workers until interrupted
    Worker {
        /// Queues to consume (defaults to all four crawl queues)
        #[arg(short, long, value_delimiter = ',')]
        queues: Option<Vec<String>>,

        /// Number of concurrent worker tasks
        #[arg(short, long, default_value_t = 5)]
        concurrency: usize,
    },

    /// Enqueue the recurring poll for a subreddit
    SeedSubreddit {
        /// Subreddit name, without the r/ prefix
        name: String,
    },

    /// Enqueue the recurring catalog poll for a board
    SeedBoard {
        /// Board name, e.g. "g"
        name: String,
    },

    /// Walk a subreddit's history day by day, ingesting inline
    Backfill {
        /// Subreddit name, without the r/ prefix
        subreddit: String,

        /// First day of the range (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last day of the range, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,

        /// Maximum posts fetched per day
        #[arg(long, default_value_t = 100)]
        daily_limit: u32,

        /// Seconds to sleep between full passes over the range
        #[arg(long, default_value_t = 600)]
        sleep: u64,
    },

    /// Show queue and content counters
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("chorus=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Worker {
            queues,
            concurrency,
        } => cmd_worker(queues, concurrency).await,
        Commands::SeedSubreddit { name } => {
            cmd_seed(JobPayload::PollSubreddit {
                subreddit: name,
                after: None,
            })
            .await
        }
        Commands::SeedBoard { name } => {
            cmd_seed(JobPayload::PollCatalog {
                board: name,
                previous: None,
            })
            .await
        }
        Commands::Backfill {
            subreddit,
            start,
            end,
            daily_limit,
            sleep,
        } => cmd_backfill(&subreddit, start, end, daily_limit, sleep).await,
        Commands::Status => cmd_status().await,
    }
}

/// Connect to PostgreSQL and run migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    Database::open(&config)
        .await
        .context("Failed to open database")
}

fn build_enricher() -> Result<Enricher> {
    let classifier = HateSpeechClient::from_env().map_err(|e| anyhow::anyhow!(e))?;
    Ok(EnrichmentService::new(classifier, LexiconScorer::new()))
}

fn build_reddit_client() -> Result<RedditClient> {
    let pool = CredentialPool::from_env().map_err(|e| anyhow::anyhow!(e))?;
    RedditClient::new(pool).map_err(|e| anyhow::anyhow!(e))
}

/// Cancel the returned token on the first Ctrl+C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            trigger.cancel();
        }
    });
    token
}

async fn cmd_worker(queues: Option<Vec<String>>, concurrency: usize) -> Result<()> {
    let db = connect_db().await?;
    let queue = db.jobs();
    let store = db.content();

    let reddit = build_reddit_client()?;
    let chan = ChanClient::new().map_err(|e| anyhow::anyhow!(e))?;
    let enricher = build_enricher()?;

    let token = shutdown_token();
    let mut tasks = tokio::task::JoinSet::new();

    for _ in 0..concurrency.max(1) {
        let mut config = WorkerConfig::default();
        if let Some(queues) = &queues {
            config = config.with_queues(queues.clone());
        }

        let crawler = CrawlerService::new(
            reddit.clone(),
            chan.clone(),
            enricher.clone(),
            store.clone(),
            queue.clone(),
        );
        let worker = WorkerService::new(queue.clone(), crawler, config);
        let cancel = token.clone();

        tasks.spawn(async move { worker.run(cancel, &TracingWorkerReporter).await });
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result.context("Worker task panicked")? {
            tracing::error!(error = %e, "Worker exited with error");
        }
    }

    Ok(())
}

async fn cmd_seed(payload: JobPayload) -> Result<()> {
    let db = connect_db().await?;
    let job = db
        .jobs()
        .enqueue(NewCrawlJob::new(&payload))
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    println!("Enqueued {} job {} on queue {}", job.job_type, job.id, job.queue);
    Ok(())
}

async fn cmd_backfill(
    subreddit: &str,
    start: NaiveDate,
    end: NaiveDate,
    daily_limit: u32,
    sleep: u64,
) -> Result<()> {
    anyhow::ensure!(start <= end, "--start must not be after --end");

    let db = connect_db().await?;
    let reddit = build_reddit_client()?;
    let enricher = build_enricher()?;

    let config = BackfillConfig::new(start, end)
        .with_daily_limit(daily_limit)
        .with_pass_delay(Duration::from_secs(sleep));

    let service = BackfillService::new(reddit, enricher, db.content(), config);
    service.run(subreddit, shutdown_token()).await;
    Ok(())
}

async fn cmd_status() -> Result<()> {
    let db = connect_db().await?;
    let queue = db.jobs();

    println!("Jobs:");
    for status in [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
    ] {
        let count = queue
            .count_by_status(status)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        println!("  {:<10} {}", status, count);
    }

    let (posts, comments, board_posts) = db
        .content()
        .content_counts()
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    println!("Content:");
    println!("  {:<10} {}", "posts", posts);
    println!("  {:<10} {}", "comments", comments);
    println!("  {:<10} {}", "boards", board_posts);

    Ok(())
}
