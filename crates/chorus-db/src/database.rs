use chorus_core::AppError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::DatabaseConfig;
use crate::content_repository::ContentRepository;
use crate::job_repository::CrawlJobRepository;

/// Shared handle on the Postgres pool backing both the job queue and
/// the content store. The two repositories it vends are cheap clones
/// over the same pool, so workers, the backfill loop, and the CLI all
/// see one connection budget.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect and bring the schema up to date. This is the normal
    /// entry point: every `chorus` subcommand migrates on startup so a
    /// fresh database needs no separate setup step.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, AppError> {
        let db = Self::connect(config).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Connect without touching the schema.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {e}")))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool (useful for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The crawl job queue.
    pub fn jobs(&self) -> CrawlJobRepository {
        CrawlJobRepository::new(self.pool.clone())
    }

    /// The enriched content store.
    pub fn content(&self) -> ContentRepository {
        ContentRepository::new(self.pool.clone())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
