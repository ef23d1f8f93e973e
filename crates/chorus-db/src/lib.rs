pub mod config;
pub mod content_repository;
pub mod database;
pub mod job_repository;

pub use config::DatabaseConfig;
pub use content_repository::ContentRepository;
pub use database::Database;
pub use job_repository::CrawlJobRepository;
