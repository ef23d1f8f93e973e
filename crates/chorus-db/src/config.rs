use std::time::Duration;

use chorus_core::AppError;

/// Connection settings for the Postgres store and job queue.
///
/// The pool is shared by every worker task in the process, so
/// `max_connections` should be at least the worker concurrency; the
/// default of 5 matches the default worker count. Claim queries block
/// on a free connection for at most `acquire_timeout` before the
/// worker treats the poll as failed and backs off.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

impl DatabaseConfig {
    /// Read configuration from environment variables.
    ///
    /// - `DATABASE_URL` (required)
    /// - `DATABASE_MAX_CONNECTIONS` (optional, defaults to 5)
    /// - `DATABASE_ACQUIRE_TIMEOUT_SECS` (optional, defaults to 5)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let url = get("DATABASE_URL").ok_or_else(|| {
            AppError::ConfigError(
                "DATABASE_URL not set. Required for the job queue and content store.".into(),
            )
        })?;

        let max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(raw) => parse_positive("DATABASE_MAX_CONNECTIONS", &raw)?,
        };

        let acquire_timeout = match get("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            None => DEFAULT_ACQUIRE_TIMEOUT,
            Some(raw) => {
                Duration::from_secs(parse_positive("DATABASE_ACQUIRE_TIMEOUT_SECS", &raw)? as u64)
            }
        };

        Ok(Self {
            url,
            max_connections,
            acquire_timeout,
        })
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<u32, AppError> {
    let parsed: u32 = raw.parse().map_err(|_| {
        AppError::ConfigError(format!("Invalid {name} '{raw}': must be a positive integer"))
    })?;
    if parsed == 0 {
        return Err(AppError::ConfigError(format!("{name} must be at least 1")));
    }
    Ok(parsed)
}
