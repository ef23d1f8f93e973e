//! Anonymous source client. No auth, no cursor: callers get the whole
//! catalog or a whole thread snapshot per request.

use std::time::Duration;

use chorus_core::error::AppError;
use chorus_core::source::{AnonSource, CatalogPage, ThreadSnapshot};
use reqwest::Client;

const DEFAULT_BASE_URL: &str = "https://a.4cdn.org";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct ChanClient {
    http: Client,
    base_url: String,
    timeout_secs: u64,
}

impl ChanClient {
    pub fn new() -> Result<Self, AppError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            // 404 here usually means the thread was pruned between the
            // catalog poll and the fetch.
            return Err(AppError::HttpError(format!(
                "HTTP {} for {path}",
                status.as_u16()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse response: {e}")))
    }
}

impl AnonSource for ChanClient {
    async fn get_thread(&self, board: &str, thread_no: u64) -> Result<ThreadSnapshot, AppError> {
        self.get(&format!("/{board}/thread/{thread_no}.json")).await
    }

    async fn get_catalog(&self, board: &str) -> Result<Vec<CatalogPage>, AppError> {
        self.get(&format!("/{board}/catalog.json")).await
    }
}
