//! Remote toxicity classification client.

use std::time::Duration;

use chorus_core::enrich::{Moderation, ToxicityClassifier};
use chorus_core::error::AppError;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.moderatehatespeech.com/api/v1/moderate/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct ModerateRequest<'a> {
    token: &'a str,
    text: &'a str,
}

/// The service serialises confidence as a JSON string.
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(v) => Ok(v),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize)]
struct ModerateResponse {
    class: String,
    #[serde(deserialize_with = "lenient_f64", default)]
    confidence: f64,
}

/// Client for the moderation API. Without a token it classifies
/// nothing and every record stays non-toxic.
#[derive(Clone)]
pub struct HateSpeechClient {
    http: Client,
    base_url: String,
    token: Option<String>,
    timeout_secs: u64,
}

impl HateSpeechClient {
    pub fn new(token: Option<String>) -> Result<Self, AppError> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(token: Option<String>, base_url: &str) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            token,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        })
    }

    /// Read the token from `MODERATION_TOKEN`, if set.
    pub fn from_env() -> Result<Self, AppError> {
        let token = std::env::var("MODERATION_TOKEN").ok();
        if token.is_none() {
            tracing::warn!("MODERATION_TOKEN not set, toxicity classification disabled");
        }
        Self::new(token)
    }
}

impl ToxicityClassifier for HateSpeechClient {
    async fn classify(&self, text: &str) -> Result<Moderation, AppError> {
        let Some(token) = &self.token else {
            return Ok(Moderation {
                class: "disabled".to_string(),
                confidence: 0.0,
            });
        };

        let response = self
            .http
            .post(&self.base_url)
            .json(&ModerateRequest { token, text })
            .send()
            .await
            .map_err(|e| {
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
            return Err(AppError::HttpError(format!(
                "HTTP {} from moderation API",
                status.as_u16()
            )));
        }

        let verdict: ModerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse moderation response: {e}")))?;

        Ok(Moderation {
            class: verdict.class,
            confidence: verdict.confidence,
        })
    }
}
