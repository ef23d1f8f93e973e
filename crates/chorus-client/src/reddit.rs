//! Authenticated source client with credential rotation.
//!
//! Every request spends one slot of a per-credential rate budget
//! (60 requests per rolling 60s window). A 429 puts the offending
//! credential on a 60s cool-down, rotates to the next one and retries
//! the request once. OAuth tokens are cached per credential and
//! refreshed 60s before their advertised expiry.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chorus_core::error::AppError;
use chorus_core::source::{AuthedSource, Listing, RawComment, RawPost};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Semaphore;

const DEFAULT_BASE_URL: &str = "https://oauth.reddit.com";
const DEFAULT_AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";
const USER_AGENT: &str = "chorus/0.2 (discussion crawl pipeline)";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const REQUESTS_PER_WINDOW: u32 = 60;
const WINDOW: Duration = Duration::from_secs(60);
const COOLDOWN: Duration = Duration::from_secs(60);
const TOKEN_TTL_MARGIN: u64 = 60;

/// Concurrent in-flight requests across all credentials.
const MAX_IN_FLIGHT: usize = 10;

/// Page size for listing endpoints, the API maximum.
const PAGE_LIMIT: u32 = 100;

/// One API credential as registered with the source.
#[derive(Debug, Clone)]
pub struct Credential {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug)]
struct CredentialSlot {
    credential: Credential,
    used: u32,
    window_start: Instant,
    cooldown_until: Option<Instant>,
    token: Option<CachedToken>,
}

impl CredentialSlot {
    fn new(credential: Credential, now: Instant) -> Self {
        Self {
            credential,
            used: 0,
            window_start: now,
            cooldown_until: None,
            token: None,
        }
    }

    fn cooling(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }
}

/// Outcome of asking the pool for a request slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reservation {
    /// Use this credential index for the request.
    Slot(usize),
    /// Every credential is saturated or cooling; retry after this long.
    RetryIn(Duration),
}

/// Rate-limit bookkeeping for all credentials. Synchronous and
/// clock-injected so the rotation logic is unit-testable.
struct PoolState {
    slots: Vec<CredentialSlot>,
    active: usize,
}

impl PoolState {
    fn new(credentials: Vec<Credential>, now: Instant) -> Self {
        Self {
            slots: credentials
                .into_iter()
                .map(|c| CredentialSlot::new(c, now))
                .collect(),
            active: 0,
        }
    }

    /// Reserve one request slot, preferring the active credential and
    /// rotating forward when it is saturated or cooling.
    fn reserve(&mut self, now: Instant) -> Reservation {
        let len = self.slots.len();
        for offset in 0..len {
            let idx = (self.active + offset) % len;
            let slot = &mut self.slots[idx];
            if slot.cooling(now) {
                continue;
            }
            if now.duration_since(slot.window_start) >= WINDOW {
                slot.window_start = now;
                slot.used = 0;
            }
            if slot.used < REQUESTS_PER_WINDOW {
                slot.used += 1;
                self.active = idx;
                return Reservation::Slot(idx);
            }
        }

        // Shortest time until any credential frees up.
        let wait = self
            .slots
            .iter()
            .map(|slot| {
                let cooldown = slot
                    .cooldown_until
                    .map(|until| until.saturating_duration_since(now))
                    .unwrap_or(Duration::ZERO);
                let window = WINDOW.saturating_sub(now.duration_since(slot.window_start));
                cooldown.max(window)
            })
            .min()
            .unwrap_or(WINDOW);
        Reservation::RetryIn(wait)
    }

    /// Put a credential on cool-down after a 429 and rotate past it.
    fn cool_down(&mut self, index: usize, now: Instant) {
        self.slots[index].cooldown_until = Some(now + COOLDOWN);
        self.active = (index + 1) % self.slots.len();
    }

    fn cached_token(&self, index: usize, now: Instant) -> Option<String> {
        self.slots[index]
            .token
            .as_ref()
            .filter(|t| t.expires_at > now)
            .map(|t| t.access_token.clone())
    }

    fn store_token(&mut self, index: usize, access_token: String, expires_in: u64, now: Instant) {
        self.slots[index].token = Some(CachedToken {
            access_token,
            expires_at: now + Duration::from_secs(expires_in.saturating_sub(TOKEN_TTL_MARGIN)),
        });
    }

    fn clear_token(&mut self, index: usize) {
        self.slots[index].token = None;
    }

    fn credential(&self, index: usize) -> Credential {
        self.slots[index].credential.clone()
    }
}

/// Shared, clonable credential pool.
#[derive(Clone)]
pub struct CredentialPool {
    state: Arc<Mutex<PoolState>>,
}

impl CredentialPool {
    pub fn new(credentials: Vec<Credential>) -> Result<Self, AppError> {
        if credentials.is_empty() {
            return Err(AppError::ConfigError(
                "credential pool needs at least one credential".to_string(),
            ));
        }
        Ok(Self {
            state: Arc::new(Mutex::new(PoolState::new(credentials, Instant::now()))),
        })
    }

    /// Load numbered credentials from the environment:
    /// `REDDIT_CLIENT_ID1`, `REDDIT_CLIENT_SECRET1`, `REDDIT_USERNAME1`,
    /// `REDDIT_PASSWORD1`, then `...2` and so on until a gap.
    pub fn from_env() -> Result<Self, AppError> {
        let mut credentials = Vec::new();
        for i in 1.. {
            let Ok(client_id) = std::env::var(format!("REDDIT_CLIENT_ID{i}")) else {
                break;
            };
            let var = |name: &str| -> Result<String, AppError> {
                std::env::var(format!("{name}{i}")).map_err(|_| {
                    AppError::ConfigError(format!("{name}{i} is required alongside REDDIT_CLIENT_ID{i}"))
                })
            };
            credentials.push(Credential {
                client_id,
                client_secret: var("REDDIT_CLIENT_SECRET")?,
                username: var("REDDIT_USERNAME")?,
                password: var("REDDIT_PASSWORD")?,
            });
        }
        if credentials.is_empty() {
            return Err(AppError::ConfigError(
                "no credentials configured (set REDDIT_CLIENT_ID1 and friends)".to_string(),
            ));
        }
        tracing::info!(count = credentials.len(), "Loaded credential pool");
        Self::new(credentials)
    }

    /// Block (asynchronously) until a request slot is available.
    async fn reserve(&self) -> usize {
        loop {
            let reservation = {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                state.reserve(Instant::now())
            };
            match reservation {
                Reservation::Slot(index) => return index,
                Reservation::RetryIn(wait) => {
                    tracing::debug!(?wait, "All credentials saturated, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn cool_down(&self, index: usize) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.cool_down(index, Instant::now());
    }

    fn cached_token(&self, index: usize) -> Option<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.cached_token(index, Instant::now())
    }

    fn store_token(&self, index: usize, access_token: String, expires_in: u64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.store_token(index, access_token, expires_in, Instant::now());
    }

    fn clear_token(&self, index: usize) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.clear_token(index);
    }

    fn credential(&self, index: usize) -> Credential {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.credential(index)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

// ---- listing envelope ----

#[derive(Deserialize)]
struct Envelope {
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Deserialize)]
struct Child {
    kind: String,
    data: Value,
}

/// Decode a post listing envelope, keeping only `t3` (post) children.
fn listing_from_envelope(value: Value) -> Result<Listing, AppError> {
    let envelope: Envelope = serde_json::from_value(value)?;
    let mut posts = Vec::with_capacity(envelope.data.children.len());
    for child in envelope.data.children {
        if child.kind != "t3" {
            continue;
        }
        posts.push(serde_json::from_value::<RawPost>(child.data)?);
    }
    Ok(Listing {
        after: envelope.data.after,
        posts,
    })
}

/// Decode a comments response. The endpoint returns a two-element
/// array: the post envelope, then the comment envelope. Only `t1`
/// (comment) children count; "more" stubs are dropped.
fn comments_from_envelope(value: Value, limit: u32) -> Result<Vec<RawComment>, AppError> {
    let envelopes: Vec<Envelope> = serde_json::from_value(value)?;
    let Some(comment_envelope) = envelopes.into_iter().nth(1) else {
        return Ok(Vec::new());
    };
    let mut comments = Vec::new();
    for child in comment_envelope.data.children {
        if child.kind != "t1" {
            continue;
        }
        comments.push(serde_json::from_value::<RawComment>(child.data)?);
        if comments.len() >= limit as usize {
            break;
        }
    }
    Ok(comments)
}

/// What to do with a listing response, given its status code and
/// whether this request has already been retried on another credential.
#[derive(Debug, PartialEq, Eq)]
enum ResponseAction {
    /// Success; decode the body.
    Proceed,
    /// 429 on the first attempt: cool the credential down and try once
    /// more on whichever credential the pool hands out next.
    RotateAndRetry,
    /// 429 after a rotation; the retry budget is spent.
    RateLimited,
    /// Token rejected; re-authenticate before the next call.
    Unauthorized,
    /// Any other non-success status.
    Failed(u16),
}

fn classify_status(status: u16, rotated: bool) -> ResponseAction {
    match status {
        429 if !rotated => ResponseAction::RotateAndRetry,
        429 => ResponseAction::RateLimited,
        401 => ResponseAction::Unauthorized,
        200..=299 => ResponseAction::Proceed,
        other => ResponseAction::Failed(other),
    }
}

/// Client for the authenticated listing API.
#[derive(Clone)]
pub struct RedditClient {
    http: Client,
    pool: CredentialPool,
    in_flight: Arc<Semaphore>,
    base_url: String,
    auth_url: String,
    timeout_secs: u64,
}

impl RedditClient {
    pub fn new(pool: CredentialPool) -> Result<Self, AppError> {
        Self::with_base_urls(pool, DEFAULT_BASE_URL, DEFAULT_AUTH_URL)
    }

    /// Point the client at alternative endpoints (tests, proxies).
    pub fn with_base_urls(
        pool: CredentialPool,
        base_url: &str,
        auth_url: &str,
    ) -> Result<Self, AppError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            http,
            pool,
            in_flight: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_url: auth_url.to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else {
            AppError::HttpError(e.to_string())
        }
    }

    /// Fetch (or refresh) the OAuth token for one credential.
    async fn token_for(&self, index: usize) -> Result<String, AppError> {
        if let Some(token) = self.pool.cached_token(index) {
            return Ok(token);
        }

        let credential = self.pool.credential(index);
        tracing::debug!(client_id = %credential.client_id, "Exchanging credentials for token");

        let response = self
            .http
            .post(&self.auth_url)
            .basic_auth(&credential.client_id, Some(&credential.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", credential.username.as_str()),
                ("password", credential.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::AuthError(format!(
                "token exchange failed: HTTP {}",
                status.as_u16()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::AuthError(format!("malformed token response: {e}")))?;

        self.pool
            .store_token(index, token.access_token.clone(), token.expires_in);
        Ok(token.access_token)
    }

    /// Authenticated GET with one rotate-and-retry on 429.
    async fn get_json(&self, path: &str) -> Result<Value, AppError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| AppError::Generic("request limiter closed".to_string()))?;

        let mut rotated = false;
        loop {
            let index = self.pool.reserve().await;
            let token = self.token_for(index).await?;

            let url = format!("{}{}", self.base_url, path);
            let response = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| self.map_send_error(e))?;

            match classify_status(response.status().as_u16(), rotated) {
                ResponseAction::RotateAndRetry => {
                    tracing::warn!(%path, credential = index, "Rate limited, rotating credential");
                    self.pool.cool_down(index);
                    rotated = true;
                }
                ResponseAction::RateLimited => {
                    self.pool.cool_down(index);
                    return Err(AppError::RateLimitExceeded);
                }
                ResponseAction::Unauthorized => {
                    // Token revoked or expired early; drop it so the
                    // next call re-authenticates.
                    self.pool.clear_token(index);
                    return Err(AppError::AuthError(format!("HTTP 401 for {path}")));
                }
                ResponseAction::Failed(code) => {
                    return Err(AppError::HttpError(format!("HTTP {code} for {path}")));
                }
                ResponseAction::Proceed => {
                    return response
                        .json()
                        .await
                        .map_err(|e| AppError::HttpError(format!("Failed to parse response: {e}")));
                }
            }
        }
    }
}

impl AuthedSource for RedditClient {
    async fn fetch_new_posts(
        &self,
        subreddit: &str,
        after: Option<&str>,
    ) -> Result<Listing, AppError> {
        let mut path = format!("/r/{subreddit}/new.json?limit={PAGE_LIMIT}");
        if let Some(cursor) = after {
            path.push_str(&format!("&after={cursor}"));
        }
        listing_from_envelope(self.get_json(&path).await?)
    }

    async fn fetch_posts_by_window(
        &self,
        subreddit: &str,
        after: i64,
        before: i64,
        limit: u32,
    ) -> Result<Listing, AppError> {
        let path = format!(
            "/r/{subreddit}/search.json?q=timestamp:{after}..{before}\
             &restrict_sr=on&sort=new&syntax=cloudsearch&limit={limit}"
        );
        listing_from_envelope(self.get_json(&path).await?)
    }

    async fn fetch_top_comments(
        &self,
        subreddit: &str,
        post_id: &str,
        limit: u32,
    ) -> Result<Vec<RawComment>, AppError> {
        let path = format!("/r/{subreddit}/comments/{post_id}.json?sort=top&limit={limit}");
        comments_from_envelope(self.get_json(&path).await?, limit)
    }
}
