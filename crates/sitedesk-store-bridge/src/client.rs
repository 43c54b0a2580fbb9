//! HTTP transport for the backing store's auth and telemetry endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::activity::ActivityRecord;

pub const DEFAULT_TIMEOUT_MS: u64 = 1_500;
pub const DEFAULT_REQUEST_ATTEMPTS: usize = 2;

pub const ENV_STORE_URL: &str = "SITEDESK_STORE_URL";
pub const ENV_STORE_API_KEY: &str = "SITEDESK_STORE_API_KEY";

const SET_AUTH_CONTEXT_PATH: &str = "/rest/v1/rpc/set_auth_context";
const ACTIVITY_PATH: &str = "/rest/v1/user_activity";

#[derive(Debug, Error)]
pub enum StoreClientError {
    #[error("store_base_url_missing")]
    BaseUrlMissing,
    #[error("store_base_url_invalid")]
    BaseUrlInvalid,
    #[error("store_request_failed:{message}")]
    Request { message: String },
    #[error("store_read_failed:{message}")]
    Read { message: String },
    #[error("store_rate_limited:{status}")]
    RateLimited { status: StatusCode },
    #[error("store_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
}

impl StoreClientError {
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Seam over the backing-store calls the session layer issues.
///
/// Only two calls exist: the request-identity RPC the bridge keeps in sync,
/// and the best-effort activity insert. The store's general query surface
/// lives elsewhere.
#[async_trait]
pub trait StoreTransport: Send + Sync {
    /// Sets the store's request-scoped identity variable to `user_id`.
    async fn set_request_identity(&self, user_id: &str) -> Result<(), StoreClientError>;

    /// Inserts one activity telemetry row.
    async fn record_activity(&self, record: &ActivityRecord) -> Result<(), StoreClientError>;
}

#[derive(Debug, Clone)]
pub struct StoreClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub request_attempts: usize,
}

impl StoreClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            request_attempts: DEFAULT_REQUEST_ATTEMPTS,
        }
    }

    /// Reads the store address and key from the environment.
    ///
    /// The store address is deployment-specific, so there is no default:
    /// a missing or empty `SITEDESK_STORE_URL` is an error.
    pub fn from_env() -> Result<Self, StoreClientError> {
        let base_url = env_non_empty(ENV_STORE_URL).ok_or(StoreClientError::BaseUrlMissing)?;
        let mut config = Self::new(normalize_base_url(&base_url)?);
        config.api_key = env_non_empty(ENV_STORE_API_KEY);
        Ok(config)
    }
}

/// Reqwest-backed [`StoreTransport`] against the store's REST surface.
#[derive(Debug, Clone)]
pub struct StoreClient {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    request_attempts: usize,
    http: reqwest::Client,
}

impl StoreClient {
    pub fn new(config: StoreClientConfig) -> Result<Self, StoreClientError> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            base_url,
            api_key: config.api_key,
            timeout: Duration::from_millis(config.timeout_ms.max(250)),
            request_attempts: config.request_attempts.max(1),
            http: reqwest::Client::new(),
        })
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<Req>(&self, path: &str, payload: &Req) -> Result<(), StoreClientError>
    where
        Req: Serialize + ?Sized,
    {
        let url = self.endpoint(path);
        let mut last_error: Option<String> = None;

        for attempt in 0..self.request_attempts {
            let mut request = self
                .http
                .post(url.as_str())
                .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
                .timeout(self.timeout)
                .json(payload);
            if let Some(key) = self.api_key.as_deref() {
                request = request.header("apikey", key);
            }

            match request.send().await {
                Ok(response) => return check_response(response).await,
                Err(error) => {
                    last_error = Some(error.to_string());
                    if attempt + 1 >= self.request_attempts {
                        break;
                    }
                }
            }
        }

        Err(StoreClientError::Request {
            message: last_error.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[async_trait]
impl StoreTransport for StoreClient {
    async fn set_request_identity(&self, user_id: &str) -> Result<(), StoreClientError> {
        #[derive(Serialize)]
        struct SetAuthContextRequest<'a> {
            user_id: &'a str,
        }
        self.post_json(SET_AUTH_CONTEXT_PATH, &SetAuthContextRequest { user_id })
            .await
    }

    async fn record_activity(&self, record: &ActivityRecord) -> Result<(), StoreClientError> {
        self.post_json(ACTIVITY_PATH, record).await
    }
}

async fn check_response(response: reqwest::Response) -> Result<(), StoreClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|error| StoreClientError::Read {
            message: error.to_string(),
        })?;
    Err(classify_http_failure(status, &bytes))
}

/// Maps an HTTP failure onto the error taxonomy.
///
/// The store signals throttling either with a 429 status or with a
/// rate-limit message in an otherwise generic error body; both classify as
/// [`StoreClientError::RateLimited`].
#[must_use]
pub fn classify_http_failure(status: StatusCode, body: &[u8]) -> StoreClientError {
    let body = String::from_utf8_lossy(body).trim().to_string();
    if status == StatusCode::TOO_MANY_REQUESTS || rate_limited_body(&body) {
        return StoreClientError::RateLimited { status };
    }
    let body = if body.is_empty() {
        "<empty>".to_string()
    } else {
        body
    };
    StoreClientError::Http { status, body }
}

#[must_use]
pub fn rate_limited_body(body: &str) -> bool {
    let normalized = body.to_ascii_lowercase();
    normalized.contains("rate limit")
        || normalized.contains("too many requests")
        || normalized.contains("429")
}

fn normalize_base_url(raw: &str) -> Result<String, StoreClientError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(StoreClientError::BaseUrlMissing);
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(StoreClientError::BaseUrlInvalid);
    }
    let Some((_, remainder)) = trimmed.split_once("://") else {
        return Err(StoreClientError::BaseUrlInvalid);
    };
    if remainder.trim().is_empty() || remainder.starts_with('/') {
        return Err(StoreClientError::BaseUrlInvalid);
    }
    Ok(trimmed.to_string())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
