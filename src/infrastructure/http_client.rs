//! HTTP sessions for the CAPTCHA-gated archive endpoints
//!
//! The origin ties CAPTCHA state and download tokens to a cookie session, so
//! the unit of work here is a session rather than a bare client: one session
//! per item, used for the detail page, the CAPTCHA, the validation POST and
//! the image GET in that order. Each session carries its own rate limit and
//! races every network wait against the shutdown token.

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::{Client, RequestBuilder};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::infrastructure::config::ArchiverConfig;

/// Identifies one cookie session; equal ids mean a shared cookie jar
pub type SessionId = u64;

/// Connection-level failures. HTTP error statuses are not errors at this layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out: {url}")]
    Timeout { url: String },

    #[error("Request failed for {url}: {message}")]
    Connection { url: String, message: String },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Session setup failed: {0}")]
    Setup(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl TransportError {
    fn from_reqwest(url: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout { url: url.to_string() }
        } else {
            Self::Connection {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }
}

/// Status and body of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub const fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    pub const fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One cookie-bearing conversation with the origin.
///
/// `url` may be absolute or a path relative to the configured base URL.
#[async_trait]
pub trait HttpSession: Send + Sync {
    fn id(&self) -> SessionId;

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<RawResponse, TransportError>;

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        referer: &str,
    ) -> Result<RawResponse, TransportError>;

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<RawResponse, TransportError>;
}

/// Opens independent sessions (fresh cookie jar, own rate budget)
pub trait SessionFactory: Send + Sync {
    type Session: HttpSession;

    fn open_session(&self) -> Result<Self::Session, TransportError>;
}

/// `reqwest`-backed session
pub struct ArchiveSession {
    id: SessionId,
    client: Client,
    base_url: Url,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    shutdown: CancellationToken,
}

impl ArchiveSession {
    pub fn new(
        id: SessionId,
        config: &ArchiverConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.site.user_agent)
                .map_err(|e| TransportError::Setup(format!("Invalid user agent: {e}")))?,
        );

        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.http.request_timeout())
            .connect_timeout(config.http.connect_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Setup(format!("Failed to create HTTP client: {e}")))?;

        let base_url = Url::parse(&config.site.base_url).map_err(|e| TransportError::InvalidUrl {
            url: config.site.base_url.clone(),
            reason: e.to_string(),
        })?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.http.max_requests_per_second)
                .ok_or_else(|| TransportError::Setup("Rate limit must be greater than 0".into()))?,
        );

        Ok(Self {
            id,
            client,
            base_url,
            rate_limiter: RateLimiter::direct(quota),
            shutdown,
        })
    }

    fn resolve(&self, url: &str) -> Result<Url, TransportError> {
        self.base_url.join(url).map_err(|e| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Send with rate limiting, reading the whole body, racing the shutdown token
    async fn execute(&self, url: &Url, request: RequestBuilder) -> Result<RawResponse, TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        tokio::select! {
            _ = self.rate_limiter.until_ready() => {},
            _ = self.shutdown.cancelled() => return Err(TransportError::Cancelled),
        }

        let url_str = url.as_str();
        debug!("[session {}] {}", self.id, url_str);

        let response = tokio::select! {
            result = request.send() => result.map_err(|e| TransportError::from_reqwest(url_str, &e))?,
            _ = self.shutdown.cancelled() => {
                warn!("🛑 HTTP request cancelled for URL: {}", url_str);
                return Err(TransportError::Cancelled);
            }
        };

        let status = response.status().as_u16();
        let body = tokio::select! {
            result = response.bytes() => result.map_err(|e| TransportError::from_reqwest(url_str, &e))?,
            _ = self.shutdown.cancelled() => return Err(TransportError::Cancelled),
        };

        debug!("[session {}] {} -> {} ({} bytes)", self.id, url_str, status, body.len());
        Ok(RawResponse::new(status, body.to_vec()))
    }
}

#[async_trait]
impl HttpSession for ArchiveSession {
    fn id(&self) -> SessionId {
        self.id
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<RawResponse, TransportError> {
        let url = self.resolve(url)?;
        let request = self.client.get(url.clone()).query(query);
        self.execute(&url, request).await
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        referer: &str,
    ) -> Result<RawResponse, TransportError> {
        let url = self.resolve(url)?;
        let request = self.client.post(url.clone()).header(REFERER, referer).form(form);
        self.execute(&url, request).await
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<RawResponse, TransportError> {
        let url = self.resolve(url)?;
        let request = self.client.post(url.clone()).json(body);
        self.execute(&url, request).await
    }
}

/// Hands out numbered [`ArchiveSession`]s sharing one config and shutdown token
#[derive(Clone)]
pub struct ReqwestSessionFactory {
    config: Arc<ArchiverConfig>,
    shutdown: CancellationToken,
    next_id: Arc<AtomicU64>,
}

impl ReqwestSessionFactory {
    pub fn new(config: Arc<ArchiverConfig>, shutdown: CancellationToken) -> Self {
        Self {
            config,
            shutdown,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl SessionFactory for ReqwestSessionFactory {
    type Session = ArchiveSession;

    fn open_session(&self) -> Result<ArchiveSession, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        ArchiveSession::new(id, &self.config, self.shutdown.clone())
    }
}
