//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the shared HTTP client with its timeouts
//! - Capping concurrent connections with a semaphore
//! - Rotating user agents and sending page or image header profiles
//! - Random jitter before each request
//! - Retry logic for transient failures and rate limiting
//! - Streaming image bodies to disk

use crate::config::FetchConfig;
use crate::url::SiteUrls;
use crate::{FetchError, FetchResult};
use futures_util::StreamExt;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, HOST, REFERER, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Desktop browser user agents rotated across requests
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

/// Which header set a request carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderProfile {
    /// HTML pages: user agent, Host and Referer
    Page,
    /// Image files: user agent and Referer (the image host checks it)
    Image,
}

/// Request policy shared by every clone of a fetcher
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Attempts per request for retryable failures
    pub max_retries: u32,

    /// Pause before retrying after a 429
    pub retry_cooldown: Duration,

    /// 429 cooldowns tolerated per request
    pub rate_limit_retries: u32,

    pub connection_limit: usize,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,

    /// Write buffer size for streamed bodies
    pub chunk_size: usize,

    /// Value of the Host header on page requests
    pub host: String,

    /// Value of the Referer header
    pub referer: String,
}

impl FetchSettings {
    pub fn from_config(config: &FetchConfig, site: &SiteUrls) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_cooldown: config.retry_cooldown(),
            rate_limit_retries: config.rate_limit_retries,
            connection_limit: config.connection_limit,
            timeout: config.timeout(),
            connect_timeout: config.connect_timeout(),
            jitter_min: Duration::from_millis(config.jitter_min_ms),
            jitter_max: Duration::from_millis(config.jitter_max_ms),
            chunk_size: config.chunk_size,
            host: site.authority(),
            referer: site.base().to_string(),
        }
    }
}

/// Builds an HTTP client with the configured timeouts
///
/// No default user agent is set; every request picks its own.
pub fn build_http_client(settings: &FetchSettings) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(settings.timeout)
        .connect_timeout(settings.connect_timeout)
        .pool_max_idle_per_host(settings.connection_limit)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Returns a uniformly random duration in `[min, max]`
///
/// Returns `min` when the range is empty.
pub fn random_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let millis = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(millis)
}

/// Sleeps for `duration` unless cancellation fires first
pub async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Where a successful response body goes
enum Destination<'a> {
    Memory,
    File(&'a Path),
}

enum Body {
    Text(String),
    Written(u64),
}

/// Outcome of a single attempt that did not succeed
enum AttemptError {
    RateLimited,
    Failed(FetchError),
}

impl From<FetchError> for AttemptError {
    fn from(error: FetchError) -> Self {
        Self::Failed(error)
    }
}

/// Cheaply cloneable HTTP fetcher
///
/// Clones share the connection pool and the connection semaphore, so the
/// connection limit holds across every pipeline stage.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    permits: Arc<Semaphore>,
    settings: Arc<FetchSettings>,
    profile: HeaderProfile,
}

impl Fetcher {
    /// Creates a page fetcher
    pub fn new(settings: FetchSettings) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&settings)?;
        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(settings.connection_limit.max(1))),
            settings: Arc::new(settings),
            profile: HeaderProfile::Page,
        })
    }

    /// A fetcher sharing this one's pool and limit but sending `profile` headers
    pub fn with_profile(&self, profile: HeaderProfile) -> Self {
        Self {
            profile,
            ..self.clone()
        }
    }

    pub fn profile(&self) -> HeaderProfile {
        self.profile
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetches a URL and returns its body as text
    pub async fn fetch_text(&self, url: &str, cancel: &CancellationToken) -> FetchResult<String> {
        match self.fetch(url, Destination::Memory, cancel).await? {
            Body::Text(text) => Ok(text),
            Body::Written(_) => Ok(String::new()),
        }
    }

    /// Fetches a URL and streams its body into `path`
    ///
    /// The body is written to a sibling `.part` file that is renamed into
    /// place once complete, so `path` never holds a truncated file.
    ///
    /// # Returns
    ///
    /// The number of bytes written
    pub async fn fetch_to_file(
        &self,
        url: &str,
        path: &Path,
        cancel: &CancellationToken,
    ) -> FetchResult<u64> {
        match self.fetch(url, Destination::File(path), cancel).await? {
            Body::Written(bytes) => Ok(bytes),
            Body::Text(text) => Ok(text.len() as u64),
        }
    }

    /// Runs the retry loop around single attempts
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 429 | Cooldown, retry without using an attempt (capped) |
    /// | Other non-200 status | Retry at once, up to `max_retries` attempts |
    /// | Timeout / transport error | Retry at once, up to `max_retries` attempts |
    /// | File write error | Fail immediately |
    /// | Cancellation | Fail immediately |
    async fn fetch(
        &self,
        url: &str,
        destination: Destination<'_>,
        cancel: &CancellationToken,
    ) -> FetchResult<Body> {
        let cancelled = || FetchError::Cancelled {
            url: url.to_string(),
        };

        let jitter = random_delay(self.settings.jitter_min, self.settings.jitter_max);
        if !pause(jitter, cancel).await {
            return Err(cancelled());
        }

        let mut failures = 0u32;
        let mut cooldowns = 0u32;

        loop {
            match self.attempt(url, &destination, cancel).await {
                Ok(body) => return Ok(body),
                Err(AttemptError::RateLimited) => {
                    if cooldowns >= self.settings.rate_limit_retries {
                        return Err(FetchError::RateLimited {
                            url: url.to_string(),
                            cooldowns,
                        });
                    }
                    cooldowns += 1;
                    tracing::warn!(url, cooldowns, "Rate limited, cooling down");
                    if !pause(self.settings.retry_cooldown, cancel).await {
                        return Err(cancelled());
                    }
                }
                Err(AttemptError::Failed(error)) => {
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    failures += 1;
                    if failures >= self.settings.max_retries {
                        tracing::warn!(url, attempts = failures, error = %error, "Giving up on request");
                        return Err(error);
                    }
                    tracing::warn!(url, attempt = failures, error = %error, "Request failed, retrying");
                }
            }
        }
    }

    async fn attempt(
        &self,
        url: &str,
        destination: &Destination<'_>,
        cancel: &CancellationToken,
    ) -> Result<Body, AttemptError> {
        let cancelled = || FetchError::Cancelled {
            url: url.to_string(),
        };

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled().into()),
            permit = self.permits.acquire() => permit.map_err(|_| cancelled())?,
        };

        let request = self.client.get(url).headers(self.headers());
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled().into()),
            response = request.send() => response.map_err(|e| classify(url, e))?,
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::RateLimited);
        }
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        match destination {
            Destination::Memory => {
                let text = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(cancelled().into()),
                    text = response.text() => text.map_err(|e| classify(url, e))?,
                };
                Ok(Body::Text(text))
            }
            Destination::File(path) => {
                let written = self.stream_to_file(response, url, path, cancel).await?;
                Ok(Body::Written(written))
            }
        }
    }

    async fn stream_to_file(
        &self,
        response: Response,
        url: &str,
        path: &Path,
        cancel: &CancellationToken,
    ) -> FetchResult<u64> {
        let partial = partial_path(path);

        match self.write_body(response, url, &partial, cancel).await {
            Ok(written) => {
                tokio::fs::rename(&partial, path)
                    .await
                    .map_err(|source| FetchError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Ok(written)
            }
            Err(error) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(error)
            }
        }
    }

    async fn write_body(
        &self,
        response: Response,
        url: &str,
        partial: &Path,
        cancel: &CancellationToken,
    ) -> FetchResult<u64> {
        let io_error = |source| FetchError::Io {
            path: partial.to_path_buf(),
            source,
        };

        let file = tokio::fs::File::create(partial).await.map_err(io_error)?;
        let mut writer = BufWriter::with_capacity(self.settings.chunk_size.max(1), file);
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(FetchError::Cancelled { url: url.to_string() });
                }
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| classify(url, e))?;

            writer.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
        }

        writer.flush().await.map_err(io_error)?;
        Ok(written)
    }

    /// Builds the header set of the next request
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(random_user_agent()));

        if self.profile == HeaderProfile::Page {
            if let Ok(host) = HeaderValue::from_str(&self.settings.host) {
                headers.insert(HOST, host);
            }
        }
        if let Ok(referer) = HeaderValue::from_str(&self.settings.referer) {
            headers.insert(REFERER, referer);
        }

        headers
    }
}

/// Path of the temporary file a download is streamed into
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

/// Classifies a transport error
fn classify(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            source: error,
        }
    }
}
