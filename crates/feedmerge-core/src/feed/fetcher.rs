use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, Proxy, StatusCode};

use crate::config::{AppConfig, FetchConfig, IdentityConfig};
use crate::{Error, Result};

const MAX_FEED_BYTES: usize = 5 * 1024 * 1024;
const MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY_MS: u64 = 500;

/// Sent when a rotation pool is configured empty
const FALLBACK_USER_AGENT: &str = concat!("feedmerge/", env!("CARGO_PKG_VERSION"));

/// Retrieves raw documents by URL
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and return its body with surrounding whitespace trimmed.
    ///
    /// Transport failures, non-2xx statuses and empty bodies are errors.
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

/// Pool of browser User-Agent strings, one picked uniformly at random per request
pub struct UserAgentPool {
    agents: Vec<String>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl UserAgentPool {
    pub fn new(agents: Vec<String>) -> Self {
        Self::with_rng(agents, StdRng::from_os_rng())
    }

    /// Build a pool drawing from a caller-supplied random source (e.g. a seeded `StdRng`)
    pub fn with_rng(agents: Vec<String>, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            agents,
            rng: Mutex::new(Box::new(rng)),
        }
    }

    pub fn pick(&self) -> &str {
        if self.agents.is_empty() {
            return FALLBACK_USER_AGENT;
        }
        let index = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.random_range(0..self.agents.len())
        };
        &self.agents[index]
    }
}

impl fmt::Debug for UserAgentPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserAgentPool")
            .field("agents", &self.agents.len())
            .finish_non_exhaustive()
    }
}

/// Outbound identification attached to every request
#[derive(Debug)]
pub enum Identity {
    Fixed(String),
    Rotate(UserAgentPool),
}

impl Identity {
    pub fn from_config(config: &FetchConfig) -> Self {
        match &config.identity {
            IdentityConfig::Fixed { user_agent } => Identity::Fixed(user_agent.clone()),
            IdentityConfig::Rotate => {
                Identity::Rotate(UserAgentPool::new(config.user_agents.clone()))
            }
        }
    }

    /// User-Agent for the next request
    pub fn user_agent(&self) -> &str {
        match self {
            Identity::Fixed(ua) => ua,
            Identity::Rotate(pool) => pool.pick(),
        }
    }

    fn rotates(&self) -> bool {
        matches!(self, Identity::Rotate(_))
    }
}

/// Feed fetcher backed by a reqwest client
pub struct HttpFetcher {
    client: Client,
    identity: Identity,
}

impl HttpFetcher {
    /// Create a new fetcher with configuration
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Self::build_client(config.request_timeout(), &config.fetch.proxy_url)?;

        Ok(Self {
            client,
            identity: Identity::from_config(&config.fetch),
        })
    }

    /// Replace the configured identity
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// Build HTTP client with optional proxy
    fn build_client(timeout: Duration, proxy_url: &Option<String>) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(ref proxy) = proxy_url {
            let proxy = Proxy::all(proxy)
                .map_err(|e| Error::Config(format!("Invalid proxy URL: {}", e)))?;
            builder = builder.proxy(proxy);
            tracing::info!("Using HTTP proxy for feed fetching");
        }

        builder.build().map_err(Error::Http)
    }

    /// Build browser-like headers for a request
    fn build_headers(user_agent: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "application/rss+xml,application/atom+xml,application/xml;q=0.9,text/xml;q=0.9,text/html;q=0.8,*/*;q=0.7",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
        if let Ok(ua) = HeaderValue::from_str(user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        headers
    }

    /// Fetch with retry and exponential backoff
    async fn fetch_with_retry(&self, url: &str) -> Result<(StatusCode, Bytes)> {
        let mut last_error = None;
        let mut delay_ms = INITIAL_RETRY_DELAY_MS;

        for attempt in 0..MAX_RETRIES {
            let user_agent = self.identity.user_agent();
            let headers = Self::build_headers(user_agent);

            tracing::debug!(
                "Fetch attempt {} for {}, User-Agent: {}",
                attempt + 1,
                url,
                user_agent
            );

            match self.client.get(url).headers(headers).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::TOO_MANY_REQUESTS
                        || status == StatusCode::SERVICE_UNAVAILABLE
                    {
                        tracing::warn!(
                            "Received {} for {}, retrying after {}ms...",
                            status,
                            url,
                            delay_ms
                        );
                        last_error = Some(Error::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    } else if status == StatusCode::FORBIDDEN
                        && self.identity.rotates()
                        && attempt < MAX_RETRIES - 1
                    {
                        tracing::warn!("Received 403 for {}, trying different User-Agent...", url);
                        last_error = Some(Error::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    } else {
                        match response.bytes().await {
                            Ok(bytes) => return Ok((status, bytes)),
                            Err(e) => {
                                tracing::warn!("Failed to read response body: {}", e);
                                last_error = Some(Error::Http(e));
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Request failed for {} (attempt {}): {}", url, attempt + 1, e);
                    last_error = Some(Error::Http(e));
                }
            }

            if attempt < MAX_RETRIES - 1 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms *= 2;
            }
        }

        Err(last_error.unwrap_or_else(|| Error::HttpStatus {
            status: 0,
            url: url.to_string(),
        }))
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let (status, body) = self.fetch_with_retry(url).await?;

        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if body.len() > MAX_FEED_BYTES {
            return Err(Error::TooLarge {
                size: body.len(),
                url: url.to_string(),
            });
        }

        let body = trim_body(body);
        if body.is_empty() {
            return Err(Error::EmptyBody(url.to_string()));
        }

        Ok(body)
    }
}

/// Wraps another fetcher and abandons calls that exceed a deadline
pub struct TimeoutFetcher {
    inner: Arc<dyn Fetcher>,
    timeout: Duration,
}

impl TimeoutFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait::async_trait]
impl Fetcher for TimeoutFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        match tokio::time::timeout(self.timeout, self.inner.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                secs: self.timeout.as_secs(),
                url: url.to_string(),
            }),
        }
    }
}

/// Strip leading and trailing ASCII whitespace without copying
fn trim_body(body: Bytes) -> Bytes {
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    let end = body
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    body.slice(start..end)
}
