//! HTTP fetcher with rate limiting, bounded concurrency and retries
//!
//! [`HttpFetcher`] retrieves one page per call:
//! - every attempt takes a [`ConcurrencyGate`] slot and a [`RateLimiter`]
//!   token per request (redirect hops included)
//! - redirects are followed by hand, resolving each `Location` against the
//!   URL that produced it, up to the configured hop limit
//! - 5xx, timeouts and connection failures are retried with exponential
//!   backoff; 4xx are returned immediately
//! - bodies are decoded using the charset from the content type

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, LOCATION},
    redirect, Client, Response,
};
use tracing::{debug, warn};
use url::Url;

use crate::config::CrawlerConfig;
use crate::crawler::limiter::{ConcurrencyGate, RateLimiter};
use crate::crawler::url::SitePolicy;
use crate::utils::error::{CrawlError, FetchError};
use crate::utils::retry::{RetryConfig, RetryDecision, RetryState};
use crate::utils::{decode_body, media_type};

const HTML_MEDIA_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// A page retrieved with a 2xx status
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL the fetch started from
    pub requested_url: Url,
    /// URL that produced the final response (differs after redirects)
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    /// Decoded body, present only for HTML responses
    pub body: Option<String>,
}

impl FetchedPage {
    pub fn is_html(&self) -> bool {
        self.body.is_some()
    }

    pub fn was_redirected(&self) -> bool {
        self.final_url != self.requested_url
    }
}

/// Outcome of a fetch after all retries, with the number of attempts made
#[derive(Debug)]
pub struct FetchResult {
    pub attempts: u32,
    pub outcome: Result<FetchedPage, FetchError>,
}

/// Retrieves a single page
///
/// Implementations never fail the crawl: every outcome, including
/// exhausted retries, is reported through [`FetchResult`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> FetchResult;
}

/// reqwest-backed [`PageFetcher`]
pub struct HttpFetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Global request throttle
    limiter: RateLimiter,

    /// Bound on simultaneously active fetches
    gate: ConcurrencyGate,

    /// Backoff policy for transient failures
    retry: RetryConfig,

    /// Redirect hops followed before reporting a loop
    max_redirects: usize,

    /// Site that redirects may not leave
    scope: Option<SitePolicy>,
}

impl HttpFetcher {
    /// Create a fetcher sharing the given limiter and gate
    ///
    /// # Errors
    ///
    /// Returns `CrawlError::Client` if the HTTP client cannot be created
    pub fn new(
        config: &CrawlerConfig,
        limiter: RateLimiter,
        gate: ConcurrencyGate,
    ) -> Result<Self, CrawlError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(config.request_timeout())
            .redirect(redirect::Policy::none())
            .cookie_store(true)
            .gzip(true)
            .build()
            .map_err(|e| CrawlError::Client(e.to_string()))?;

        Ok(Self {
            client,
            limiter,
            gate,
            retry: config.retry_config(),
            max_redirects: config.max_redirects,
            scope: None,
        })
    }

    /// Refuse redirects that leave `scope`
    #[must_use]
    pub fn with_scope(mut self, scope: SitePolicy) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Run attempts until one succeeds, fails permanently, or retries run out
    async fn fetch_with_retry(&self, url: &Url) -> FetchResult {
        let mut state = RetryState::new(self.retry.clone());

        loop {
            let attempt = state.begin_attempt();

            match self.attempt(url).await {
                Ok(page) => {
                    if attempt > 1 {
                        debug!(url = %url, attempt, "Fetch succeeded after retry");
                    }
                    return FetchResult {
                        attempts: attempt,
                        outcome: Ok(page),
                    };
                }
                Err(err) => match state.on_failure(err.is_retryable()) {
                    RetryDecision::Retry { delay, .. } => {
                        debug!(
                            url = %url,
                            attempt,
                            error = %err,
                            delay_ms = delay.as_millis() as u64,
                            "Fetch attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::GiveUp => {
                        if err.is_retryable() {
                            warn!(url = %url, attempts = attempt, error = %err, "Retries exhausted");
                        }
                        return FetchResult {
                            attempts: attempt,
                            outcome: Err(err),
                        };
                    }
                },
            }
        }
    }

    /// One attempt: a gate slot held across the whole redirect chain
    async fn attempt(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let _slot = self.gate.acquire().await?;

        let mut current = url.clone();
        let mut hops = 0;

        loop {
            self.limiter.acquire().await;

            debug!(url = %current, hops, "Fetching URL");

            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(FetchError::from_reqwest)?;

            let status = response.status();

            if status.is_redirection() {
                let next = redirect_target(&current, &response)?;
                if hops >= self.max_redirects {
                    return Err(FetchError::RedirectLoop { hops });
                }
                if let Some(scope) = &self.scope {
                    if !scope.is_same_site(&next) {
                        return Err(FetchError::ExternalRedirect(next.to_string()));
                    }
                }

                debug!(from = %current, to = %next, "Following redirect");
                hops += 1;
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let body = if is_html(content_type.as_deref()) {
                let bytes = response.bytes().await.map_err(FetchError::from_reqwest)?;
                Some(decode_body(&bytes, content_type.as_deref()))
            } else {
                None
            };

            return Ok(FetchedPage {
                requested_url: url.clone(),
                final_url: current,
                status: status.as_u16(),
                content_type,
                body,
            });
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> FetchResult {
        self.fetch_with_retry(url).await
    }
}

/// Resolve the `Location` header of a redirect against the URL that sent it
fn redirect_target(current: &Url, response: &Response) -> Result<Url, FetchError> {
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            FetchError::InvalidRedirect(format!(
                "{} answered {} without a Location header",
                current,
                response.status().as_u16()
            ))
        })?;

    resolve_location(current, location)
}

fn resolve_location(current: &Url, location: &str) -> Result<Url, FetchError> {
    let mut next = current
        .join(location.trim())
        .map_err(|_| FetchError::InvalidRedirect(location.to_string()))?;
    next.set_fragment(None);
    Ok(next)
}

/// HTML unless the server says otherwise; a missing content type counts as HTML
pub fn is_html(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => HTML_MEDIA_TYPES.contains(&media_type(ct).as_str()),
    }
}
