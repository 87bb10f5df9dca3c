//! Page fetching, either directly or through an upstream crawling service.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use eggdb_core::AppConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ScraperError;
use crate::retry::retry_with_backoff;
use crate::url::FormattedRequest;

/// Per-request options understood by the crawling service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Render JavaScript before returning content.
    pub javascript: bool,
    /// CSS selectors the crawler should wait for / focus on.
    pub selectors: Vec<String>,
}

/// Raw fetch result. Content is not interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FetchedPage {
    pub status: u16,
    pub content: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Fetch seam used by the orchestrator.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        request: &FormattedRequest,
        options: &FetchOptions,
    ) -> Result<FetchedPage, ScraperError>;
}

#[derive(Debug, Serialize)]
struct CrawlerRequest<'a> {
    url: &'a str,
    javascript: bool,
    headers: BTreeMap<&'a str, &'a str>,
    cookies: BTreeMap<&'a str, &'a str>,
    selectors: &'a [String],
}

#[derive(Debug, Clone)]
enum Backend {
    Direct,
    Crawler {
        base_url: String,
        token: Option<String>,
    },
}

/// HTTP fetch client with timeout and exponential backoff.
///
/// Transient failures (transport errors, non-2xx statuses, crawler errors)
/// are retried up to `max_retries` additional times. When retries run out
/// the failure surfaces as [`ScraperError::Network`] wrapping the last cause.
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    backend: Backend,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl FetchClient {
    /// Creates a direct-fetch client.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        timeout_ms: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            backend: Backend::Direct,
            max_retries,
            backoff_base_ms,
        })
    }

    /// Route every fetch through the crawling service at `base_url`.
    #[must_use]
    pub fn with_crawler(mut self, base_url: &str, token: Option<&str>) -> Self {
        self.backend = Backend::Crawler {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(str::to_owned),
        };
        self
    }

    /// Builds the client described by the scraper settings in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ScraperError> {
        let client = Self::new(
            config.scraper_request_timeout_ms,
            &config.scraper_user_agent,
            config.scraper_max_retries,
            config.scraper_retry_backoff_base_ms,
        )?;
        Ok(match config.crawler_url.as_deref() {
            Some(url) => client.with_crawler(url, config.crawler_token.as_deref()),
            None => client,
        })
    }

    #[must_use]
    pub fn uses_crawler(&self) -> bool {
        matches!(self.backend, Backend::Crawler { .. })
    }

    async fn fetch_once(
        &self,
        request: &FormattedRequest,
        options: &FetchOptions,
    ) -> Result<FetchedPage, ScraperError> {
        match &self.backend {
            Backend::Direct => self.fetch_direct(request).await,
            Backend::Crawler { base_url, token } => {
                self.fetch_via_crawler(base_url, token.as_deref(), request, options)
                    .await
            }
        }
    }

    async fn fetch_direct(&self, request: &FormattedRequest) -> Result<FetchedPage, ScraperError> {
        let mut builder = self
            .client
            .get(&request.url)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(reqwest::header::CACHE_CONTROL, "no-cache");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = request.cookie_header() {
            builder = builder.header(reqwest::header::COOKIE, cookie);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::UnexpectedStatus {
                status: status.as_u16(),
                url: request.url.clone(),
            });
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_owned(), v.to_str().ok()?.to_owned())))
            .collect();
        let content = response.text().await?;
        Ok(FetchedPage {
            status: status.as_u16(),
            content,
            headers,
        })
    }

    async fn fetch_via_crawler(
        &self,
        base_url: &str,
        token: Option<&str>,
        request: &FormattedRequest,
        options: &FetchOptions,
    ) -> Result<FetchedPage, ScraperError> {
        let body = CrawlerRequest {
            url: &request.url,
            javascript: options.javascript,
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
            cookies: request
                .cookies
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
            selectors: &options.selectors,
        };

        let mut builder = self.client.post(format!("{base_url}/content")).json(&body);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ScraperError::Crawler {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        let page: FetchedPage =
            serde_json::from_str(&text).map_err(|source| ScraperError::Deserialize {
                context: format!("crawler response for {}", request.url),
                source,
            })?;

        if !(200..300).contains(&page.status) {
            return Err(ScraperError::UnexpectedStatus {
                status: page.status,
                url: request.url.clone(),
            });
        }
        Ok(page)
    }
}

#[async_trait]
impl PageFetcher for FetchClient {
    async fn fetch(
        &self,
        request: &FormattedRequest,
        options: &FetchOptions,
    ) -> Result<FetchedPage, ScraperError> {
        tracing::debug!(url = %request.url, crawler = self.uses_crawler(), "fetching page");
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.fetch_once(request, options)
        })
        .await
        .map_err(|err| {
            if err.is_retriable() {
                ScraperError::Network {
                    url: request.url.clone(),
                    attempts: self.max_retries.saturating_add(1),
                    source: Box::new(err),
                }
            } else {
                err
            }
        })
    }
}
