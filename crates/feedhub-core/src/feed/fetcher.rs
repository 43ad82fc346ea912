use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Proxy};
use std::time::Duration;

use super::models::Document;
use super::parser::parse_document;
use crate::config::HttpConfig;
use crate::{Error, Result};

const MAX_FEED_BYTES: usize = 5 * 1024 * 1024;
const MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY_MS: u64 = 500;

/// Retrieves and parses a feed document.
///
/// Implementations are stateless per call. Dropping the returned future
/// cancels the request.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Document>;
}

/// HTTP feed fetcher
pub struct FeedFetcher {
    client: Client,
    user_agent: String,
}

impl FeedFetcher {
    /// Create a new feed fetcher with configuration
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Self::build_client(config.request_timeout_secs, &config.proxy_url)?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }

    /// Build HTTP client with optional proxy
    fn build_client(timeout_secs: u64, proxy_url: &Option<String>) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
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

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "application/rss+xml,application/atom+xml,application/feed+json,application/xml;q=0.9,*/*;q=0.8"
            )
        );
        if let Ok(ua) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        headers
    }

    /// Fetch with retry and exponential backoff on 429/503 and transport errors
    async fn fetch_with_retry(&self, url: &str) -> Result<Bytes> {
        let mut last_error = None;
        let mut delay_ms = INITIAL_RETRY_DELAY_MS;

        for attempt in 0..MAX_RETRIES {
            tracing::debug!("Fetch attempt {} for {}", attempt + 1, url);

            match self.client.get(url).headers(self.build_headers()).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                        || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
                    {
                        tracing::warn!(
                            "Received {} for {}, retrying after {}ms...",
                            status,
                            url,
                            delay_ms
                        );
                        last_error = Some(Error::FeedParse(format!("HTTP {} for URL: {}", status, url)));
                    } else if !status.is_success() {
                        return Err(Error::FeedParse(format!("HTTP {} for URL: {}", status, url)));
                    } else {
                        match response.bytes().await {
                            Ok(bytes) => return Ok(bytes),
                            Err(e) => {
                                tracing::warn!("Failed to read response body: {}", e);
                                last_error = Some(Error::Http(e));
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Request failed for {} (attempt {}): {}",
                        url,
                        attempt + 1,
                        e
                    );
                    last_error = Some(Error::Http(e));
                }
            }

            if attempt < MAX_RETRIES - 1 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms *= 2;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::FeedParse(format!("Failed to fetch URL after {} retries: {}", MAX_RETRIES, url))
        }))
    }
}

#[async_trait]
impl DocumentSource for FeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Document> {
        tracing::debug!("Fetching feed from: {}", url);

        let content = self.fetch_with_retry(url).await?;
        ensure_content_size(content.len(), url)?;

        parse_document(&content)
    }
}

fn ensure_content_size(size: usize, url: &str) -> Result<()> {
    if size > MAX_FEED_BYTES {
        return Err(Error::FeedParse(format!(
            "Feed too large ({} bytes) for URL: {}",
            size,
            url
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_carry_user_agent() {
        let config = HttpConfig {
            user_agent: "feedhub-test/1.0".to_string(),
            ..HttpConfig::default()
        };
        let fetcher = FeedFetcher::new(&config).unwrap();

        let headers = fetcher.build_headers();
        assert_eq!(headers.get(USER_AGENT).unwrap(), "feedhub-test/1.0");
        assert!(headers.get(ACCEPT).unwrap().to_str().unwrap().contains("rss+xml"));
    }

    #[test]
    fn test_invalid_proxy_is_config_error() {
        let config = HttpConfig {
            proxy_url: Some("::not a proxy::".to_string()),
            ..HttpConfig::default()
        };
        assert!(matches!(FeedFetcher::new(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_content_size_cap() {
        assert!(ensure_content_size(1024, "https://example.com").is_ok());
        assert!(ensure_content_size(MAX_FEED_BYTES + 1, "https://example.com").is_err());
    }
}
