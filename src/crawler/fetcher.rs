//! HTTP fetcher implementation
//!
//! This module performs every network call the crawler makes:
//! - Building HTTP clients with a fixed identifying user agent and timeouts
//! - GET requests returning the raw body as opaque content
//! - Transport-level retry for connection failures
//! - Classifying responses into success, transient and terminal outcomes

use crate::config::{FetchConfig, UserAgentConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Pause between transport-level attempts, multiplied by the attempt number
const TRANSPORT_RETRY_STEP: Duration = Duration::from_millis(200);

/// Raw content returned by a successful fetch
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: Url,

    /// Final URL after redirects
    pub final_url: Url,

    /// HTTP status code
    pub status_code: u16,

    /// Content-Type header value
    pub content_type: Option<String>,

    /// Response body
    pub body: String,
}

/// Result of a single fetch attempt
#[derive(Debug)]
pub enum FetchOutcome {
    /// 2xx response with a readable body
    Success(FetchedPage),

    /// Worth retrying: network failure, timeout, 5xx, 429
    Transient {
        /// HTTP status, absent for network failures
        status_code: Option<u16>,
        /// Server-provided Retry-After hint
        retry_after: Option<Duration>,
        /// Error description
        error: String,
    },

    /// Never retried: 4xx other than 429, unusable request
    Terminal {
        /// HTTP status code (0 when the request could not be built)
        status_code: u16,
        /// Error description
        error: String,
    },
}

/// Error returned once the scheduler stops trying a URL
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("HTTP {status_code} for {url}: {message}")]
    Terminal {
        url: String,
        status_code: u16,
        message: String,
    },

    #[error("Gave up on {url} after {attempts} attempts: {message}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        status_code: Option<u16>,
        message: String,
    },

    #[error("Fetch of {url} cancelled after {attempts} attempts")]
    Cancelled {
        url: String,
        attempts: u32,
        status_code: Option<u16>,
    },
}

impl FetchError {
    /// HTTP status of the last attempt, if a response was received
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Terminal { status_code, .. } if *status_code > 0 => Some(*status_code),
            Self::Terminal { .. } => None,
            Self::RetriesExhausted { status_code, .. } => *status_code,
            Self::Cancelled { status_code, .. } => *status_code,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// True when the run was cancelled before any request for the URL went out
    pub fn is_cancelled_unattempted(&self) -> bool {
        matches!(self, Self::Cancelled { attempts: 0, .. })
    }
}

/// The network seam used by the scheduler and the access policy checker
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Performs one logical GET of `url`
    async fn fetch(&self, url: &Url) -> FetchOutcome;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - Identification sent with every request
/// * `fetch` - Timeouts
///
/// # Example
///
/// ```no_run
/// use catalog_crawler::config::{FetchConfig, UserAgentConfig};
/// use catalog_crawler::crawler::build_http_client;
///
/// let user_agent = UserAgentConfig {
///     crawler_name: "CatalogCrawler".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&user_agent, &FetchConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    fetch: &FetchConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(fetch.timeout_secs))
        .connect_timeout(Duration::from_secs(fetch.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    transport_retries: u32,
}

impl HttpFetcher {
    pub fn new(client: Client, transport_retries: u32) -> Self {
        Self {
            client,
            transport_retries,
        }
    }

    /// Builds the client from configuration
    pub fn from_config(
        user_agent: &UserAgentConfig,
        fetch: &FetchConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = build_http_client(user_agent, fetch)?;
        Ok(Self::new(client, fetch.transport_retries))
    }

    async fn fetch_once(&self, url: &Url) -> Result<FetchOutcome, reqwest::Error> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if status.is_success() {
            let final_url = response.url().clone();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            return Ok(match response.text().await {
                Ok(body) => FetchOutcome::Success(FetchedPage {
                    url: url.clone(),
                    final_url,
                    status_code: status.as_u16(),
                    content_type,
                    body,
                }),
                Err(e) => FetchOutcome::Transient {
                    status_code: Some(status.as_u16()),
                    retry_after: None,
                    error: format!("Failed to read body: {}", e),
                },
            });
        }

        let retry_after = parse_retry_after(response.headers(), Utc::now());
        Ok(classify_status(status, retry_after))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    /// Fetches a URL, retrying connection failures locally
    ///
    /// | Condition | Outcome |
    /// |-----------|---------|
    /// | 2xx | Success |
    /// | 429, 5xx | Transient (with Retry-After if sent) |
    /// | other status | Terminal |
    /// | connect error | retried `transport_retries` times, then Transient |
    /// | timeout / body error | Transient |
    /// | request could not be built | Terminal |
    async fn fetch(&self, url: &Url) -> FetchOutcome {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(outcome) => return outcome,
                Err(e) if e.is_connect() && attempt < self.transport_retries => {
                    attempt += 1;
                    tracing::debug!(
                        url = %url,
                        attempt,
                        error = %e,
                        "Connection failed, retrying at transport level"
                    );
                    tokio::time::sleep(TRANSPORT_RETRY_STEP * attempt).await;
                }
                Err(e) => return classify_error(&e),
            }
        }
    }
}

/// Maps a non-success status to an outcome
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>) -> FetchOutcome {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        FetchOutcome::Transient {
            status_code: Some(status.as_u16()),
            retry_after,
            error: format!("HTTP {}", status.as_u16()),
        }
    } else {
        FetchOutcome::Terminal {
            status_code: status.as_u16(),
            error: format!("HTTP {}", status.as_u16()),
        }
    }
}

fn classify_error(e: &reqwest::Error) -> FetchOutcome {
    if e.is_builder() {
        return FetchOutcome::Terminal {
            status_code: 0,
            error: e.to_string(),
        };
    }

    let error = if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        e.to_string()
    };

    FetchOutcome::Transient {
        status_code: e.status().map(|s| s.as_u16()),
        retry_after: None,
        error,
    }
}

/// Reads a Retry-After header given as delta-seconds or an HTTP date
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn test_fetcher() -> HttpFetcher {
        HttpFetcher::from_config(&create_test_config(), &FetchConfig::default()).unwrap()
    }

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&create_test_config(), &FetchConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, None),
            FetchOutcome::Transient { status_code: Some(429), .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, None),
            FetchOutcome::Transient { status_code: Some(502), .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, None),
            FetchOutcome::Terminal { status_code: 404, .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, None),
            FetchOutcome::Terminal { status_code: 403, .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::REQUEST_TIMEOUT, None),
            FetchOutcome::Terminal { status_code: 408, .. }
        ));
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));
        assert_eq!(
            parse_retry_after(&headers, Utc::now()),
            Some(Duration::from_secs(120))
        );
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let now = DateTime::parse_from_rfc2822("Wed, 21 Oct 2015 07:28:00 GMT")
            .unwrap()
            .with_timezone(&Utc);
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:30 GMT"),
        );
        assert_eq!(
            parse_retry_after(&headers, now),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_parse_retry_after_missing_or_garbage() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers, Utc::now()), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers, Utc::now()), None);
    }

    #[tokio::test]
    async fn test_fetch_success_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/item/1"))
            .and(header(
                "user-agent",
                "TestCrawler/1.0 (+https://example.com/about; admin@example.com)",
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html>item</html>", "text/html"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/item/1", server.uri())).unwrap();
        match test_fetcher().fetch(&url).await {
            FetchOutcome::Success(page) => {
                assert_eq!(page.status_code, 200);
                assert_eq!(page.body, "<html>item</html>");
                assert_eq!(page.content_type.as_deref(), Some("text/html"));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_rate_limited_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/item/1", server.uri())).unwrap();
        match test_fetcher().fetch(&url).await {
            FetchOutcome::Transient {
                status_code,
                retry_after,
                ..
            } => {
                assert_eq!(status_code, Some(429));
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("expected transient, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_not_found_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        assert!(matches!(
            test_fetcher().fetch(&url).await,
            FetchOutcome::Terminal {
                status_code: 404,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_transient() {
        // Nothing listens on port 9 (discard) in the test environment
        let fetcher = HttpFetcher::new(
            build_http_client(&create_test_config(), &FetchConfig::default()).unwrap(),
            1,
        );
        let url = Url::parse("http://127.0.0.1:9/item").unwrap();
        assert!(matches!(
            fetcher.fetch(&url).await,
            FetchOutcome::Transient {
                status_code: None,
                ..
            }
        ));
    }
}
