//! HTTP client for marketplace pages with per-host rate limiting
//!
//! One GET per call with a constant browser-like header set. There is no
//! retry: a failure is reported for that URL only and the caller decides to
//! skip. Every request first waits for its host's slot in a keyed
//! `governor` limiter, so the minimum spacing per host holds no matter how
//! many terms run concurrently.

use std::time::Duration;

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
};
use reqwest::{
    Client,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER, USER_AGENT},
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::config::AppConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("network failure for {url}: {message}")]
    Network { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} cancelled")]
    Cancelled { url: String },
}

impl FetchError {
    fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { url: url.to_string() }
        } else {
            Self::Network { url: url.to_string(), message: err.to_string() }
        }
    }
}

/// Anything that can return the raw markup of a URL.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<String, FetchError>;
}

/// HTTP client configuration for crawling
#[derive(Debug, Clone, serde::Serialize)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub referer: String,
    pub timeout_seconds: u64,
    /// Minimum spacing between two requests to the same host
    pub per_host_interval: Duration,
}

impl From<&AppConfig> for HttpClientConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.marketplace.user_agent.clone(),
            accept: config.marketplace.accept.clone(),
            accept_language: config.marketplace.accept_language.clone(),
            referer: config.marketplace.site_url.clone(),
            timeout_seconds: config.marketplace.request_timeout_secs,
            per_host_interval: Duration::from_millis(config.crawl.per_host_interval_ms),
        }
    }
}

type HostRateLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate-limited HTTP client shared by every request of a run
pub struct HttpClient {
    client: Client,
    rate_limiter: HostRateLimiter,
    config: HttpClientConfig,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration
    pub fn new(config: HttpClientConfig) -> Result<Self, FetchError> {
        let header = |name: &str, value: &str| {
            HeaderValue::from_str(value).map_err(|e| FetchError::InvalidUrl {
                url: String::new(),
                reason: format!("invalid {name} header: {e}"),
            })
        };

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header("User-Agent", &config.user_agent)?);
        headers.insert(ACCEPT, header("Accept", &config.accept)?);
        headers.insert(ACCEPT_LANGUAGE, header("Accept-Language", &config.accept_language)?);
        headers.insert(REFERER, header("Referer", &config.referer)?);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .map_err(|e| FetchError::Network { url: String::new(), message: e.to_string() })?;

        let quota =
            Quota::with_period(config.per_host_interval).ok_or_else(|| FetchError::InvalidUrl {
                url: String::new(),
                reason: "per-host interval must be greater than 0".to_string(),
            })?;

        Ok(Self {
            client,
            rate_limiter: RateLimiter::keyed(quota),
            config,
        })
    }

    /// Waits until `host` may receive another request.
    pub async fn wait_turn(&self, host: &str) {
        self.rate_limiter.until_key_ready(&host.to_string()).await;
    }

    /// Fetch URL and return text content, racing cancellation at every
    /// suspension point.
    pub async fn get_text_with_cancellation(
        &self,
        url: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<String, FetchError> {
        let cancelled = || FetchError::Cancelled { url: url.to_string() };
        if cancellation_token.is_cancelled() {
            return Err(cancelled());
        }

        let host = host_of(url)?;

        tokio::select! {
            () = self.wait_turn(&host) => {},
            () = cancellation_token.cancelled() => return Err(cancelled()),
        }

        debug!("Fetching URL: {}", url);

        let response = tokio::select! {
            result = self.client.get(url).send() => {
                result.map_err(|e| FetchError::from_reqwest(url, &e))?
            },
            () = cancellation_token.cancelled() => {
                warn!("🛑 HTTP request cancelled for URL: {}", url);
                return Err(cancelled());
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url: url.to_string(), status: status.as_u16() });
        }

        let text = tokio::select! {
            result = response.text() => result.map_err(|e| FetchError::from_reqwest(url, &e))?,
            () = cancellation_token.cancelled() => return Err(cancelled()),
        };

        debug!("Successfully fetched: {} ({} chars)", url, text.len());
        Ok(text)
    }

    /// Get the configuration
    pub const fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

#[async_trait]
impl PageSource for HttpClient {
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<String, FetchError> {
        self.get_text_with_cancellation(url, cancel).await
    }
}

fn host_of(url: &str) -> Result<String, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    parsed
        .host_str()
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: "no host".to_string(),
        })
}

/// Listing URL for a term: `{base}/{percent-encoded term}`.
pub fn search_url(base_url: &str, term: &str) -> Result<String, FetchError> {
    let invalid = |reason: String| FetchError::InvalidUrl { url: base_url.to_string(), reason };
    let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("cannot be a base URL".to_string()))?
        .pop_if_empty()
        .push(term.trim());
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(interval_ms: u64) -> HttpClientConfig {
        let mut app = AppConfig::default();
        app.crawl.per_host_interval_ms = interval_ms;
        app.marketplace.request_timeout_secs = 5;
        HttpClientConfig::from(&app)
    }

    /// Serves one canned HTTP response per connection.
    async fn serve(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}/")
    }

    #[test]
    fn search_url_percent_encodes_term() {
        assert_eq!(
            search_url("https://lista.mercadolivre.com.br", "cartucho hp 664").unwrap(),
            "https://lista.mercadolivre.com.br/cartucho%20hp%20664"
        );
        assert_eq!(
            search_url("https://lista.mercadolivre.com.br/", "tinta/preta").unwrap(),
            "https://lista.mercadolivre.com.br/tinta%2Fpreta"
        );
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let mut cfg = config(1000);
        cfg.per_host_interval = Duration::ZERO;
        assert!(HttpClient::new(cfg).is_err());
    }

    #[tokio::test]
    async fn same_host_requests_are_spaced() {
        let client = HttpClient::new(config(200)).unwrap();
        let start = Instant::now();
        client.wait_turn("lista.mercadolivre.com.br").await;
        client.wait_turn("lista.mercadolivre.com.br").await;
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn different_hosts_do_not_wait_for_each_other() {
        let client = HttpClient::new(config(2000)).unwrap();
        let start = Instant::now();
        client.wait_turn("lista.mercadolivre.com.br").await;
        client.wait_turn("produto.mercadolivre.com.br").await;
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn returns_body_on_success() {
        let url = serve(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 11\r\n\
             Connection: close\r\n\r\n<p>ola</p>\n",
        )
        .await;
        let client = HttpClient::new(config(10)).unwrap();
        let body = client.fetch(&url, &CancellationToken::new()).await.unwrap();
        assert_eq!(body, "<p>ola</p>\n");
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let url =
            serve("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let client = HttpClient::new(config(10)).unwrap();
        let err = client.fetch(&url, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let client = HttpClient::new(config(10)).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = client.fetch("http://127.0.0.1:9/", &token).await.unwrap_err();
        assert!(matches!(err, FetchError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn invalid_url_is_reported() {
        let client = HttpClient::new(config(10)).unwrap();
        let err = client.fetch("not a url", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }
}
