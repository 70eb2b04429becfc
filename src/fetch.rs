//! Full-resource fetching.
//!
//! One fetcher serves both delivery branches: the direct branch builds it
//! with no proxy, the anonymized branch points it at the local tor proxy.
//! A fetch is a single attempt; retry policy, if any, belongs to the caller.

use std::time::Duration;

use thiserror::Error;

/// User agent sent on every request.
pub const USER_AGENT: &str = concat!("mirracquire/", env!("CARGO_PKG_VERSION"));

/// A failed fetch, always naming the URL attempted.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to fetch {url}: server returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    #[error("invalid proxy address {proxy}: {source}")]
    Proxy {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },
}

/// HTTP fetcher with a long timeout and optional outbound proxy.
#[derive(Debug)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    /// Create a fetcher making direct connections.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Self::build(timeout, None)
    }

    /// Create a fetcher routing every request through `proxy_url`
    /// (`http://...` or `socks5h://...`).
    pub fn with_proxy(timeout: Duration, proxy_url: &str) -> Result<Self, FetchError> {
        Self::build(timeout, Some(proxy_url))
    }

    fn build(timeout: Duration, proxy_url: Option<&str>) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .gzip(true)
            .brotli(true);

        if let Some(proxy_url) = proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| FetchError::Proxy {
                proxy: proxy_url.to_string(),
                source: e,
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(FetchError::Client)?;
        Ok(Self { client })
    }

    /// Fetch the full response body as text. Single attempt, no retries.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        response.text().await.map_err(|e| FetchError::Http {
            url: url.to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn serve_once(response: &'static [u8]) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(response).await;
        });
        addr
    }

    #[tokio::test]
    async fn test_fetch_text_returns_body() {
        let addr = serve_once(
            b"HTTP/1.1 200 OK\r\ncontent-length: 11\r\nconnection: close\r\n\r\nhello world",
        )
        .await;

        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
        let text = fetcher
            .fetch_text(&format!("http://{}/index.txt", addr))
            .await
            .unwrap();

        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn test_fetch_error_names_url() {
        let addr = serve_once(
            b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let url = format!("http://{}/missing.txt", addr);

        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch_text(&url).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains(&url));
        assert!(message.contains("404"));
    }

    #[tokio::test]
    async fn test_invalid_proxy_rejected() {
        let err = Fetcher::with_proxy(Duration::from_secs(5), "not a proxy url").unwrap_err();
        assert!(matches!(err, FetchError::Proxy { .. }));
    }
}
