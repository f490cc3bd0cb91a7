//! Static fetcher wrapping reqwest.
//!
//! Not a browser — a single GET with browser-like headers. Handles redirects,
//! timeouts, retry on 5xx, and exponential backoff on 429. Pages that need
//! script execution go through [`crate::renderer`] instead.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

/// A page fetched over plain HTTP, plus timing/size metadata.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Original requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
    /// Body size in bytes.
    pub byte_size: usize,
    /// Wall-clock fetch time.
    pub elapsed_ms: u64,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Raw bytes fetched for a media URL.
#[derive(Debug, Clone)]
pub struct FetchedBytes {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// HTTP client for the static strategy and the downloader.
#[derive(Clone)]
pub struct StaticFetcher {
    client: reqwest::Client,
    /// HTTP/1.1-only fallback client for sites that reject HTTP/2.
    h1_client: reqwest::Client,
}

impl StaticFetcher {
    /// Create a new fetcher with a standard Chrome user-agent.
    pub fn new(timeout_ms: u64) -> Self {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                  AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/131.0.0.0 Safari/537.36";

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .build()
            .unwrap_or_default();

        let h1_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .http1_only()
            .build()
            .unwrap_or_default();

        Self { client, h1_client }
    }

    /// Perform a single GET with retry on 5xx and backoff on 429.
    ///
    /// Falls back to HTTP/1.1 on protocol errors (some CDNs reject HTTP/2).
    /// Returns `Err` only on transport failure; a non-2xx response comes back
    /// as a `FetchedPage` and the caller decides what a bad status means.
    pub async fn get(&self, url: &str, timeout_ms: u64) -> Result<FetchedPage> {
        match self.get_inner(&self.client, url, timeout_ms).await {
            Ok(page) => Ok(page),
            Err(e) => {
                let err_str = format!("{e}");
                if err_str.contains("http2")
                    || err_str.contains("protocol")
                    || err_str.contains("connection closed")
                {
                    self.get_inner(&self.h1_client, url, timeout_ms).await
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn get_inner(
        &self,
        client: &reqwest::Client,
        url: &str,
        timeout_ms: u64,
    ) -> Result<FetchedPage> {
        let start = Instant::now();
        let mut retries = 0u32;
        let max_retries = 2;

        loop {
            let resp = client
                .get(url)
                .timeout(Duration::from_millis(timeout_ms))
                .send()
                .await;

            match resp {
                Ok(r) => {
                    let status = r.status().as_u16();
                    let final_url = r.url().to_string();

                    // Retry on 5xx
                    if status >= 500 && retries < max_retries {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    // Backoff on 429
                    if status == 429 && retries < max_retries {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        tokio::time::sleep(Duration::from_secs(retry_after.min(10))).await;
                        continue;
                    }

                    let body = r.text().await.unwrap_or_default();
                    let byte_size = body.len();

                    return Ok(FetchedPage {
                        url: url.to_string(),
                        final_url,
                        status,
                        body,
                        byte_size,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    });
                }
                Err(e) => {
                    if retries < max_retries {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// GET raw bytes with the declared content type, for media downloads.
    ///
    /// No retry here — the downloader treats each item as best-effort and a
    /// failed item never blocks its siblings.
    pub async fn get_bytes(&self, url: &str, timeout_ms: u64) -> Result<FetchedBytes> {
        let r = self
            .client
            .get(url)
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await?;

        let status = r.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(anyhow!("unexpected status {status} for {url}"));
        }

        let content_type = r
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = r.bytes().await?.to_vec();

        Ok(FetchedBytes {
            url: url.to_string(),
            status,
            content_type,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_creation() {
        let fetcher = StaticFetcher::new(10_000);
        let _ = fetcher;
    }

    #[test]
    fn test_is_success_range() {
        let mut page = FetchedPage {
            url: "https://example.com".into(),
            final_url: "https://example.com".into(),
            status: 200,
            body: String::new(),
            byte_size: 0,
            elapsed_ms: 0,
        };
        assert!(page.is_success());
        page.status = 204;
        assert!(page.is_success());
        page.status = 404;
        assert!(!page.is_success());
        page.status = 301;
        assert!(!page.is_success());
    }
}
