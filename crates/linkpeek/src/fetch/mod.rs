//! Network fetcher: one HTTP GET, cache-preferring, fixed timeout.
//!
//! Not a browser, just a request. No retry: a failed attempt yields nothing
//! and the caller moves on to the fallback render.

pub mod cache;

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::USER_AGENT;
use url::Url;

use crate::config::{CachePolicy, ResolverConfig, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use crate::types::{PreviewError, PreviewResult};

pub use cache::ResponseCache;

/// Parameters for a single fetch. Built per call, never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: Url,
    pub cache_policy: CachePolicy,
    pub timeout: Duration,
    /// Overrides the client's user agent when set.
    pub user_agent: Option<String>,
}

impl FetchRequest {
    /// A page request with the crawler user agent and the default policy.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            cache_policy: CachePolicy::ReturnCacheElseLoad,
            timeout: DEFAULT_TIMEOUT,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
        }
    }

    /// A page request using the resolver's configured policy, timeout and agent.
    pub fn from_config(url: Url, config: &ResolverConfig) -> Self {
        Self {
            url,
            cache_policy: config.cache_policy,
            timeout: config.timeout,
            user_agent: Some(config.user_agent.clone()),
        }
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn without_user_agent(mut self) -> Self {
        self.user_agent = None;
        self
    }
}

/// HTTP fetcher over an injected `reqwest::Client` and response cache.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    cache: Arc<ResponseCache>,
}

impl Fetcher {
    pub fn new(client: reqwest::Client, cache: Arc<ResponseCache>) -> Self {
        Self { client, cache }
    }

    /// Build a client suitable for page fetches, with redirects limited to 5.
    pub fn default_client() -> PreviewResult<reqwest::Client> {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| PreviewError::Fetch(format!("failed to build HTTP client: {e}")))
    }

    /// Fetcher with a fresh client and a cache sized from `config`.
    pub fn from_config(config: &ResolverConfig) -> PreviewResult<Self> {
        Ok(Self::new(
            Self::default_client()?,
            Arc::new(ResponseCache::new(config.cache_capacity)),
        ))
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Fetch the body, or `None` on timeout, transport error or non-2xx.
    pub async fn fetch(&self, request: &FetchRequest) -> Option<Vec<u8>> {
        match self.try_fetch(request).await {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::warn!(url = %request.url, "{e}");
                None
            }
        }
    }

    /// Same as [`Fetcher::fetch`] but keeps the failure reason.
    pub async fn try_fetch(&self, request: &FetchRequest) -> PreviewResult<Vec<u8>> {
        let key = request.url.as_str();

        if request.cache_policy == CachePolicy::ReturnCacheElseLoad {
            if let Some(body) = self.cache.get(key).await {
                tracing::debug!(url = %request.url, bytes = body.len(), "fetch.cache_hit");
                return Ok(body.to_vec());
            }
        }

        let mut builder = self
            .client
            .get(request.url.clone())
            .timeout(request.timeout);
        if let Some(ua) = &request.user_agent {
            builder = builder.header(USER_AGENT, ua.as_str());
        }

        tracing::debug!(
            url = %request.url,
            timeout_ms = request.timeout.as_millis() as u64,
            "fetch.start"
        );
        let t0 = Instant::now();

        let response = builder
            .send()
            .await
            .map_err(|e| describe_transport_error(&e, request.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PreviewError::Fetch(format!("server returned {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| describe_transport_error(&e, request.timeout))?;

        tracing::debug!(
            url = %request.url,
            %status,
            bytes = body.len(),
            duration_ms = t0.elapsed().as_millis() as u64,
            "fetch.done"
        );

        self.cache.insert(key, &body).await;
        Ok(body.to_vec())
    }
}

fn describe_transport_error(err: &reqwest::Error, timeout: Duration) -> PreviewError {
    if err.is_timeout() {
        PreviewError::Fetch(format!("timed out after {}ms", timeout.as_millis()))
    } else if err.is_connect() {
        PreviewError::Fetch(format!("connection failed: {err}"))
    } else {
        PreviewError::Fetch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req = FetchRequest::new(Url::parse("https://example.com").unwrap());
        assert_eq!(req.timeout, Duration::from_secs(10));
        assert_eq!(req.user_agent.as_deref(), Some("Facebot"));
        assert_eq!(req.cache_policy, CachePolicy::ReturnCacheElseLoad);
    }

    #[test]
    fn test_request_from_config() {
        let cfg = ResolverConfig {
            timeout: Duration::from_millis(750),
            user_agent: "TestBot".into(),
            cache_policy: CachePolicy::ReloadIgnoringCache,
            ..Default::default()
        };
        let req = FetchRequest::from_config(Url::parse("https://example.com").unwrap(), &cfg);
        assert_eq!(req.timeout, Duration::from_millis(750));
        assert_eq!(req.user_agent.as_deref(), Some("TestBot"));
        assert_eq!(req.cache_policy, CachePolicy::ReloadIgnoringCache);
        assert!(req.without_user_agent().user_agent.is_none());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let cache = Arc::new(ResponseCache::new(8));
        // Port 9 (discard) on localhost: any network attempt would fail.
        let url = Url::parse("http://127.0.0.1:9/page").unwrap();
        cache.insert(url.as_str(), b"<html></html>").await;

        let fetcher = Fetcher::new(reqwest::Client::new(), cache);
        let body = fetcher
            .fetch(&FetchRequest::new(url.clone()).with_timeout(Duration::from_millis(200)))
            .await;
        assert_eq!(body.as_deref(), Some(&b"<html></html>"[..]));

        let reload = fetcher
            .fetch(
                &FetchRequest::new(url)
                    .with_cache_policy(CachePolicy::ReloadIgnoringCache)
                    .with_timeout(Duration::from_millis(200)),
            )
            .await;
        assert!(reload.is_none());
    }
}
