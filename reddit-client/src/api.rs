use crate::merger::FetchStrategy;
use crate::metrics::{ApiMetrics, EndpointMetrics, MetricsCollector, RequestMetrics};
use crate::rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
use async_trait::async_trait;
use reqwest::Client;
use scout_core::{CoreError, ErrorExt, RedditApiError, RedditConfig};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

pub const REDDIT_PUBLIC_BASE: &str = "https://www.reddit.com";

/// Read-only JSON source.
///
/// `None` means "no data this round": transport errors, timeouts, non-2xx
/// statuses and undecodable bodies are all logged and folded into it.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn fetch_json(&self, url: &Url) -> Option<Value>;
}

/// Builds the public `.json` endpoints for listings and item threads.
#[derive(Debug, Clone)]
pub struct RedditEndpoints {
    base: Url,
}

impl RedditEndpoints {
    pub fn new(base_url: &str) -> Result<Self, CoreError> {
        let mut base = Url::parse(base_url).map_err(|e| RedditApiError::InvalidEndpoint {
            details: format!("{base_url}: {e}"),
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    pub fn listing(
        &self,
        source: &str,
        strategy: FetchStrategy,
        limit: u32,
    ) -> Result<Url, CoreError> {
        let mut url = self.join(&format!("r/{}/{}.json", checked_source(source)?, strategy.path()))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(window) = strategy.time_filter() {
                query.append_pair("t", window.as_str());
            }
            query.append_pair("limit", &limit.to_string());
        }
        Ok(url)
    }

    /// The item-plus-replies endpoint: a two-element array of listings.
    pub fn item_with_replies(
        &self,
        source: &str,
        item_id: &str,
        limit: u32,
    ) -> Result<Url, CoreError> {
        if item_id.is_empty() || !item_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(RedditApiError::InvalidEndpoint {
                details: format!("invalid item id {item_id:?}"),
            }
            .into());
        }
        let mut url = self.join(&format!(
            "r/{}/comments/{}.json",
            checked_source(source)?,
            item_id
        ))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }

    fn join(&self, path: &str) -> Result<Url, CoreError> {
        self.base.join(path).map_err(|e| {
            RedditApiError::InvalidEndpoint {
                details: format!("{path}: {e}"),
            }
            .into()
        })
    }
}

fn checked_source(source: &str) -> Result<&str, CoreError> {
    if source.is_empty() || !source.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(RedditApiError::InvalidEndpoint {
            details: format!("invalid source name {source:?}"),
        }
        .into());
    }
    Ok(source)
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    user_agent: String,
    timeout: Duration,
}

impl RedditApiClient {
    pub fn new(user_agent: String) -> Result<Self, CoreError> {
        Self::with_settings(
            user_agent,
            Duration::from_secs(10),
            Arc::new(RateLimiter::new(RateLimitConfig::reddit_public())),
        )
    }

    pub fn from_config(config: &RedditConfig) -> Result<Self, CoreError> {
        Self::with_settings(
            config.user_agent.clone(),
            Duration::from_secs(config.request_timeout_secs),
            Arc::new(RateLimiter::new(RateLimitConfig::from_millis(
                config.request_interval_ms,
            ))),
        )
    }

    /// `rate_limiter` may be shared with other clients; the floor is global to it.
    pub fn with_settings(
        user_agent: String,
        timeout: Duration,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter,
            metrics: Arc::new(MetricsCollector::new()),
            user_agent,
            timeout,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    async fn request_json(&self, url: &Url) -> Result<Value, CoreError> {
        // Held until the body is read so the floor counts from completion.
        let permit = self.rate_limiter.acquire_permit().await;
        debug!(
            "Acquired rate limit permit for {} after {:?}",
            url.path(),
            permit.queue_wait_time
        );

        let start_time = Instant::now();
        let mut status_code = None;
        let result = self.send(url, &mut status_code).await;

        let timed_out = matches!(
            result,
            Err(CoreError::RedditApi(RedditApiError::RequestTimeout { .. }))
        );
        self.metrics
            .record_request(RequestMetrics {
                endpoint: url.path().to_string(),
                status_code,
                response_time: start_time.elapsed(),
                success: result.is_ok(),
                timed_out,
            })
            .await;

        drop(permit);
        result
    }

    async fn send(&self, url: &Url, status_code: &mut Option<u16>) -> Result<Value, CoreError> {
        let timeout_error = |e: reqwest::Error| -> CoreError {
            if e.is_timeout() {
                RedditApiError::RequestTimeout {
                    url: url.to_string(),
                }
                .into()
            } else {
                CoreError::Network(e)
            }
        };

        info!("Making Reddit API request: GET {}", url);
        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(timeout_error)?;

        let status = response.status();
        *status_code = Some(status.as_u16());
        if !status.is_success() {
            return Err(RedditApiError::HttpStatus {
                url: url.to_string(),
                status_code: status.as_u16(),
            }
            .into());
        }

        let body = response.bytes().await.map_err(timeout_error)?;
        serde_json::from_slice(&body).map_err(|e| {
            RedditApiError::InvalidResponse {
                url: url.to_string(),
                details: e.to_string(),
            }
            .into()
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.get_metrics().await
    }

    pub async fn metrics_for(&self, endpoint: &str) -> Option<EndpointMetrics> {
        self.metrics.get_endpoint_metrics(endpoint).await
    }

    pub fn get_rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.get_rate_limit_status()
    }

    pub async fn reset_metrics(&self) {
        self.metrics.reset_metrics().await;
    }
}

#[async_trait]
impl JsonFetcher for RedditApiClient {
    async fn fetch_json(&self, url: &Url) -> Option<Value> {
        match self.request_json(url).await {
            Ok(value) => Some(value),
            Err(e) => {
                e.log_warn();
                None
            }
        }
    }
}
