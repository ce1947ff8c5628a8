use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

/// Outcome of a single outbound fetch.
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    /// Path only; query strings are dropped so per-endpoint stats aggregate.
    pub endpoint: String,
    pub status_code: Option<u16>,
    pub response_time: Duration,
    pub success: bool,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub timed_out_requests: u64,
    pub total_response_time: Duration,
    pub last_request_time: Option<SystemTime>,
    pub requests_by_endpoint: HashMap<String, EndpointMetrics>,
}

impl ApiMetrics {
    pub fn average_response_time(&self) -> Duration {
        if self.total_requests == 0 {
            Duration::ZERO
        } else {
            self.total_response_time / self.total_requests as u32
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointMetrics {
    pub request_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub last_status: Option<u16>,
}

impl EndpointMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.request_count as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<ApiMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_request(&self, request: RequestMetrics) {
        let mut metrics = self.metrics.write().await;

        metrics.total_requests += 1;
        metrics.total_response_time += request.response_time;
        metrics.last_request_time = Some(SystemTime::now());
        if request.success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }
        if request.timed_out {
            metrics.timed_out_requests += 1;
        }

        let endpoint = metrics
            .requests_by_endpoint
            .entry(request.endpoint)
            .or_default();
        endpoint.request_count += 1;
        endpoint.last_status = request.status_code;
        if request.success {
            endpoint.success_count += 1;
        } else {
            endpoint.error_count += 1;
        }
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn get_endpoint_metrics(&self, endpoint: &str) -> Option<EndpointMetrics> {
        self.metrics
            .read()
            .await
            .requests_by_endpoint
            .get(endpoint)
            .cloned()
    }

    pub async fn reset_metrics(&self) {
        *self.metrics.write().await = ApiMetrics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(endpoint: &str, success: bool, timed_out: bool) -> RequestMetrics {
        RequestMetrics {
            endpoint: endpoint.to_string(),
            status_code: if timed_out { None } else if success { Some(200) } else { Some(503) },
            response_time: Duration::from_millis(100),
            success,
            timed_out,
        }
    }

    #[tokio::test]
    async fn test_totals_and_endpoints() {
        let collector = MetricsCollector::new();

        collector.record_request(request("/r/TOEFL/hot.json", true, false)).await;
        collector.record_request(request("/r/TOEFL/hot.json", false, false)).await;
        collector.record_request(request("/r/TOEFL/new.json", false, true)).await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_requests, 3);
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(metrics.failed_requests, 2);
        assert_eq!(metrics.timed_out_requests, 1);
        assert_eq!(metrics.average_response_time(), Duration::from_millis(100));
        assert!(metrics.last_request_time.is_some());

        let hot = collector.get_endpoint_metrics("/r/TOEFL/hot.json").await.unwrap();
        assert_eq!(hot.request_count, 2);
        assert_eq!(hot.success_rate(), 0.5);
        assert_eq!(hot.last_status, Some(503));

        assert!(collector.get_endpoint_metrics("/r/TOEFL/top.json").await.is_none());
    }

    #[tokio::test]
    async fn test_reset() {
        let collector = MetricsCollector::new();
        collector.record_request(request("/r/TOEFL/hot.json", true, false)).await;

        collector.reset_metrics().await;
        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_requests, 0);
        assert_eq!(metrics.average_response_time(), Duration::ZERO);
    }
}
