use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Minimum gap between the end of one request and the start of the next.
    pub min_interval: Duration,
}

impl RateLimitConfig {
    pub fn reddit_public() -> Self {
        Self {
            min_interval: Duration::from_secs(1), // ~60 requests per minute for unauthenticated clients
        }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self {
            min_interval: Duration::from_millis(millis),
        }
    }
}

/// Process-wide request throttle.
///
/// One permit exists at a time. The floor is measured from the moment the
/// previous permit was released, so a slow request pushes the next one back by
/// its own duration and the gap never drops below `min_interval`.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    last_completed: Arc<Mutex<Option<Instant>>>,
    permits_issued: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            last_completed: Arc::new(Mutex::new(None)),
            permits_issued: AtomicU64::new(0),
        }
    }

    pub async fn acquire_permit(&self) -> RateLimitPermit {
        let start_time = Instant::now();
        let guard = self.last_completed.clone().lock_owned().await;

        if let Some(last) = *guard {
            let ready_at = last + self.config.min_interval;
            if ready_at > Instant::now() {
                tracing::debug!(
                    "Rate limit floor reached, waiting {:?}",
                    ready_at - Instant::now()
                );
                sleep_until(ready_at).await;
            }
        }

        self.permits_issued.fetch_add(1, Ordering::Relaxed);

        RateLimitPermit {
            guard,
            queue_wait_time: start_time.elapsed(),
        }
    }

    pub fn get_rate_limit_status(&self) -> RateLimitStatus {
        let (in_flight, time_until_ready) = match self.last_completed.try_lock() {
            Ok(last) => {
                let remaining = (*last)
                    .map(|at| (at + self.config.min_interval).saturating_duration_since(Instant::now()))
                    .unwrap_or_default();
                (false, remaining)
            }
            Err(_) => (true, self.config.min_interval),
        };

        RateLimitStatus {
            min_interval: self.config.min_interval,
            in_flight,
            time_until_ready,
            permits_issued: self.permits_issued.load(Ordering::Relaxed),
        }
    }
}

/// Held for the full lifetime of a request; dropping it stamps the completion
/// time the next caller is measured against.
#[derive(Debug)]
pub struct RateLimitPermit {
    guard: OwnedMutexGuard<Option<Instant>>,
    pub queue_wait_time: Duration,
}

impl Drop for RateLimitPermit {
    fn drop(&mut self) {
        *self.guard = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub min_interval: Duration,
    pub in_flight: bool,
    pub time_until_ready: Duration,
    pub permits_issued: u64,
}
