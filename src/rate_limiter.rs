// =============================================================================
// rate_limiter.rs — PER-HOST TOKEN BUCKET
// =============================================================================
//
// A small token-bucket limiter keyed by host, following the same
// parking_lot::RwLock-guarded-inner-state shape as `circuit_breaker.rs`.
// Each host gets its own bucket, refilled continuously at its configured
// rate, capped at one second's worth of burst.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::errors::SpiderError;

struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(rps: u32) -> Self {
        let capacity = rps.max(1) as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = Instant::now();
    }

    fn try_take(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// A per-host token-bucket rate limiter. Hosts that have never been seen
/// get a bucket sized from `default_rps` unless `rps_override` names
/// them explicitly.
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, Bucket>>,
    default_rps: u32,
    rps_override: HashMap<String, u32>,
    starvation_timeout: Duration,
}

impl RateLimiter {
    pub fn new(default_rps: u32, rps_override: HashMap<String, u32>) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            default_rps,
            rps_override,
            starvation_timeout: Duration::from_secs(15),
        }
    }

    fn rps_for(&self, host: &str) -> u32 {
        self.rps_override
            .get(host)
            .copied()
            .unwrap_or(self.default_rps)
    }

    /// Block (via short async sleeps) until a token for `host` is
    /// available, or return `SpiderError::RateLimited` if none becomes
    /// available within the starvation timeout.
    pub async fn acquire(&self, host: &str) -> Result<(), SpiderError> {
        let deadline = Instant::now() + self.starvation_timeout;
        loop {
            {
                let mut buckets = self.buckets.write();
                let bucket = buckets
                    .entry(host.to_string())
                    .or_insert_with(|| Bucket::new(self.rps_for(host)));
                if bucket.try_take() {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(SpiderError::RateLimited {
                    host: host.to_string(),
                    waited: self.starvation_timeout,
                });
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_succeeds_within_burst_capacity() {
        let limiter = RateLimiter::new(5, HashMap::new());
        for _ in 0..5 {
            limiter.acquire("example.org").await.unwrap();
        }
    }

    #[tokio::test]
    async fn acquire_refills_over_time() {
        let limiter = RateLimiter::new(5, HashMap::new());
        for _ in 0..5 {
            limiter.acquire("example.org").await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
        limiter.acquire("example.org").await.unwrap();
    }

    #[tokio::test]
    async fn per_host_override_applies() {
        let mut overrides = HashMap::new();
        overrides.insert("doem.org.br".to_string(), 3);
        let limiter = RateLimiter::new(5, overrides);
        for _ in 0..3 {
            limiter.acquire("doem.org.br").await.unwrap();
        }
        let buckets = limiter.buckets.read();
        assert!(buckets.get("doem.org.br").unwrap().tokens < 1.0);
    }

    #[tokio::test]
    async fn buckets_are_independent_per_host() {
        let limiter = RateLimiter::new(2, HashMap::new());
        limiter.acquire("a.example.org").await.unwrap();
        limiter.acquire("a.example.org").await.unwrap();
        // b's bucket is untouched by a's exhaustion.
        limiter.acquire("b.example.org").await.unwrap();
    }
}
