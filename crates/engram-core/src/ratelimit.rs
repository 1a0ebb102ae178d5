//! Rate Limiter
//!
//! Token-bucket admission control: one global umbrella bucket plus per-class
//! buckets for the expensive operations. `allow` never blocks; a rejection
//! carries the wait that would make the next attempt succeed.
//!
//! Buckets refill continuously: every observation credits
//! `elapsed_seconds * refill_rate` tokens, capped at capacity.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::RateLimitConfig;

/// Outcome of an admission check
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowResult {
    pub allowed: bool,
    /// Which bucket decided: "disabled", "global", or the class name.
    pub limit_type: String,
    /// Suggested wait before retrying, present on rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
    /// Whole tokens left in the deciding bucket.
    pub remaining: u64,
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterMetrics {
    pub allowed_total: u64,
    pub rejected_total: u64,
    pub allowed_by_class: HashMap<String, u64>,
    pub rejected_by_class: HashMap<String, u64>,
    pub rejected_by_limit_type: HashMap<String, u64>,
    /// Requests per second since the limiter was created.
    pub requests_per_second: f64,
    pub uptime_seconds: f64,
}

#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(refill_rate: f64, capacity: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait until one token is available, assuming no other consumers.
    fn wait_for_token(&self) -> Duration {
        if self.tokens >= 1.0 || self.refill_rate <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
    }

    fn remaining(&self) -> u64 {
        self.tokens.max(0.0) as u64
    }
}

#[derive(Default)]
struct Counters {
    allowed_total: AtomicU64,
    rejected_total: AtomicU64,
    by_class: Mutex<HashMap<String, (u64, u64)>>,
    by_limit_type: Mutex<HashMap<String, u64>>,
}

/// Token-bucket admission control
pub struct RateLimiter {
    enabled: bool,
    global: Mutex<TokenBucket>,
    classes: HashMap<String, Mutex<TokenBucket>>,
    counters: Counters,
    started: Instant,
}

impl RateLimiter {
    /// Default per-class policy: (class, refill per second, burst capacity).
    const CLASS_POLICY: &'static [(&'static str, f64, f64)] = &[
        ("analysis", 5.0, 10.0),
        ("search", 20.0, 40.0),
        ("store_memory", 30.0, 60.0),
        ("relationships", 20.0, 40.0),
        ("benchmark_run", 0.1, 2.0),
    ];

    pub fn new(config: &RateLimitConfig) -> Self {
        let classes = Self::CLASS_POLICY
            .iter()
            .map(|(name, rate, burst)| (name.to_string(), Mutex::new(TokenBucket::new(*rate, *burst))))
            .collect();
        Self {
            enabled: config.enabled,
            global: Mutex::new(TokenBucket::new(
                config.requests_per_second,
                config.burst,
            )),
            classes,
            counters: Counters::default(),
            started: Instant::now(),
        }
    }

    /// Admission check for one request of the given class. Never blocks.
    pub fn allow(&self, class: &str) -> AllowResult {
        if !self.enabled {
            return AllowResult {
                allowed: true,
                limit_type: "disabled".to_string(),
                retry_after: None,
                remaining: u64::MAX,
            };
        }

        let now = Instant::now();

        // Global umbrella first
        {
            let mut global = match self.global.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !global.try_consume(now) {
                let retry_after = global.wait_for_token();
                drop(global);
                self.record_rejection(class, "global");
                return AllowResult {
                    allowed: false,
                    limit_type: "global".to_string(),
                    retry_after: Some(retry_after),
                    remaining: 0,
                };
            }
        }

        // Class bucket, when one exists
        let remaining = if let Some(bucket) = self.classes.get(class) {
            let mut bucket = match bucket.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !bucket.try_consume(now) {
                let retry_after = bucket.wait_for_token();
                drop(bucket);
                self.record_rejection(class, class);
                return AllowResult {
                    allowed: false,
                    limit_type: class.to_string(),
                    retry_after: Some(retry_after),
                    remaining: 0,
                };
            }
            bucket.remaining()
        } else {
            match self.global.lock() {
                Ok(guard) => guard.remaining(),
                Err(poisoned) => poisoned.into_inner().remaining(),
            }
        };

        self.record_allowance(class);
        AllowResult {
            allowed: true,
            limit_type: class.to_string(),
            retry_after: None,
            remaining,
        }
    }

    fn record_allowance(&self, class: &str) {
        self.counters.allowed_total.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_class) = self.counters.by_class.lock() {
            by_class.entry(class.to_string()).or_default().0 += 1;
        }
    }

    fn record_rejection(&self, class: &str, limit_type: &str) {
        self.counters.rejected_total.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_class) = self.counters.by_class.lock() {
            by_class.entry(class.to_string()).or_default().1 += 1;
        }
        if let Ok(mut by_type) = self.counters.by_limit_type.lock() {
            *by_type.entry(limit_type.to_string()).or_default() += 1;
        }
    }

    /// Point-in-time metrics read.
    pub fn metrics(&self) -> RateLimiterMetrics {
        let allowed_total = self.counters.allowed_total.load(Ordering::Relaxed);
        let rejected_total = self.counters.rejected_total.load(Ordering::Relaxed);
        let by_class = self
            .counters
            .by_class
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default();
        let rejected_by_limit_type = self
            .counters
            .by_limit_type
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default();
        let uptime = self.started.elapsed().as_secs_f64().max(f64::EPSILON);

        RateLimiterMetrics {
            allowed_total,
            rejected_total,
            allowed_by_class: by_class.iter().map(|(k, v)| (k.clone(), v.0)).collect(),
            rejected_by_class: by_class.iter().map(|(k, v)| (k.clone(), v.1)).collect(),
            rejected_by_limit_type,
            requests_per_second: (allowed_total + rejected_total) as f64 / uptime,
            uptime_seconds: uptime,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rps: f64, burst: f64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            enabled: true,
            requests_per_second: rps,
            burst,
        })
    }

    #[test]
    fn test_disabled_always_allows() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: false,
            requests_per_second: 0.0,
            burst: 0.0,
        });
        for _ in 0..1000 {
            let result = limiter.allow("search");
            assert!(result.allowed);
            assert_eq!(result.limit_type, "disabled");
        }
    }

    #[test]
    fn test_global_burst_then_rejection() {
        let limiter = limiter(1.0, 2.0);
        assert!(limiter.allow("search").allowed);
        assert!(limiter.allow("search").allowed);

        let third = limiter.allow("search");
        assert!(!third.allowed);
        assert_eq!(third.limit_type, "global");
        let retry = third.retry_after.unwrap();
        assert!(retry >= Duration::from_millis(900), "retry was {:?}", retry);
    }

    #[test]
    fn test_class_bucket_rejects_with_class_name() {
        // Global is roomy; the analysis class (burst 10) is the constraint.
        let limiter = limiter(1000.0, 2000.0);
        for _ in 0..10 {
            assert!(limiter.allow("analysis").allowed);
        }
        let rejected = limiter.allow("analysis");
        assert!(!rejected.allowed);
        assert_eq!(rejected.limit_type, "analysis");
        assert!(rejected.retry_after.unwrap() > Duration::ZERO);
    }

    #[test]
    fn test_unknown_class_uses_global_only() {
        let limiter = limiter(1000.0, 2000.0);
        for _ in 0..500 {
            assert!(limiter.allow("maintenance").allowed);
        }
    }

    #[test]
    fn test_refill_restores_admission() {
        let limiter = limiter(50.0, 1.0);
        assert!(limiter.allow("search").allowed);
        assert!(!limiter.allow("search").allowed);
        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.allow("search").allowed);
    }

    #[test]
    fn test_admission_bound_over_window() {
        // capacity 5, rate 100/s: in ~50ms at most 5 + 0.05*100 = 10 admits.
        let limiter = limiter(100.0, 5.0);
        let start = Instant::now();
        let mut admitted = 0;
        while start.elapsed() < Duration::from_millis(50) {
            if limiter.allow("anything").allowed {
                admitted += 1;
            }
        }
        let elapsed = start.elapsed().as_secs_f64();
        let bound = 5.0 + elapsed * 100.0 + 1.0;
        assert!(
            (admitted as f64) <= bound,
            "admitted {} > bound {}",
            admitted,
            bound
        );
    }

    #[test]
    fn test_metrics_accumulate() {
        let limiter = limiter(1.0, 1.0);
        assert!(limiter.allow("search").allowed);
        assert!(!limiter.allow("search").allowed);

        let metrics = limiter.metrics();
        assert_eq!(metrics.allowed_total, 1);
        assert_eq!(metrics.rejected_total, 1);
        assert_eq!(metrics.allowed_by_class.get("search"), Some(&1));
        assert_eq!(metrics.rejected_by_class.get("search"), Some(&1));
        assert_eq!(metrics.rejected_by_limit_type.get("global"), Some(&1));
        assert!(metrics.requests_per_second > 0.0);
    }

    #[test]
    fn test_parallel_callers() {
        use std::sync::Arc;
        let limiter = Arc::new(limiter(10_000.0, 20_000.0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || {
                let mut allowed = 0;
                for _ in 0..100 {
                    if limiter.allow("search").allowed {
                        allowed += 1;
                    }
                }
                allowed
            }));
        }
        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert!(total > 0);
        let metrics = limiter.metrics();
        assert_eq!(metrics.allowed_total + metrics.rejected_total, 800);
    }
}
