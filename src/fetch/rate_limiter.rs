use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

#[derive(Clone, Debug, Default)]
pub struct Limits {
    pub requests_per_min: Option<u64>,
    pub concurrency: Option<u32>,
}

/// Throttle for detail-page requests against one site. Cloning shares the buckets.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    limits: Limits,
    // token bucket modeled by the current tokens and the time of last refill
    rpm_tokens: Mutex<(f64, Instant)>,
    sem: Option<Arc<Semaphore>>,
}

/// Held for the duration of one request; dropping it frees a concurrency slot.
#[derive(Debug)]
pub struct Permit {
    _slot: Option<OwnedSemaphorePermit>,
}

impl RateLimiter {
    pub fn new(limits: Limits) -> Self {
        let rpm_capacity = limits.requests_per_min.unwrap_or(0) as f64;
        let sem = limits
            .concurrency
            .map(|c| Arc::new(Semaphore::new(c.max(1) as usize)));
        Self {
            inner: Arc::new(Inner {
                limits,
                rpm_tokens: Mutex::new((rpm_capacity, Instant::now())),
                sem,
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(Limits::default())
    }

    /// Waits for a concurrency slot and a request token.
    pub async fn acquire(&self) -> Permit {
        // Concurrency first
        let slot = match &self.inner.sem {
            Some(sem) => sem.clone().acquire_owned().await.ok(),
            None => None,
        };

        if let Some(rpm) = self.inner.limits.requests_per_min {
            if rpm > 0 {
                self.consume_token(rpm as f64, 60.0).await;
            }
        }
        Permit { _slot: slot }
    }

    async fn consume_token(&self, capacity: f64, period_secs: f64) {
        // Basic token bucket: refill continuously, wait until a token accumulates
        loop {
            let mut guard = self.inner.rpm_tokens.lock().await;
            let (ref mut tokens, ref mut last) = *guard;
            let now = Instant::now();
            let elapsed = now.duration_since(*last).as_secs_f64();
            let refill_rate = capacity / period_secs;
            *tokens = (*tokens + elapsed * refill_rate).min(capacity);
            *last = now;
            if *tokens >= 1.0 {
                *tokens -= 1.0;
                break;
            }
            let secs = (1.0 - *tokens) / refill_rate;
            drop(guard);
            tokio::time::sleep(Duration::from_secs_f64(secs.max(0.001))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        let started = Instant::now();
        for _ in 0..100 {
            let _permit = limiter.acquire().await;
        }
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn concurrency_slots_are_held_until_permit_drops() {
        let limiter = RateLimiter::new(Limits {
            requests_per_min: None,
            concurrency: Some(1),
        });
        let first = limiter.acquire().await;
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(blocked.is_err(), "second permit should wait for the first");
        drop(first);
        let second = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn bucket_throttles_after_capacity_is_spent() {
        let limiter = RateLimiter::new(Limits {
            requests_per_min: Some(2),
            concurrency: None,
        });
        let _ = limiter.acquire().await;
        let _ = limiter.acquire().await;
        let third = tokio::time::timeout(Duration::from_secs(1), limiter.acquire()).await;
        assert!(third.is_err(), "bucket of 2/min should be empty");
    }
}
