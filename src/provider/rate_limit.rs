//! Token-bucket rate limiting for provider API requests.
//!
//! Each enumeration request consumes one token; tokens refill lazily at
//! `capacity / 3600` per second up to the nominal hourly quota. The bucket
//! re-syncs with provider-reported `X-RateLimit-Remaining` and
//! `X-RateLimit-Reset` headers after every response.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::cancel::CancelToken;

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The wait was interrupted by cancellation
    #[error("rate limiter wait cancelled")]
    Cancelled,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    reset_at: DateTime<Utc>,
    remaining_reported: Option<usize>,
}

/// Token-bucket limiter shared by all enumeration requests to one provider.
///
/// Exhaustion never fails a request; callers block until a token refills.
/// Only cancellation interrupts the wait.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
    cancel: Option<CancelToken>,
}

impl RateLimiter {
    /// GitHub's nominal unauthenticated-to-authenticated hourly quota.
    pub const GITHUB_HOURLY_QUOTA: usize = 5000;

    /// Bitbucket's nominal hourly quota.
    pub const BITBUCKET_HOURLY_QUOTA: usize = 1000;

    /// Create a limiter with `capacity` requests per hour.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1) as f64;
        Self {
            capacity,
            refill_rate: capacity / 3600.0,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
                reset_at: Utc::now() + ChronoDuration::hours(1),
                remaining_reported: None,
            }),
            cancel: None,
        }
    }

    /// Attach a cancellation token so waits become interruptible.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Block until one request may proceed.
    ///
    /// Returns [`RateLimitError::Cancelled`] only if the token trips while
    /// waiting; exhaustion itself never produces an error.
    pub async fn wait(&self) -> Result<(), RateLimitError> {
        loop {
            let delay = {
                let mut state = self.state.lock().expect("rate limiter mutex poisoned");
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return Ok(());
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_rate)
            };

            crate::metrics::record_rate_limit_wait(delay);

            match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = token.cancelled() => return Err(RateLimitError::Cancelled),
                    }
                }
                None => sleep(delay).await,
            }
        }
    }

    /// Consume a token without blocking. Returns true iff one was available.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock().expect("rate limiter mutex poisoned");
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Re-sync the local bucket with the provider-reported remaining count.
    ///
    /// Only clamps downward: the provider's view wins when it is lower than
    /// ours, but a generous header never inflates the bucket past what the
    /// refill schedule allows.
    pub fn update_remaining(&self, remaining: usize) {
        let mut state = self.state.lock().expect("rate limiter mutex poisoned");
        state.remaining_reported = Some(remaining);
        if (remaining as f64) < state.tokens {
            state.tokens = remaining as f64;
        }
    }

    /// Record the provider-reported reset instant.
    ///
    /// A reset instant already in the past triggers an immediate full refill.
    pub fn update_reset_time(&self, reset_at: DateTime<Utc>) {
        let mut state = self.state.lock().expect("rate limiter mutex poisoned");
        state.reset_at = reset_at;
        if Utc::now() >= reset_at {
            state.tokens = self.capacity;
            state.last_refill = Instant::now();
        }
    }

    /// Remaining tokens, rounded down. Diagnostic only.
    pub fn available(&self) -> usize {
        let mut state = self.state.lock().expect("rate limiter mutex poisoned");
        self.refill(&mut state);
        state.tokens as usize
    }

    /// The most recent remaining count reported by the provider, if any.
    pub fn reported_remaining(&self) -> Option<usize> {
        self.state
            .lock()
            .expect("rate limiter mutex poisoned")
            .remaining_reported
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();

        if Utc::now() >= state.reset_at {
            state.tokens = self.capacity;
            state.last_refill = now;
            state.reset_at = Utc::now() + ChronoDuration::hours(1);
            return;
        }

        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }
}
