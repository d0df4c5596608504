//! Clone engine configuration constants

use std::time::Duration;

/// Maximum number of retries for a failed clone job
pub const MAX_RETRIES: u32 = 3;

/// Base delay before the first retry; doubles per attempt
pub const BASE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Upper bound on a single backoff sleep
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(120);

/// Timeout applied to a single git clone subprocess
pub const CLONE_TIMEOUT: Duration = Duration::from_secs(600);

/// How long a graceful pool close waits for in-flight jobs
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Default worker count: twice the CPU core count
pub fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(4)
}

/// Exponential backoff delay for the given attempt (0-based): `base`
/// doubled per attempt, capped at [`MAX_RETRY_DELAY`].
pub fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.min(16);
    let delay = base.saturating_mul(1u32 << exp);
    delay.min(MAX_RETRY_DELAY)
}
