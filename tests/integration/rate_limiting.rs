//! Rate limiter behavior: capacity bounds, header re-sync, reset refills.

use chrono::{Duration as ChronoDuration, Utc};
use repo_cloner::provider::RateLimiter;
use std::time::Duration;

#[test]
fn consumption_is_bounded_by_capacity() {
    let capacity = 10;
    let limiter = RateLimiter::new(capacity);

    let mut granted = 0;
    for _ in 0..capacity * 2 {
        if limiter.allow() {
            granted += 1;
        }
    }

    // With a refill rate of 10/hour nothing refills during this test.
    assert_eq!(granted, capacity);
}

#[tokio::test]
async fn wait_never_fails_on_exhaustion() {
    // A full bucket grants immediately.
    let limiter = RateLimiter::new(100);
    for _ in 0..5 {
        tokio::time::timeout(Duration::from_millis(100), limiter.wait())
            .await
            .expect("wait must be immediate with tokens available")
            .expect("wait must not error");
    }
}

#[test]
fn provider_remaining_header_wins_when_lower() {
    let limiter = RateLimiter::new(5000);
    assert!(limiter.available() > 100);

    limiter.update_remaining(3);
    assert!(limiter.available() <= 3);

    assert!(limiter.allow());
    assert!(limiter.allow());
    assert!(limiter.allow());
    assert!(!limiter.allow());
}

#[test]
fn passed_reset_header_refills_the_bucket() {
    let limiter = RateLimiter::new(4);
    while limiter.allow() {}
    assert!(!limiter.allow());

    limiter.update_reset_time(Utc::now() - ChronoDuration::seconds(5));
    assert!(limiter.allow());
}

#[test]
fn future_reset_header_does_not_refill() {
    let limiter = RateLimiter::new(4);
    while limiter.allow() {}

    limiter.update_reset_time(Utc::now() + ChronoDuration::minutes(30));
    assert!(!limiter.allow());
}

#[test]
fn reported_remaining_is_retained_for_introspection() {
    let limiter = RateLimiter::new(100);
    assert_eq!(limiter.reported_remaining(), None);

    limiter.update_remaining(42);
    assert_eq!(limiter.reported_remaining(), Some(42));
}
