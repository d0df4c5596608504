//! Production observability metrics.
//!
//! Collects clone-job outcomes, retry counts, provider API request counts,
//! and rate-limiter waits through the `metrics` crate, exported via a
//! Prometheus scrape endpoint. Initialization is optional; when the
//! exporter is not installed every recording call is a cheap no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};

static METRICS_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Initialize the Prometheus exporter on `addr`.
///
/// Idempotent; called once from `main` when `METRICS_ADDR` is set. Failure
/// to bind is reported to the caller and the process continues without
/// metrics.
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INITIALIZED.get().is_some() {
        debug!("metrics already initialized, skipping");
        return Ok(());
    }

    info!(%addr, "initializing metrics exporter");

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "clone_jobs_total",
        Unit::Count,
        "Clone jobs finished, labeled by terminal outcome"
    );
    describe_counter!(
        "clone_retries_total",
        Unit::Count,
        "Clone attempts that entered the retry backoff loop"
    );
    describe_counter!(
        "provider_api_requests_total",
        Unit::Count,
        "Enumeration API requests, labeled by provider"
    );
    describe_histogram!(
        "clone_duration_seconds",
        Unit::Seconds,
        "Wall-clock duration of successful clone jobs"
    );
    describe_histogram!(
        "rate_limit_wait_seconds",
        Unit::Seconds,
        "Time spent blocked on the provider rate limiter"
    );

    let _ = METRICS_INITIALIZED.set(());
    Ok(())
}

/// Record a job reaching a terminal state.
pub fn record_job_outcome(outcome: &'static str) {
    counter!("clone_jobs_total", "outcome" => outcome).increment(1);
}

/// Record one retry of a clone job.
pub fn record_retry() {
    counter!("clone_retries_total").increment(1);
}

/// Record one enumeration API request.
pub fn record_api_request(provider: &'static str) {
    counter!("provider_api_requests_total", "provider" => provider).increment(1);
}

/// Record the duration of a successful clone.
pub fn record_clone_duration(duration: Duration) {
    histogram!("clone_duration_seconds").record(duration.as_secs_f64());
}

/// Record a rate-limiter induced wait.
pub fn record_rate_limit_wait(duration: Duration) {
    histogram!("rate_limit_wait_seconds").record(duration.as_secs_f64());
}
