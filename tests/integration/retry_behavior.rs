//! Retry-loop behavior of the worker pool against a scripted executor.

use repo_cloner::cloner::{CloneJob, CloneOptions, JobStatus, WorkerPool, WorkerPoolConfig};
use std::sync::Arc;
use std::time::Duration;

use super::support::{repo, scratch_dir, FakeGit, Step};

fn fast_pool_config(max_workers: usize, max_retries: u32) -> WorkerPoolConfig {
    WorkerPoolConfig {
        max_workers,
        max_retries,
        retry_base_delay: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn transient_failure_recovers_with_retry_count_recorded() {
    let (_guard, base) = scratch_dir();
    let git = Arc::new(FakeGit::new());
    git.script("widget", [Step::TimedOut, Step::Succeed]);

    let pool = WorkerPool::new(fast_pool_config(2, 3), git.clone());
    let mut results = pool.take_results().unwrap();

    pool.submit(CloneJob::new(repo("widget"), &base, CloneOptions::default()))
        .await
        .unwrap();

    let result = results.recv().await.expect("one result");
    pool.wait().await;

    assert!(result.success);
    assert_eq!(result.job.status, JobStatus::Completed);
    assert!(result.job.retry_count > 0, "retry count must be recorded");
    assert_eq!(git.attempts("widget"), 2);
}

#[tokio::test]
async fn permanent_failure_is_attempted_exactly_once() {
    let (_guard, base) = scratch_dir();
    let git = Arc::new(FakeGit::new());
    git.script("missing", [Step::NotFound]);

    let pool = WorkerPool::new(fast_pool_config(2, 3), git.clone());
    let mut results = pool.take_results().unwrap();

    pool.submit(CloneJob::new(repo("missing"), &base, CloneOptions::default()))
        .await
        .unwrap();

    let result = results.recv().await.expect("one result");
    pool.wait().await;

    assert!(!result.success);
    assert_eq!(result.job.status, JobStatus::Failed);
    assert!(result.job.error.as_deref().unwrap_or("").contains("not found"));
    assert_eq!(git.attempts("missing"), 1, "permanent errors never retry");
}

#[tokio::test]
async fn auth_failure_is_permanent() {
    let (_guard, base) = scratch_dir();
    let git = Arc::new(FakeGit::new());
    git.script("locked", [Step::AuthFailed]);

    let pool = WorkerPool::new(fast_pool_config(1, 3), git.clone());
    let mut results = pool.take_results().unwrap();

    pool.submit(CloneJob::new(repo("locked"), &base, CloneOptions::default()))
        .await
        .unwrap();

    let result = results.recv().await.expect("one result");
    pool.wait().await;

    assert!(!result.success);
    assert_eq!(git.attempts("locked"), 1);
}

#[tokio::test]
async fn retry_budget_bounds_total_attempts() {
    let (_guard, base) = scratch_dir();
    let git = Arc::new(FakeGit::new());
    git.script(
        "flaky",
        [
            Step::TimedOut,
            Step::TimedOut,
            Step::TimedOut,
            Step::TimedOut,
            Step::TimedOut,
            Step::TimedOut,
        ],
    );

    let max_retries = 2;
    let pool = WorkerPool::new(fast_pool_config(1, max_retries), git.clone());
    let mut results = pool.take_results().unwrap();

    pool.submit(CloneJob::new(repo("flaky"), &base, CloneOptions::default()))
        .await
        .unwrap();

    let result = results.recv().await.expect("one result");
    pool.wait().await;

    assert!(!result.success);
    assert_eq!(result.job.status, JobStatus::Failed);
    assert_eq!(
        git.attempts("flaky"),
        max_retries + 1,
        "attempts must be capped at max retries + 1"
    );
}

#[tokio::test]
async fn failing_job_does_not_abort_siblings() {
    let (_guard, base) = scratch_dir();
    let git = Arc::new(FakeGit::new());
    git.script("doomed", [Step::NotFound]);

    let pool = WorkerPool::new(fast_pool_config(2, 1), git.clone());
    let mut results = pool.take_results().unwrap();

    let jobs = vec![
        CloneJob::new(repo("doomed"), &base, CloneOptions::default()),
        CloneJob::new(repo("alpha"), &base, CloneOptions::default()),
        CloneJob::new(repo("beta"), &base, CloneOptions::default()),
    ];
    pool.submit_all(jobs).await.unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        outcomes.push(results.recv().await.expect("result"));
    }
    pool.wait().await;

    let failed: Vec<_> = outcomes.iter().filter(|r| !r.success).collect();
    let succeeded: Vec<_> = outcomes.iter().filter(|r| r.success).collect();

    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].job.repository.name, "doomed");
    assert_eq!(succeeded.len(), 2);
}
