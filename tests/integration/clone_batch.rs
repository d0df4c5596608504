//! End-to-end clone-batch behavior over a scripted executor.

use repo_cloner::cloner::{CloneOptions, WorkerPool, WorkerPoolConfig};
use repo_cloner::engine::{CloneBatchRequest, CloneBatchUseCase};
use std::sync::Arc;
use std::time::Duration;

use super::support::{repo, scratch_dir, FakeGit, Step};

fn pool_with(git: Arc<FakeGit>, workers: usize) -> Arc<WorkerPool> {
    Arc::new(WorkerPool::new(
        WorkerPoolConfig {
            max_workers: workers,
            max_retries: 2,
            retry_base_delay: Duration::from_millis(10),
        },
        git,
    ))
}

#[tokio::test]
async fn clean_batch_completes_every_job() {
    let (_guard, base) = scratch_dir();
    let git = Arc::new(FakeGit::new());
    let pool = pool_with(git.clone(), 3);
    let usecase = CloneBatchUseCase::new(pool);

    let repositories = vec![repo("alpha"), repo("beta"), repo("gamma"), repo("delta")];
    let response = usecase
        .execute(
            CloneBatchRequest {
                repositories,
                base_directory: base,
                options: CloneOptions::default(),
                concurrency: None,
            },
            None,
        )
        .await
        .expect("batch succeeds");

    assert_eq!(response.total_jobs, 4);
    assert_eq!(response.completed, 4);
    assert_eq!(response.failed, 0);
    assert_eq!(response.skipped, 0);
    assert_eq!(response.results.len(), 4);
    assert!(response.results.iter().all(|r| r.success));

    // Accounting identity after the pool drains.
    let progress = &response.progress;
    assert!(progress.is_complete());
    assert_eq!(progress.processed(), progress.total);
    assert_eq!(progress.in_progress, 0);
}

#[tokio::test]
async fn existing_destination_is_skipped_not_failed() {
    let (_guard, base) = scratch_dir();
    let git = Arc::new(FakeGit::new());
    git.script("already-there", [Step::AlreadyExists]);

    let pool = pool_with(git.clone(), 2);
    let usecase = CloneBatchUseCase::new(pool);

    let response = usecase
        .execute(
            CloneBatchRequest {
                repositories: vec![repo("already-there"), repo("fresh")],
                base_directory: base,
                options: CloneOptions::default(),
                concurrency: None,
            },
            None,
        )
        .await
        .expect("batch succeeds");

    assert_eq!(response.completed, 1);
    assert_eq!(response.skipped, 1);
    assert_eq!(response.failed, 0);
    assert_eq!(git.attempts("already-there"), 1, "skips are never retried");

    let skipped = response
        .results
        .iter()
        .find(|r| r.job.repository.name == "already-there")
        .unwrap();
    assert!(skipped.success, "skipped counts as success");
}

#[tokio::test]
async fn mixed_batch_reaches_exactly_one_terminal_state_per_job() {
    let (_guard, base) = scratch_dir();
    let git = Arc::new(FakeGit::new());
    git.script("doomed", [Step::NotFound]);
    git.script("flaky", [Step::TimedOut, Step::Succeed]);
    git.script("present", [Step::AlreadyExists]);

    let pool = pool_with(git.clone(), 2);
    let usecase = CloneBatchUseCase::new(pool);

    let response = usecase
        .execute(
            CloneBatchRequest {
                repositories: vec![
                    repo("doomed"),
                    repo("flaky"),
                    repo("present"),
                    repo("plain"),
                ],
                base_directory: base,
                options: CloneOptions::default(),
                concurrency: None,
            },
            None,
        )
        .await
        .expect("batch succeeds");

    assert_eq!(response.total_jobs, 4);
    assert_eq!(response.completed, 2); // flaky + plain
    assert_eq!(response.failed, 1);
    assert_eq!(response.skipped, 1);
    assert_eq!(
        response.completed + response.failed + response.skipped,
        response.total_jobs
    );
    assert_eq!(response.results.len(), 4);
}

#[tokio::test]
async fn worker_count_bounds_concurrency() {
    let (_guard, base) = scratch_dir();
    let git = Arc::new(FakeGit::new().with_delay(Duration::from_millis(40)));
    let pool = pool_with(git.clone(), 2);
    let usecase = CloneBatchUseCase::new(pool);

    let repositories = (0..6).map(|i| repo(&format!("repo-{i}"))).collect();
    let response = usecase
        .execute(
            CloneBatchRequest {
                repositories,
                base_directory: base,
                options: CloneOptions::default(),
                concurrency: None,
            },
            None,
        )
        .await
        .expect("batch succeeds");

    assert_eq!(response.completed, 6);
    assert!(
        git.peak_concurrency() <= 2,
        "peak concurrency {} exceeded worker count",
        git.peak_concurrency()
    );
}

#[tokio::test]
async fn observer_sees_monotone_progress_ending_complete() {
    let (_guard, base) = scratch_dir();
    let git = Arc::new(FakeGit::new());
    let pool = pool_with(git.clone(), 2);
    let usecase = CloneBatchUseCase::new(pool);

    let snapshots = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&snapshots);

    let response = usecase
        .execute(
            CloneBatchRequest {
                repositories: vec![repo("one"), repo("two"), repo("three")],
                base_directory: base,
                options: CloneOptions::default(),
                concurrency: None,
            },
            Some(Box::new(move |progress| {
                sink.lock().unwrap().push(progress);
            })),
        )
        .await
        .expect("batch succeeds");

    assert_eq!(response.completed, 3);

    let snapshots = snapshots.lock().unwrap();
    assert!(!snapshots.is_empty(), "observer must receive snapshots");

    let mut last_processed = 0;
    for snapshot in snapshots.iter() {
        assert!(
            snapshot.processed() >= last_processed,
            "processed count must never decrease"
        );
        assert!(snapshot.processed() + snapshot.in_progress <= snapshot.total);
        last_processed = snapshot.processed();
    }

    let terminal = snapshots.last().unwrap();
    assert!(terminal.is_complete(), "terminal snapshot must be complete");
}

#[tokio::test]
async fn job_manager_routes_both_priority_classes() {
    let (_guard, base) = scratch_dir();
    let git = Arc::new(FakeGit::new());
    let pool = pool_with(git.clone(), 2);
    let mut results = pool.take_results().unwrap();

    let manager = repo_cloner::cloner::JobManager::new(Arc::clone(&pool));

    let urgent = repo_cloner::cloner::CloneJob::new(repo("urgent"), &base, CloneOptions::default());
    let routine =
        repo_cloner::cloner::CloneJob::new(repo("routine"), &base, CloneOptions::default());

    // A small non-fork repository computes a high priority, so dispatch
    // routes it to the high class.
    manager.dispatch(urgent).unwrap();
    manager.submit(routine).unwrap();

    let mut names = Vec::new();
    for _ in 0..2 {
        names.push(results.recv().await.expect("result").job.repository.name.clone());
    }
    pool.wait().await;

    names.sort();
    assert_eq!(names, vec!["routine".to_string(), "urgent".to_string()]);

    manager.close().await;
    let late = repo_cloner::cloner::CloneJob::new(repo("late"), &base, CloneOptions::default());
    assert!(manager.submit(late).is_err());
}

#[tokio::test]
async fn high_priority_job_overtakes_queued_backlog() {
    let (_guard, base) = scratch_dir();
    // One slow worker keeps the pool saturated so later submissions pile
    // up in the manager's channels, where the scheduler's preference for
    // the high class decides the order.
    let git = Arc::new(FakeGit::new().with_delay(Duration::from_millis(60)));
    let pool = pool_with(git.clone(), 1);
    let mut results = pool.take_results().unwrap();

    let manager = repo_cloner::cloner::JobManager::new(Arc::clone(&pool));

    for i in 0..5 {
        let job = repo_cloner::cloner::CloneJob::new(
            repo(&format!("normal-{i}")),
            &base,
            CloneOptions::default(),
        );
        manager.submit(job).unwrap();
    }

    // Let the scheduler drain the head of the normal backlog into the
    // pool's bounded queue before the urgent job shows up.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let urgent = repo_cloner::cloner::CloneJob::new(repo("urgent"), &base, CloneOptions::default());
    manager.dispatch(urgent).unwrap();

    let mut order = Vec::new();
    for _ in 0..6 {
        order.push(results.recv().await.expect("result").job.repository.name.clone());
    }
    pool.wait().await;

    let position =
        |name: &str| order.iter().position(|n| n == name).unwrap_or(usize::MAX);

    // The urgent job must jump ahead of backlog still parked in the
    // manager: it completes before the last normal job, and is never the
    // final completion.
    assert!(
        position("urgent") < position("normal-4"),
        "urgent job finished after the normal backlog: {order:?}"
    );
    assert_ne!(
        order.last().map(String::as_str),
        Some("urgent"),
        "urgent job must not be scheduled last: {order:?}"
    );

    manager.close().await;
}

#[tokio::test]
async fn cancellation_stops_unstarted_jobs() {
    let (_guard, base) = scratch_dir();
    let git = Arc::new(FakeGit::new().with_delay(Duration::from_millis(100)));
    let pool = pool_with(git.clone(), 1);

    let mut results = pool.take_results().unwrap();

    let jobs: Vec<_> = (0..4)
        .map(|i| {
            repo_cloner::cloner::CloneJob::new(
                repo(&format!("slow-{i}")),
                &base,
                CloneOptions::default(),
            )
        })
        .collect();
    pool.submit_all(jobs).await.unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    pool.cancel_token().cancel();
    pool.wait().await;

    // Only jobs that actually started may have emitted results.
    let mut emitted = 0;
    while results.try_recv().is_ok() {
        emitted += 1;
    }
    assert!(emitted < 4, "cancelled batch must not emit all results");

    let total_attempts: u32 = (0..4).map(|i| git.attempts(&format!("slow-{i}"))).sum();
    assert!(total_attempts < 4, "unstarted jobs must never run");
}
