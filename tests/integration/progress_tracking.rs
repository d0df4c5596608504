//! Progress tracker invariants under realistic operation sequences.

use repo_cloner::cloner::ProgressTracker;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn counters_are_monotone_under_concurrent_updates() {
    let tracker = Arc::new(ProgressTracker::new(40));

    let mut handles = Vec::new();
    for worker in 0..4 {
        let tracker = Arc::clone(&tracker);
        handles.push(tokio::spawn(async move {
            for i in 0..10 {
                tracker.start_job();
                tokio::time::sleep(Duration::from_millis(1)).await;
                match (worker + i) % 3 {
                    0 => tracker.complete_job(),
                    1 => tracker.fail_job(),
                    _ => tracker.skip_job(),
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let progress = tracker.progress();
    assert_eq!(progress.processed(), 40);
    assert_eq!(progress.in_progress, 0);
    assert!(progress.is_complete());
    assert_eq!(progress.percentage(), 100.0);
}

#[tokio::test]
async fn accounting_identity_holds_at_every_observation() {
    let tracker = Arc::new(ProgressTracker::new(20));

    let updater = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move {
            for i in 0..20 {
                tracker.start_job();
                tokio::time::sleep(Duration::from_millis(2)).await;
                if i % 4 == 0 {
                    tracker.fail_job();
                } else {
                    tracker.complete_job();
                }
            }
        })
    };

    // Observe concurrently; every snapshot must satisfy the identity.
    for _ in 0..50 {
        let p = tracker.progress();
        assert!(p.processed() <= p.total);
        assert!(p.processed() + p.in_progress <= p.total);
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    updater.await.unwrap();

    let p = tracker.progress();
    assert_eq!(p.processed(), 20);
    assert_eq!(p.failed, 5);
    assert_eq!(p.completed, 15);
}

#[tokio::test]
async fn throughput_and_eta_derive_from_observed_rate() {
    let tracker = ProgressTracker::new(4);

    tracker.start_job();
    tokio::time::sleep(Duration::from_millis(30)).await;
    tracker.complete_job();
    tracker.start_job();
    tokio::time::sleep(Duration::from_millis(30)).await;
    tracker.complete_job();

    let p = tracker.progress();
    assert!(p.throughput > 0.0);
    assert!(p.eta > Duration::ZERO, "half-done batch must have an ETA");

    tracker.start_job();
    tracker.complete_job();
    tracker.start_job();
    tracker.complete_job();

    let p = tracker.progress();
    assert!(p.is_complete());
    assert_eq!(p.eta, Duration::ZERO, "complete batch has no ETA");
}

#[tokio::test]
async fn lagging_subscriber_still_sees_terminal_snapshot() {
    let tracker = ProgressTracker::new(64);
    let mut updates = tracker.subscribe();

    // Produce far more snapshots than the subscription buffers.
    for _ in 0..64 {
        tracker.start_job();
        tracker.complete_job();
    }
    tracker.close();
    drop(tracker);

    let mut last_seen = None;
    loop {
        match updates.recv().await {
            Ok(snapshot) => last_seen = Some(snapshot),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }

    let terminal = last_seen.expect("at least one snapshot must arrive");
    assert!(terminal.is_complete());
    assert_eq!(terminal.completed, 64);
}

#[tokio::test]
async fn force_synchronize_recovers_leaked_accounting() {
    let tracker = ProgressTracker::new(5);

    // Three jobs accounted as started but only one reaches terminal state.
    tracker.start_job();
    tracker.start_job();
    tracker.start_job();
    tracker.complete_job();

    assert!(!tracker.progress().is_complete());

    tracker.force_synchronize();
    let p = tracker.progress();
    assert_eq!(p.in_progress, 0);
    // The two leaked jobs were folded into completed; the two never-started
    // jobs remain unprocessed.
    assert_eq!(p.completed, 3);
    assert!(!p.is_complete());

    tracker.start_job();
    tracker.complete_job();
    tracker.start_job();
    tracker.complete_job();
    assert!(tracker.progress().is_complete());
}
