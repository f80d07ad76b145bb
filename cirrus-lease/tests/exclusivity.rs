use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use cirrus_blob::{BlobAdapter, BlobConfig, MemoryBlobStore};
use cirrus_core::{ManualClock, RetryPolicies};
use cirrus_lease::prelude::*;

const INTERVAL: Duration = Duration::from_secs(300);

fn schedule() -> JobSchedule {
    JobSchedule::new(INTERVAL, Duration::from_secs(60))
}

struct Fleet {
    clock: ManualClock,
    store: Arc<MemoryBlobStore>,
}

impl Fleet {
    fn new() -> Self {
        Self {
            clock: ManualClock::starting_now(),
            store: Arc::new(MemoryBlobStore::new()),
        }
    }

    fn worker(&self, owner: &str) -> LeaseCoordinator {
        let blobs = BlobAdapter::from_arc(self.store.clone())
            .with_config(BlobConfig::new().with_retry(RetryPolicies::immediate()));
        LeaseCoordinator::new(blobs, owner).with_clock(Arc::new(self.clock.clone()))
    }

    fn pass(&self, duration: Duration) {
        self.clock
            .advance(chrono::Duration::from_std(duration).unwrap());
    }
}

/// Two workers inside the trigger window: exactly one wins. After the
/// winner releases, a third worker gets the next run.
#[tokio::test]
async fn test_exactly_one_worker_acquires_per_interval() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("w1");
    let w2 = fleet.worker("w2");

    let (s1, s2) = (schedule(), schedule());
    let (a, b) = tokio::join!(
        w1.try_acquire("rollup", &s1),
        w2.try_acquire("rollup", &s2)
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(
        [a.is_acquired(), b.is_acquired()].iter().filter(|won| **won).count(),
        1
    );

    let grant = match (a, b) {
        (Acquisition::Acquired(grant), _) | (_, Acquisition::Acquired(grant)) => grant,
        _ => unreachable!(),
    };
    assert!(fleet.worker(&grant.owner).release(&grant).await.unwrap());

    let w3 = fleet.worker("w3");
    assert!(matches!(
        w3.try_acquire("rollup", &schedule()).await.unwrap(),
        Acquisition::NotDue { .. }
    ));

    fleet.pass(INTERVAL);
    let next = w3.try_acquire("rollup", &schedule()).await.unwrap();
    assert!(next.is_acquired());
}

/// Many workers on a multi-threaded runtime racing for the same record
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquisitions_have_a_single_winner() {
    let fleet = Fleet::new();
    let mut tasks = Vec::new();
    for i in 0..12 {
        let worker = fleet.worker(&format!("w{}", i));
        tasks.push(tokio::spawn(async move {
            worker.try_acquire("compact", &schedule()).await.unwrap()
        }));
    }

    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap().is_acquired() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_busy_until_the_lease_times_out() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("w1");
    let w2 = fleet.worker("w2");
    assert!(w1.set_trigger_interval("job", Duration::from_secs(1)).await.unwrap());
    assert!(w1.try_acquire("job", &schedule()).await.unwrap().is_acquired());

    fleet.pass(Duration::from_secs(179));
    match w2.try_acquire("job", &schedule()).await.unwrap() {
        Acquisition::Busy { owner, .. } => assert_eq!(owner, "w1"),
        other => panic!("expected busy, got {:?}", other),
    }

    fleet.pass(Duration::from_secs(1));
    assert!(w2.try_acquire("job", &schedule()).await.unwrap().is_acquired());
}

#[tokio::test]
async fn test_run_if_due_releases_after_failure() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("w1");

    let result: Option<Result<(), String>> = w1
        .run_if_due("flaky", &schedule(), |_grant| async { Err("boom".to_string()) })
        .await
        .unwrap();
    assert_eq!(result, Some(Err("boom".to_string())));

    let state = w1.state("flaky").await.unwrap().unwrap();
    assert!(state.lease.is_none());
    assert!(state.last_executed.is_some());

    // not due again yet, so the closure is not called
    let called = Cell::new(false);
    let skipped = w1
        .run_if_due("flaky", &schedule(), |_grant| async { called.set(true) })
        .await
        .unwrap();
    assert!(skipped.is_none());
    assert!(!called.get());
}

#[tokio::test]
async fn test_force_release_is_tolerated_by_the_owner() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("w1");
    let operator = fleet.worker("operator");

    let grant = match w1.try_acquire("job", &schedule()).await.unwrap() {
        Acquisition::Acquired(grant) => grant,
        other => panic!("expected acquisition, got {:?}", other),
    };
    assert!(operator.force_release("job").await.unwrap());
    assert!(!operator.force_release("job").await.unwrap());

    assert!(!w1.release(&grant).await.unwrap());
    assert!(!operator.force_release("never-ran").await.unwrap());
    assert!(operator.state("never-ran").await.unwrap().is_none());
}
