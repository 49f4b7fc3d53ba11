use std::sync::{Arc, Mutex};
use std::time::Duration;

use indexed_sync::domain::poll::PollAction;
use indexed_sync::events::{
    CountRegressed, FetchFailed, MutationConfirmed, COUNT_REGRESSED, FETCH_FAILED,
    MUTATION_CONFIRMED,
};
use indexed_sync::{Aggregator, SyncEvents, Synchronizer};

use crate::support::{alice, config, poll_contract, poll_source, PollSync};

fn observed_sync(events: Arc<SyncEvents>, questions: &[&str]) -> (PollSync, crate::support::PollSource) {
    let source = poll_source(questions);
    let sync = Synchronizer::new(
        Aggregator::new(source.clone())
            .with_config(config())
            .with_events(events),
        poll_contract(source.clone()),
    );
    (sync, source)
}

/// Listeners run on emitter threads; wait until `done` holds.
async fn eventually<F: Fn() -> bool>(done: F) -> bool {
    for _ in 0..100 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn regression_and_failures_are_emitted() {
    let events = Arc::new(SyncEvents::new());
    let regressions = Arc::new(Mutex::new(Vec::new()));
    let failures = Arc::new(Mutex::new(Vec::new()));
    {
        let regressions = regressions.clone();
        events
            .on(COUNT_REGRESSED, move |e: CountRegressed| {
                regressions.lock().unwrap().push(e);
            })
            .unwrap();
        let failures = failures.clone();
        events
            .on(FETCH_FAILED, move |e: FetchFailed| {
                failures.lock().unwrap().push(e);
            })
            .unwrap();
    }

    let (sync, source) = observed_sync(events, &["Q1", "Q2", "Q3"]);
    source.fail_reads(1).unwrap();
    sync.refresh().await.unwrap();
    source.set_count_override(Some(2)).unwrap();
    sync.refresh().await.unwrap();

    assert!(eventually(|| !regressions.lock().unwrap().is_empty()).await);
    assert!(eventually(|| !failures.lock().unwrap().is_empty()).await);

    let regression = regressions.lock().unwrap()[0].clone();
    assert_eq!(regression.collection, "polls");
    assert_eq!((regression.previous, regression.current), (3, 2));

    let failure = failures.lock().unwrap()[0].clone();
    assert_eq!(failure.id, 1);
    assert!(!failure.retained);
}

#[tokio::test]
async fn confirmed_mutation_is_emitted() {
    let events = Arc::new(SyncEvents::new());
    let confirmed = Arc::new(Mutex::new(Vec::new()));
    {
        let confirmed = confirmed.clone();
        events
            .on(MUTATION_CONFIRMED, move |e: MutationConfirmed| {
                confirmed.lock().unwrap().push(e);
            })
            .unwrap();
    }

    let (sync, _) = observed_sync(events, &["Q1"]);
    sync.set_viewer(Some(alice())).unwrap();
    let receipt = sync.act(&PollAction::vote(0, 1)).await.unwrap();

    assert!(eventually(|| !confirmed.lock().unwrap().is_empty()).await);
    let event = confirmed.lock().unwrap()[0].clone();
    assert_eq!(event.function, "vote");
    assert_eq!(event.tx_hash, receipt.tx_hash);
    assert_eq!(event.invalidated, 2);
}
