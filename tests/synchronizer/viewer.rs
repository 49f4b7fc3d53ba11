use indexed_sync::domain::poll::{PollAction, PollViewer};

use crate::support::{alice, bob, poll_sync};

#[tokio::test]
async fn no_viewer_means_no_viewer_state() {
    let (sync, source) = poll_sync(&["Q1", "Q2"]);

    let snapshot = sync.get_snapshot().await.unwrap();

    assert!(snapshot.viewer.is_none());
    assert!(snapshot.entries.iter().all(|e| e.viewer_state.is_none()));
    assert_eq!(source.viewer_reads(0).unwrap(), 0);
}

#[tokio::test]
async fn connecting_fetches_viewer_state_only() {
    let (sync, source) = poll_sync(&["Q1", "Q2"]);
    sync.get_snapshot().await.unwrap();
    source.reset_read_counts().unwrap();

    sync.set_viewer(Some(alice())).unwrap();
    let snapshot = sync.get_snapshot().await.unwrap();

    assert_eq!(snapshot.viewer, Some(alice()));
    assert_eq!(source.total_record_reads().unwrap(), 0);
    assert_eq!(source.viewer_reads(0).unwrap(), 1);
    assert_eq!(source.viewer_reads(1).unwrap(), 1);
    assert!(snapshot
        .entries
        .iter()
        .all(|e| e.viewer_state == Some(PollViewer::default())));
}

#[tokio::test]
async fn viewer_state_is_scoped_per_account() {
    let (sync, source) = poll_sync(&["Q1"]);
    sync.set_viewer(Some(alice())).unwrap();
    sync.act(&PollAction::vote(0, 0)).await.unwrap();
    let as_alice = sync.get_snapshot().await.unwrap();
    assert_eq!(
        as_alice.get(0).unwrap().viewer_state,
        Some(PollViewer { has_voted: true })
    );

    sync.set_viewer(Some(bob())).unwrap();
    let as_bob = sync.get_snapshot().await.unwrap();
    assert_eq!(
        as_bob.get(0).unwrap().viewer_state,
        Some(PollViewer { has_voted: false })
    );

    // Switching back reuses alice's cached state.
    source.reset_read_counts().unwrap();
    sync.set_viewer(Some(alice())).unwrap();
    let again = sync.get_snapshot().await.unwrap();
    assert_eq!(again.get(0).unwrap().viewer_state, Some(PollViewer { has_voted: true }));
    assert_eq!(source.viewer_reads(0).unwrap(), 0);
}

#[tokio::test]
async fn disconnecting_drops_viewer_state_from_snapshot() {
    let (sync, _) = poll_sync(&["Q1"]);
    sync.set_viewer(Some(alice())).unwrap();
    sync.get_snapshot().await.unwrap();

    sync.set_viewer(None).unwrap();
    let snapshot = sync.get_snapshot().await.unwrap();

    assert_eq!(snapshot.get(0).unwrap().viewer_state, None);
}
