//! HTTP surface tests.
//!
//! Starts an axum server and exercises it with reqwest.

use indexed_sync::domain::poll::PollAction;
use indexed_sync::http;
use serde_json::json;

use crate::support::{alice, poll_sync, PollSync};

/// Bind to port 0 and return the actual address.
async fn start_server(sync: PollSync) -> String {
    let app = http::router::<_, _, PollAction>(sync);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn health_reports_observed_count() {
    let (sync, _) = poll_sync(&["Q1", "Q2"]);
    let base = start_server(sync.clone()).await;
    let client = reqwest::Client::new();

    let body: serde_json::Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["collection"], "polls");
    assert!(body["count"].is_null());
    assert_eq!(body["functions"], json!(["createPoll", "vote"]));

    sync.get_snapshot().await.unwrap();
    let body: serde_json::Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn snapshot_lists_records_in_order() {
    let (sync, _) = poll_sync(&["Q1", "Q2", "Q3"]);
    let base = start_server(sync).await;

    let resp = reqwest::get(format!("{base}/snapshot")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["count"], 3);
    let questions: Vec<&str> = body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["record"]["question"].as_str().unwrap())
        .collect();
    assert_eq!(questions, ["Q1", "Q2", "Q3"]);
}

#[tokio::test]
async fn vote_over_http() {
    let (sync, _) = poll_sync(&["Q1"]);
    let base = start_server(sync).await;
    let client = reqwest::Client::new();

    let resp = client
        .put(format!("{base}/viewer"))
        .json(&json!({ "viewer": alice() }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .post(format!("{base}/act"))
        .json(&json!({ "action": "vote", "poll_id": 0, "option_index": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let receipt: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(receipt["function"], "vote");

    let body: serde_json::Value = client
        .get(format!("{base}/snapshot"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entry = &body["entries"][0];
    assert_eq!(entry["record"]["vote_counts"], json!([0, 1]));
    assert_eq!(entry["viewer_state"]["has_voted"], true);

    // Second vote is rejected by the contract.
    let resp = client
        .post(format!("{base}/act"))
        .json(&json!({ "action": "vote", "poll_id": 0, "option_index": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("Already voted"));
}

#[tokio::test]
async fn invalid_action_is_bad_request() {
    let (sync, _) = poll_sync(&[]);
    let base = start_server(sync).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/act"))
        .json(&json!({
            "action": "create",
            "question": "Lunch?",
            "options": ["Pizza"],
            "duration_days": 1,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn refresh_reports_warnings() {
    let (sync, source) = poll_sync(&["Q1", "Q2"]);
    source.fail_reads(1).unwrap();
    let base = start_server(sync).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/refresh"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["snapshot"]["unavailable"], json!([1]));
    assert_eq!(body["warnings"][0]["kind"], "fetch_failed");
    assert_eq!(body["warnings"][0]["id"], 1);
}

#[tokio::test]
async fn unreadable_count_is_service_unavailable() {
    let (sync, source) = poll_sync(&["Q1"]);
    source.fail_count(true).unwrap();
    let base = start_server(sync).await;

    let resp = reqwest::get(format!("{base}/snapshot")).await.unwrap();

    assert_eq!(resp.status(), 503);
}
