//! HTTP surface for a synchronizer.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `GET /health` - `{ "ok": true, "collection": ..., "count": ..., "functions": [...] }`.
//! - `GET /snapshot` - the current snapshot as JSON.
//! - `POST /refresh` - re-read the source, returns the snapshot and warnings.
//! - `POST /act` - body is a JSON action, returns the receipt.
//! - `PUT /viewer` - body `{ "viewer": "0x..." }` or `{ "viewer": null }`.
//!
//! ## Example
//!
//! ```ignore
//! let sync = Synchronizer::new(Aggregator::new(source), dispatcher);
//!
//! // Compose with other axum routes
//! let app = http::router::<_, _, PollAction>(sync.clone());
//!
//! // Or serve directly
//! http::serve::<_, _, PollAction>(sync, "0.0.0.0:3000").await?;
//! ```

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::mutation::{Action, MutationDispatcher};
use crate::record::{Address, Record};
use crate::source::RecordSource;
use crate::synchronizer::Synchronizer;

#[derive(Debug, Deserialize)]
struct ViewerBody {
    viewer: Option<Address>,
}

/// Build an axum `Router` serving the given synchronizer.
///
/// `A` is the action type accepted by `POST /act`.
pub fn router<S, D, A>(sync: Synchronizer<S, D>) -> Router
where
    S: RecordSource + 'static,
    D: MutationDispatcher + 'static,
    A: Action + DeserializeOwned + 'static,
{
    Router::new()
        .route("/health", get(health_handler::<S, D>))
        .route("/snapshot", get(snapshot_handler::<S, D>))
        .route("/refresh", post(refresh_handler::<S, D>))
        .route("/act", post(act_handler::<S, D, A>))
        .route("/viewer", put(viewer_handler::<S, D>))
        .with_state(sync)
}

/// Serve the synchronizer over HTTP at the given address (e.g. `"0.0.0.0:3000"`).
pub async fn serve<S, D, A>(sync: Synchronizer<S, D>, addr: &str) -> Result<(), std::io::Error>
where
    S: RecordSource + 'static,
    D: MutationDispatcher + 'static,
    A: Action + DeserializeOwned + 'static,
{
    let app = router::<S, D, A>(sync);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

fn error_response(status: u16, message: String) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": message }))).into_response()
}

async fn health_handler<S, D>(State(sync): State<Synchronizer<S, D>>) -> Response
where
    S: RecordSource + 'static,
    D: MutationDispatcher + 'static,
{
    match sync.aggregator().observed_count() {
        Ok(count) => Json(json!({
            "ok": true,
            "collection": <S::Record as Record>::COLLECTION,
            "count": count,
            "functions": sync.dispatcher().functions(),
        }))
        .into_response(),
        Err(e) => error_response(e.status_code(), e.to_string()),
    }
}

async fn snapshot_handler<S, D>(State(sync): State<Synchronizer<S, D>>) -> Response
where
    S: RecordSource + 'static,
    D: MutationDispatcher + 'static,
{
    match sync.get_snapshot().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(e.status_code(), e.to_string()),
    }
}

async fn refresh_handler<S, D>(State(sync): State<Synchronizer<S, D>>) -> Response
where
    S: RecordSource + 'static,
    D: MutationDispatcher + 'static,
{
    match sync.refresh().await {
        Ok(refresh) => Json(refresh).into_response(),
        Err(e) => error_response(e.status_code(), e.to_string()),
    }
}

async fn act_handler<S, D, A>(
    State(sync): State<Synchronizer<S, D>>,
    Json(action): Json<A>,
) -> Response
where
    S: RecordSource + 'static,
    D: MutationDispatcher + 'static,
    A: Action + DeserializeOwned + 'static,
{
    match sync.act(&action).await {
        Ok(receipt) => Json(receipt).into_response(),
        Err(e) => error_response(e.status_code(), e.to_string()),
    }
}

async fn viewer_handler<S, D>(
    State(sync): State<Synchronizer<S, D>>,
    Json(body): Json<ViewerBody>,
) -> Response
where
    S: RecordSource + 'static,
    D: MutationDispatcher + 'static,
{
    match sync.set_viewer(body.viewer) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e.status_code(), e.to_string()),
    }
}
