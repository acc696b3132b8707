//! HTTP trigger for the scheduler.
use axum::http::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{extract::State, Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::dispatch::{Dispatcher, RunResult};
use crate::error::DispatchError;

/// Set on trigger responses; `failed` means the run result may not match
/// what was persisted.
pub const RECONCILE_STATUS_HEADER: &str = "x-reconcile-status";

#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(trigger))
        .route("/email-notification", post(trigger))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run one dispatch. Always 200: dispatch failure is reported in the body.
///
/// The run is spawned so a caller that disconnects or times out does not
/// cancel it between the send and the status write-back.
async fn trigger(State(state): State<AppState>) -> Response {
    let dispatcher = state.dispatcher.clone();
    let (result, reconcile_failed) =
        match tokio::spawn(async move { dispatcher.run().await }).await {
            Ok(report) => (report.result, report.reconcile.is_failed()),
            Err(err) => {
                error!(error = %err, "dispatch task did not complete");
                let err = DispatchError::Panicked(err.to_string());
                (RunResult::from_error(Some(err)), true)
            }
        };
    let reconcile_status = if reconcile_failed { "failed" } else { "ok" };
    let mut response = Json(result).into_response();
    response.headers_mut().insert(
        HeaderName::from_static(RECONCILE_STATUS_HEADER),
        HeaderValue::from_static(reconcile_status),
    );
    response
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
