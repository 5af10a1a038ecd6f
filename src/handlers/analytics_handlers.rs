use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::analytics;
use crate::AppState;

#[derive(Deserialize)]
pub struct TrackRequest {
    name: String,
    path: Option<String>,
    props: Option<Map<String, Value>>,
}

#[derive(Serialize)]
pub struct TrackResponse {
    emitted: bool,
}

/// UI-facing entry point for interaction events. Always answers 200; whether
/// the event actually went anywhere is best-effort by design.
pub async fn track_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TrackRequest>,
) -> Json<TrackResponse> {
    let ua = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    let emitted = state
        .analytics
        .track(
            &req.name,
            req.path.as_deref().unwrap_or("/"),
            analytics::device_type(ua),
            req.props,
        )
        .await;
    Json(TrackResponse { emitted })
}
