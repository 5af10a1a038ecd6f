use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;

use crate::utils::analytics;
use crate::utils::bridge::OpenFormSignal;
use crate::AppState;

#[derive(Deserialize, Default)]
pub struct OpenFormRequest {
    source: Option<String>,
}

/// Known CTA event kinds; anything else is tracked as plain `cta_click` so a
/// client can't invent event names.
const CTA_EVENT_KINDS: &[&str] = &["cta_click_primary", "cta_click_secondary", "cta_click"];

fn cta_event_kind(source: Option<&str>) -> &'static str {
    source
        .and_then(|s| CTA_EVENT_KINDS.iter().find(|kind| **kind == s))
        .copied()
        .unwrap_or("cta_click")
}

/// Any UI trigger posts here to ask the lead form to open. Mirrors the
/// trigger side of the open-form contract: track the CTA event, then
/// broadcast the signal to whoever is listening.
pub async fn open_lead_form(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<OpenFormRequest>,
) -> Json<serde_json::Value> {
    let kind = cta_event_kind(req.source.as_deref());
    let ua = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    state
        .analytics
        .track(kind, "/", analytics::device_type(ua), None)
        .await;

    let listeners = state
        .form_events
        .send(OpenFormSignal { source: req.source })
        .unwrap_or(0);
    Json(json!({ "listeners": listeners }))
}

/// SSE stream of open-form signals for the form controller.
pub async fn lead_form_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.form_events.subscribe();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(signal) => {
                    let event = Event::default()
                        .event("openLeadForm")
                        .json_data(&signal)
                        .unwrap_or_else(|_| Event::default().event("openLeadForm"));
                    return Some((Ok::<_, Infallible>(event), rx));
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
