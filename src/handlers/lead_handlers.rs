use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::HeaderMap;
use axum::Json;

use crate::handlers::lead_dtos::{LeadResult, ValidationOutcome};
use crate::utils::analytics;
use crate::utils::mailer::LeadDelivery;
use crate::utils::rate_limit::RateLimit;
use crate::utils::{timing, validation};
use crate::AppState;

/// Submissions completed faster than this are treated as bot-speed.
pub const MIN_FORM_FILL_MS: i64 = 800;

/// Fallback identity when the reverse proxy supplies no client address.
pub const ANON_KEY: &str = "anon-session";

const MSG_TOO_FAST: &str = "Please take a moment and try again.";
const MSG_RATE_LIMITED: &str = "Too many requests. Please try again later.";
const MSG_DELIVERY_FAILED: &str = "Email send failed. Please try again later or use WhatsApp.";
const MSG_UNEXPECTED: &str = "Something went wrong. Please try again.";

/// Rate-limit identity: first hop of `X-Forwarded-For` when present.
pub fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| ANON_KEY.to_string())
}

pub async fn submit_lead(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(fields): Form<HashMap<String, String>>,
) -> Json<LeadResult> {
    let key = client_key(&headers);
    let result = process_lead(&state.mailer, state.limiter.as_ref(), &fields, &key).await;

    let event = if result.ok {
        "form_submit_success"
    } else {
        "form_submit_error"
    };
    let ua = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    state
        .analytics
        .track(event, "/api/lead", analytics::device_type(ua), None)
        .await;

    Json(result)
}

/// Runs the whole submission pipeline and never lets a failure escape:
/// anything unexpected is logged server-side and collapsed to a generic
/// rejection.
pub async fn process_lead<D: LeadDelivery>(
    delivery: &D,
    limiter: &dyn RateLimit,
    fields: &HashMap<String, String>,
    client_key: &str,
) -> LeadResult {
    let t_start = timing::now_ms();
    match run_pipeline(delivery, limiter, fields, client_key, t_start).await {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(
                "lead submission failed unexpectedly after {}ms: {:#}",
                timing::now_ms() - t_start,
                err
            );
            LeadResult::rejected(MSG_UNEXPECTED)
        }
    }
}

// Linear pipeline; each stage is terminal on rejection. The stage order is
// part of the observable contract (which message a given bad submission gets),
// so don't rearrange it.
async fn run_pipeline<D: LeadDelivery>(
    delivery: &D,
    limiter: &dyn RateLimit,
    fields: &HashMap<String, String>,
    client_key: &str,
    t_start: i64,
) -> anyhow::Result<LeadResult> {
    let input = validation::parse_form_data(fields);

    // Honeypot & basic schema validation
    let (data, soft_warning) = match validation::validate_lead(input) {
        ValidationOutcome::Rejected { reason } => return Ok(LeadResult::rejected(&reason)),
        ValidationOutcome::Accepted { data, soft_warning } => (data, soft_warning),
    };

    // Timing guard: reject bot-quick submissions
    let elapsed_client = timing::compute_elapsed_ms_from_t0(data.t0.as_deref(), timing::now_ms());
    if elapsed_client.is_some_and(|ms| ms < MIN_FORM_FILL_MS) {
        return Ok(LeadResult::rejected(MSG_TOO_FAST));
    }

    if !limiter.check(client_key, timing::now_ms()) {
        tracing::warn!("rate limit exceeded for key {}", client_key);
        return Ok(LeadResult::rejected(MSG_RATE_LIMITED));
    }

    if let Err(e) = delivery.deliver(&data, soft_warning.as_deref()).await {
        tracing::error!("lead delivery failed: {}", e);
        return Ok(LeadResult::rejected(MSG_DELIVERY_FAILED));
    }

    let elapsed = timing::now_ms() - t_start;
    Ok(LeadResult::accepted(
        format!("Thanks! We'll be in touch. ({}ms)", elapsed),
        soft_warning,
    ))
}
