use dotenvy::dotenv;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

mod handlers {
    pub mod lead_dtos;
    pub mod lead_handlers;
    pub mod analytics_handlers;
    pub mod bridge_handlers;
}
mod utils {
    pub mod analytics;
    pub mod bridge;
    pub mod mailer;
    pub mod rate_limit;
    pub mod timing;
    pub mod validation;
}

use handlers::{analytics_handlers, bridge_handlers, lead_handlers};
use utils::analytics::AnalyticsEmitter;
use utils::bridge::{form_events_channel, FormEvents};
use utils::mailer::Mailer;
use utils::rate_limit::{limiter_from_env, RateLimit};

pub struct AppState {
    pub mailer: Mailer,
    pub limiter: Arc<dyn RateLimit>,
    pub analytics: AnalyticsEmitter,
    pub form_events: FormEvents,
}

async fn health_check() -> &'static str {
    "OK"
}

pub fn validate_env() {
    // None of these are fatal at startup: missing mail config degrades to a
    // delivery rejection at submit time, missing analytics to a no-op.
    let recommended = [
        "LEAD_INBOX",
        "RESEND_API_KEY",
        "SMTP_HOST",
        "SMTP_USERNAME",
        "SMTP_PASSWORD",
        "ANALYTICS_URL",
        "FRONTEND_URL",
    ];
    for var in recommended.iter() {
        if std::env::var(var).map(|v| v.is_empty()).unwrap_or(true) {
            tracing::warn!("{} is not set", var);
        }
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let _sentry_guard = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    use tracing_subscriber::{fmt, EnvFilter};
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,leadgate=debug"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();
    validate_env();

    let state = Arc::new(AppState {
        mailer: Mailer::from_env(),
        limiter: limiter_from_env(),
        analytics: AnalyticsEmitter::from_env(),
        form_events: form_events_channel(),
    });

    // Public routes, no auth model; the submission endpoint rate limits itself
    let app = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/lead", post(lead_handlers::submit_lead))
        .route("/api/analytics/track", post(analytics_handlers::track_event))
        .route("/api/lead/open", post(bridge_handlers::open_lead_form))
        .route("/api/lead/events", get(bridge_handlers::lead_form_events))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_origin(AllowOrigin::exact(
                    std::env::var("FRONTEND_URL")
                        .unwrap_or_else(|_| "http://localhost:8080".to_string())
                        .parse()
                        .expect("Invalid FRONTEND_URL"),
                ))
                .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::ACCEPT]),
        )
        .with_state(state);

    use tokio::net::TcpListener;
    let port = match std::env::var("ENVIRONMENT").as_deref() {
        Ok("staging") => 3100,
        _ => 3000,
    };
    tracing::info!("Starting server on port {}", port);
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .expect("Failed to bind port");
    axum::serve(listener, app.into_make_service())
        .await
        .expect("server error");
}
