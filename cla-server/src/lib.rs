pub mod config;
pub mod webhook;

use axum::{
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use cla_core::{Engine, RecordingLogger};

use crate::webhook::webhook_router;

pub const SERVICE_NAME: &str = "cla-server";

pub fn service_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct AppState {
    pub engine: Engine,
    /// Deliveries must be signed with this when set.
    pub webhook_secret: Option<String>,
    pub recording_logger: Option<RecordingLogger>,
}

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": service_version()
    })))
}

async fn help_handler() -> Json<serde_json::Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": service_version(),
        "description": "Marks pull requests with whether their author has accepted the contributor agreement",
        "endpoints": [
            {
                "path": "/health",
                "method": "GET",
                "description": "Health check endpoint",
                "authentication": "None"
            },
            {
                "path": "/webhook",
                "method": "POST",
                "description": "GitHub webhook receiver for pull_request and issues events",
                "authentication": "GitHub webhook signature (X-Hub-Signature-256) when GITHUB_WEBHOOK_SECRET is set"
            },
            {
                "path": "/help",
                "method": "GET",
                "description": "API documentation and service information",
                "authentication": "None"
            }
        ],
        "configuration": {
            "required_env_vars": ["GITHUB_ACCESS_TOKEN"],
            "optional_env_vars": [
                "CLA_USERS (default: mulesoft, mulesoft-labs, mulesoft-consulting)",
                "CLA_REPOSITORY (default: mulesoft/contributor-agreements)",
                "CLA_TITLE_PREFIX (default: MuleSoft Contributor Agreement Acceptance)",
                "TARGET_URL",
                "STATUS_CONTEXT (default: mulesoft/cla)",
                "GITHUB_API_URL (default: https://api.github.com)",
                "GITHUB_RATE_LIMIT (default: 5000 per hour)",
                "GITHUB_WEBHOOK_SECRET (default: unset, signatures not checked)",
                "PORT (default: 3000)",
                "RECORDING_ENABLED (default: false)",
                "RECORDING_LOG_PATH (default: recordings.jsonl)"
            ]
        }
    }))
}

/// The full HTTP surface: health, help and the webhook receiver.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/help", get(help_handler))
        .merge(webhook_router(state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
