use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Extension, Router,
};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use cla_core::status::Account;
use cla_core::{
    CorrelationId, Direction, EventType, PullRequest, PullRequestRef, RecordedEvent, Sanitizer,
    Settings,
};

use crate::AppState;

#[derive(Debug, Deserialize, Clone)]
pub struct Repository {
    pub full_name: String,
    pub owner: Account,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Issue {
    pub title: String,
    pub user: Account,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

/// What to do about one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    VerifyPullRequest(PullRequestRef),
    /// Re-check every open pull request by this author.
    ReverifyAuthor(String),
    Ignore(&'static str),
}

fn field<T: DeserializeOwned>(payload: &Value, name: &str) -> Option<T> {
    payload.get(name).and_then(|v| T::deserialize(v).ok())
}

/// Decide how to react to a delivery of `event` carrying `payload`.
///
/// Only opened pull requests in covered organizations and newly opened
/// agreement issues are acted on. Payloads lacking the fields a rule
/// reads are ignored rather than rejected.
pub fn route(event: &str, payload: &Value, settings: &Settings) -> Action {
    if payload.get("action").and_then(Value::as_str) != Some("opened") {
        return Action::Ignore("action is not opened");
    }

    let Some(repository) = field::<Repository>(payload, "repository") else {
        return Action::Ignore("payload has no repository");
    };

    match event {
        "pull_request" => {
            if !settings.covers_owner(&repository.owner.login) {
                return Action::Ignore("repository owner is not covered");
            }
            match field::<PullRequest>(payload, "pull_request") {
                Some(pr) => Action::VerifyPullRequest(PullRequestRef::from(&pr)),
                None => Action::Ignore("payload has no usable pull_request"),
            }
        }
        "issues" => {
            if !settings.is_agreement_repo(&repository.full_name) {
                return Action::Ignore("issue is outside the agreement repository");
            }
            match field::<Issue>(payload, "issue") {
                Some(issue) if settings.is_agreement_title(&issue.title) => {
                    Action::ReverifyAuthor(issue.user.login)
                }
                Some(_) => Action::Ignore("issue is not an agreement"),
                None => Action::Ignore("payload has no usable issue"),
            }
        }
        _ => Action::Ignore("event is not handled"),
    }
}

type HmacSha256 = Hmac<Sha256>;

pub fn verify_github_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(signature_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let signature_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    mac.update(payload);

    // Constant-time comparison
    mac.verify_slice(&signature_bytes).is_ok()
}

async fn verify_webhook_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let correlation_id = CorrelationId(Uuid::new_v4().to_string());

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    if let Some(secret) = &state.webhook_secret {
        let signature = parts
            .headers
            .get("x-hub-signature-256")
            .and_then(|h| h.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        if !verify_github_signature(secret, &bytes, signature) {
            error!("Invalid webhook signature");
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    if let Some(ref logger) = state.recording_logger {
        let event_name = header_str(&parts.headers, "x-github-event").unwrap_or("unknown");
        logger.record(RecordedEvent::now(
            &correlation_id.0,
            EventType::WebhookReceived,
            Direction::Request,
            format!("webhook:{}", event_name),
            serde_json::json!({
                "headers": Sanitizer::sanitize_headers(&headers_to_hashmap(&parts.headers)),
                "body": serde_json::from_slice::<Value>(&bytes)
                    .map(|body| Sanitizer::sanitize_json(&body))
                    .unwrap_or(Value::Null)
            }),
        ));
    }

    let mut new_request = Request::from_parts(parts, axum::body::Body::from(bytes));
    new_request.extensions_mut().insert(correlation_id);

    Ok(next.run(new_request).await)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn headers_to_hashmap(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (name, value) in headers {
        if let Ok(value_str) = value.to_str() {
            map.insert(name.to_string(), value_str.to_string());
        }
    }
    map
}

pub async fn github_webhook_handler(
    State(state): State<Arc<AppState>>,
    correlation_id: Option<Extension<CorrelationId>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, StatusCode> {
    let name = header_str(&headers, "x-github-event").unwrap_or("");
    let delivery = header_str(&headers, "x-github-delivery").unwrap_or("");

    info!("new event: {} {}", name, delivery);

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!("Rejecting delivery {} with unparseable body: {}", delivery, e);
        StatusCode::BAD_REQUEST
    })?;

    let correlation_id = correlation_id
        .map(|Extension(id)| id.0)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let message = match route(name, &payload, state.engine.settings()) {
        Action::VerifyPullRequest(pr) => {
            let message = format!("Verifying {} by {}", pr.target(), pr.author);
            info!("{} [correlation_id={}]", message, correlation_id);

            let engine = state.engine.clone();
            tokio::spawn(async move {
                engine
                    .verifier
                    .review_correlated(&pr, Some(&correlation_id))
                    .await;
            });
            message
        }
        Action::ReverifyAuthor(username) => {
            let message = format!("Re-verifying pull requests by {}", username);
            info!("{} [correlation_id={}]", message, correlation_id);

            let engine = state.engine.clone();
            tokio::spawn(async move {
                engine
                    .bulk
                    .reverify_all_correlated(&username, Some(&correlation_id))
                    .await;
            });
            message
        }
        Action::Ignore(reason) => {
            info!("Ignoring {} delivery {}: {}", name, delivery, reason);
            format!("Ignored: {}", reason)
        }
    };

    Ok(Json(WebhookResponse { message }))
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(github_webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_webhook_signature,
        ))
}
