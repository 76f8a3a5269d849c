use super::sanitizer::Sanitizer;
use super::types::{CorrelationId, CORRELATION_ID_HEADER};
use super::{Direction, EventType, RecordedEvent, RecordingLogger};
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};
use std::collections::HashMap;
use uuid::Uuid;

/// Bodies larger than this are recorded by size only.
const MAX_RECORDED_BODY: usize = 10_000;

/// Records each outbound request and the matching response status.
pub struct RecordingMiddleware {
    logger: RecordingLogger,
}

impl RecordingMiddleware {
    pub fn new(logger: RecordingLogger) -> Self {
        Self { logger }
    }
}

#[async_trait::async_trait]
impl Middleware for RecordingMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        let correlation_id = req
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| extensions.get::<CorrelationId>().map(|id| id.0.clone()))
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if !req.headers().contains_key(CORRELATION_ID_HEADER) {
            if let Ok(value) = correlation_id.parse() {
                req.headers_mut().insert(CORRELATION_ID_HEADER, value);
            }
        }

        self.logger.record(RecordedEvent::now(
            &correlation_id,
            EventType::GitHubApiCall,
            Direction::Request,
            format!("{} {}", req.method(), req.url().path()),
            serde_json::json!({
                "method": req.method().as_str(),
                "url": req.url().as_str(),
                "headers": Sanitizer::sanitize_headers(&headers_to_map(req.headers())),
                "body": describe_body(&req),
            }),
        ));

        let response = next.run(req, extensions).await;

        let event = match &response {
            Ok(resp) => RecordedEvent::now(
                &correlation_id,
                EventType::GitHubApiCall,
                Direction::Response,
                format!("response_{}", resp.status().as_u16()),
                serde_json::json!({
                    "status_code": resp.status().as_u16(),
                    "headers": Sanitizer::sanitize_headers(&headers_to_map(resp.headers())),
                }),
            ),
            Err(err) => RecordedEvent::now(
                &correlation_id,
                EventType::GitHubApiCall,
                Direction::Response,
                "error",
                serde_json::json!({ "error": err.to_string() }),
            ),
        };
        self.logger.record(event);

        response
    }
}

fn describe_body(req: &Request) -> serde_json::Value {
    let Some(body) = req.body() else {
        return serde_json::Value::Null;
    };
    match body.as_bytes() {
        Some(bytes) if bytes.len() > MAX_RECORDED_BODY => {
            serde_json::Value::String(format!("[LARGE_BODY_{}b]", bytes.len()))
        }
        Some(bytes) => match serde_json::from_slice::<serde_json::Value>(bytes) {
            Ok(json) => Sanitizer::sanitize_json(&json),
            Err(_) => serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()),
        },
        None => serde_json::Value::String("[STREAM_BODY]".to_string()),
    }
}

pub(crate) fn headers_to_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}
