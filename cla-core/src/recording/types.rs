use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecordedEvent {
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// Pairs a request with its response.
    pub correlation_id: String,
    pub event_type: EventType,
    pub direction: Direction,
    /// e.g. `webhook:pull_request`, `GET /repos/acme/x/collaborators/bob`, `response_204`
    pub operation: String,
    /// Sanitized payload.
    pub data: serde_json::Value,
}

impl RecordedEvent {
    pub fn now(
        correlation_id: &str,
        event_type: EventType,
        direction: Direction,
        operation: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id: correlation_id.to_string(),
            event_type,
            direction,
            operation: operation.into(),
            data,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    WebhookReceived,
    GitHubApiCall,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

#[derive(Clone, Debug)]
pub struct CorrelationId(pub String);

pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";
