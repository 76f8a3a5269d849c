use serde_json::Value;
use std::collections::HashMap;

/// Header names whose values never reach a recording.
pub const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "x-hub-signature-256"];

const SENSITIVE_FIELDS: &[&str] = &["token", "secret", "password", "private_key"];

pub struct Sanitizer;

impl Sanitizer {
    pub fn sanitize_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(key, value)| {
                let redact = SENSITIVE_HEADERS.contains(&key.to_lowercase().as_str());
                let value = if redact {
                    "[REDACTED]".to_string()
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect()
    }

    pub fn sanitize_json(value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, val)| {
                        let val = if SENSITIVE_FIELDS.contains(&key.as_str()) {
                            Value::String("[REDACTED]".to_string())
                        } else {
                            Self::sanitize_json(val)
                        };
                        (key.clone(), val)
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(Self::sanitize_json).collect()),
            _ => value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_credentials_are_redacted_from_headers() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer ghp_secret".to_string());
        headers.insert("X-Hub-Signature-256".to_string(), "sha256=abc".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());

        let clean = Sanitizer::sanitize_headers(&headers);
        assert_eq!(clean["Authorization"], "[REDACTED]");
        assert_eq!(clean["X-Hub-Signature-256"], "[REDACTED]");
        assert_eq!(clean["Accept"], "application/json");
    }

    #[test]
    fn test_nested_secret_fields_are_redacted() {
        let value = json!({
            "hook": {"config": {"secret": "hunter2", "url": "https://example.com"}},
            "items": [{"token": "t"}, {"title": "keep"}]
        });

        let clean = Sanitizer::sanitize_json(&value);
        assert_eq!(clean["hook"]["config"]["secret"], "[REDACTED]");
        assert_eq!(clean["hook"]["config"]["url"], "https://example.com");
        assert_eq!(clean["items"][0]["token"], "[REDACTED]");
        assert_eq!(clean["items"][1]["title"], "keep");
    }
}
