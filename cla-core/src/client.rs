//! Authenticated access to the GitHub REST API.
//!
//! Requests name a resource either as a template relative to the API base
//! (`/repos/{owner}/{repo}/collaborators/{username}`) or as an absolute URL
//! handed to us by GitHub itself (pagination links, `pull_request.url`).
//! Every request goes through the shared [`RateLimiter`].

use std::sync::Arc;

use anyhow::Context;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::{ApiError, ApiResult};
use crate::link;
use crate::rate_limit::{RateLimitMiddleware, RateLimiter};
use crate::recording::{RecordingLogger, RecordingMiddleware, CORRELATION_ID_HEADER};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("cla-webhook/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in [`ApiError::Http`].
const MAX_ERROR_BODY: usize = 512;

/// One outbound call, described before it is resolved against the base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest<'a> {
    method: Method,
    resource: &'a str,
    params: Vec<(&'a str, &'a str)>,
    query: Vec<(&'a str, String)>,
    body: Option<serde_json::Value>,
    correlation_id: Option<&'a str>,
}

impl<'a> ApiRequest<'a> {
    pub fn new(method: Method, resource: &'a str) -> Self {
        Self {
            method,
            resource,
            params: Vec::new(),
            query: Vec::new(),
            body: None,
            correlation_id: None,
        }
    }

    pub fn get(resource: &'a str) -> Self {
        Self::new(Method::GET, resource)
    }

    pub fn post(resource: &'a str, body: serde_json::Value) -> Self {
        Self::new(Method::POST, resource).body(body)
    }

    /// Value substituted for `{name}` in the resource template.
    pub fn param(mut self, name: &'a str, value: &'a str) -> Self {
        self.params.push((name, value));
        self
    }

    pub fn query(mut self, name: &'a str, value: impl Into<String>) -> Self {
        self.query.push((name, value.into()));
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Tag the call with the delivery that caused it, so recordings of the
    /// webhook and of this call share an id.
    pub fn correlation_id(mut self, correlation_id: Option<&'a str>) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

/// A fully-read response. Non-2xx statuses are not errors at this level;
/// callers that need success use [`ApiResponse::error_for_status`].
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub(crate) url: String,
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Vec<u8>,
}

impl ApiResponse {
    /// Final URL the response came from.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// URL of the next page, taken from the `Link` header.
    pub fn next_link(&self) -> Option<String> {
        self.header("link").and_then(link::next_link)
    }

    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| ApiError::UnexpectedShape(e.to_string()))
    }

    /// Turn a non-2xx response into an error, telling GitHub's own quota
    /// refusals apart from other failures.
    pub fn error_for_status(self) -> ApiResult<Self> {
        if self.status.is_success() {
            return Ok(self);
        }

        let quota_spent = self.header("x-ratelimit-remaining") == Some("0");
        if self.status == StatusCode::TOO_MANY_REQUESTS
            || (self.status == StatusCode::FORBIDDEN && quota_spent)
        {
            let reset = self
                .header("x-ratelimit-reset")
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(ApiError::RateLimitExceeded { reset });
        }

        let mut body = String::from_utf8_lossy(&self.body).into_owned();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }

        Err(ApiError::Http {
            status: self.status.as_u16(),
            body,
        })
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: ClientWithMiddleware,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        token: String,
        limiter: Arc<RateLimiter>,
        recording_logger: Option<RecordingLogger>,
    ) -> anyhow::Result<Self> {
        Url::parse(base_url).with_context(|| format!("Invalid API base URL: {}", base_url))?;

        Ok(Self {
            http: create_api_client(limiter, recording_logger)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and read the whole response.
    ///
    /// Fails only when no response arrives or the request cannot be built;
    /// status classification is left to the caller.
    pub async fn call(&self, request: ApiRequest<'_>) -> ApiResult<ApiResponse> {
        let url = self.resolve(&request)?;

        debug!("{} {}", request.method, url);

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/vnd.github.v3+json");

        if let Some(cid) = request.correlation_id {
            builder = builder.header(CORRELATION_ID_HEADER, cid);
        }

        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| ApiError::UnexpectedShape(format!("unserialisable body: {}", e)))?;
            builder = builder.header(CONTENT_TYPE, "application/json").body(bytes);
        }

        let response = builder.send().await?;
        let url = response.url().to_string();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        debug!("{} {} -> {}", request.method, request.resource, status);

        Ok(ApiResponse {
            url,
            status,
            headers,
            body,
        })
    }

    fn resolve(&self, request: &ApiRequest<'_>) -> ApiResult<Url> {
        let resource = resolve_template(request.resource, &request.params)?;
        let mut url = resolve_url(&self.base_url, &resource)?;

        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &request.query {
                pairs.append_pair(name, value);
            }
        }

        Ok(url)
    }
}

/// Replace each `{name}` in `template` with its percent-encoded value.
pub fn resolve_template(template: &str, params: &[(&str, &str)]) -> ApiResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| ApiError::Template(format!("unclosed placeholder in {}", template)))?;
        let name = &after[..close];

        let value = params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| ApiError::Template(format!("no value for {{{}}} in {}", name, template)))?;
        out.push_str(&encode_path_segment(value));

        rest = &after[close + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

/// Absolute URLs pass through; anything else hangs off the API base.
pub fn resolve_url(base_url: &str, resource: &str) -> ApiResult<Url> {
    let joined = if resource.starts_with("https://") || resource.starts_with("http://") {
        resource.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            resource.trim_start_matches('/')
        )
    };

    Url::parse(&joined).map_err(|e| ApiError::Template(format!("{}: {}", joined, e)))
}

fn encode_path_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

pub fn create_api_client(
    limiter: Arc<RateLimiter>,
    recording_logger: Option<RecordingLogger>,
) -> anyhow::Result<ClientWithMiddleware> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to create HTTP client")?;

    let mut builder = ClientBuilder::new(client).with(RateLimitMiddleware::new(limiter));

    if let Some(logger) = recording_logger {
        builder = builder.with(RecordingMiddleware::new(logger));
    }

    Ok(builder.build())
}
