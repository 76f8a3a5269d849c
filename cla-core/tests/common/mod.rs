#![allow(dead_code)]

use cla_core::{Engine, EngineConfig, RateWindow, Settings};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "test-token";
pub const AGREEMENT_ISSUES: &str = "/repos/mulesoft/contributor-agreements/issues";

pub fn settings() -> Settings {
    Settings {
        organizations: vec!["acme".to_string(), "widgets".to_string()],
        ..Settings::default()
    }
}

pub fn engine(server: &MockServer) -> Engine {
    Engine::new(EngineConfig {
        api_url: server.uri(),
        token: TOKEN.to_string(),
        rate_window: RateWindow::default(),
        settings: settings(),
        recording_logger: None,
    })
    .unwrap()
}

/// Accept every status write.
pub async fn mount_status_sink(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/repos/[^/]+/[^/]+/statuses/[^/]+$"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .mount(server)
        .await;
}

pub async fn mount_collaborator(server: &MockServer, owner: &str, repo: &str, user: &str, member: bool) {
    let status = if member { 204 } else { 404 };
    Mock::given(method("GET"))
        .and(path(format!("/repos/{}/{}/collaborators/{}", owner, repo, user)))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

pub async fn mount_agreement_issues(server: &MockServer, user: &str, titles: &[&str]) {
    let issues: Vec<Value> = titles
        .iter()
        .map(|title| json!({"title": title, "state": "open", "user": {"login": user}}))
        .collect();
    Mock::given(method("GET"))
        .and(path(AGREEMENT_ISSUES))
        .and(query_param("creator", user))
        .and(query_param("state", "open"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(issues)))
        .mount(server)
        .await;
}

pub fn pull_request(owner: &str, repo: &str, sha: &str, author: &str) -> Value {
    json!({
        "number": 1,
        "state": "open",
        "user": {"login": author},
        "head": {"sha": sha, "ref": "feature"},
        "base": {"ref": "main", "repo": {"name": repo, "full_name": format!("{}/{}", owner, repo), "owner": {"login": owner}}}
    })
}

/// States written to `sha`, in the order the server received them.
pub async fn status_writes(server: &MockServer, sha: &str) -> Vec<String> {
    let suffix = format!("/statuses/{}", sha);
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|req| req.method.as_str() == "POST" && req.url.path().ends_with(&suffix))
        .map(|req| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            body["state"].as_str().unwrap().to_string()
        })
        .collect()
}
