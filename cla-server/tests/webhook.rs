use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use cla_core::{Engine, EngineConfig, EventType, RateWindow, RecordingLogger, RepoId, Settings};
use cla_server::{app, AppState};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PREFIX: &str = "MuleSoft Contributor Agreement Acceptance";

fn test_app(github: &MockServer, secret: Option<&str>) -> Router {
    recorded_app(github, secret, None)
}

fn recorded_app(github: &MockServer, secret: Option<&str>, recorder: Option<RecordingLogger>) -> Router {
    let engine = Engine::new(EngineConfig {
        api_url: github.uri(),
        token: "test-token".to_string(),
        rate_window: RateWindow::default(),
        settings: Settings {
            organizations: vec!["acme".to_string(), "widgets".to_string()],
            agreement_repo: RepoId {
                owner: "acme".to_string(),
                name: "agreements".to_string(),
            },
            ..Settings::default()
        },
        recording_logger: recorder.clone(),
    })
    .unwrap();

    app(Arc::new(AppState {
        engine,
        webhook_secret: secret.map(str::to_string),
        recording_logger: recorder,
    }))
}

fn delivery(event: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header("x-github-event", event)
        .header("x-github-delivery", "72d3162e-cc78-11e3-81ab-4c9367dc0958")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn pull_request(owner: &str, repo: &str, sha: &str, author: &str) -> Value {
    json!({
        "number": 1,
        "user": {"login": author},
        "head": {"sha": sha},
        "base": {"repo": {"name": repo, "owner": {"login": owner}}}
    })
}

fn pull_request_event(owner: &str, sha: &str, author: &str) -> Value {
    json!({
        "action": "opened",
        "repository": {"name": "x", "full_name": format!("{}/x", owner), "owner": {"login": owner}},
        "pull_request": pull_request(owner, "x", sha, author)
    })
}

async fn mount_github(github: &MockServer, author: &str, titles: &[&str]) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/repos/[^/]+/[^/]+/statuses/[^/]+$"))
        .respond_with(ResponseTemplate::new(201))
        .mount(github)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/repos/[^/]+/[^/]+/collaborators/[^/]+$"))
        .respond_with(ResponseTemplate::new(404))
        .mount(github)
        .await;
    let issues: Vec<Value> = titles.iter().map(|t| json!({"title": t})).collect();
    Mock::given(method("GET"))
        .and(path("/repos/acme/agreements/issues"))
        .and(query_param("creator", author))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(issues)))
        .mount(github)
        .await;
}

/// Wait for the background review to write `count` statuses to `sha`.
async fn wait_for_statuses(github: &MockServer, sha: &str, count: usize) -> Vec<String> {
    let suffix = format!("/statuses/{}", sha);
    let mut states = Vec::new();
    for _ in 0..200 {
        states = github
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|req| req.method.as_str() == "POST" && req.url.path().ends_with(&suffix))
            .map(|req| {
                let body: Value = serde_json::from_slice(&req.body).unwrap();
                body["state"].as_str().unwrap().to_string()
            })
            .collect();
        if states.len() >= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    states
}

#[tokio::test]
async fn test_health_reports_service() {
    let github = MockServer::start().await;
    let response = test_app(&github, None)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "cla-server");
}

#[tokio::test]
async fn test_help_lists_webhook_endpoint() {
    let github = MockServer::start().await;
    let response = test_app(&github, None)
        .oneshot(Request::get("/help").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let body = body_json(response).await;
    let paths: Vec<&str> = body["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["path"].as_str())
        .collect();
    assert!(paths.contains(&"/webhook"));
}

#[tokio::test]
async fn test_unsigned_pull_request_without_agreement_fails() {
    let github = MockServer::start().await;
    mount_github(&github, "bob", &[]).await;

    let response = test_app(&github, None)
        .oneshot(delivery("pull_request", &pull_request_event("acme", "abc", "bob")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        wait_for_statuses(&github, "abc", 2).await,
        vec!["pending", "failure"]
    );
}

#[tokio::test]
async fn test_pull_request_with_agreement_succeeds() {
    let github = MockServer::start().await;
    let title = format!("{} - bob", PREFIX);
    mount_github(&github, "bob", &[title.as_str()]).await;

    let response = test_app(&github, None)
        .oneshot(delivery("pull_request", &pull_request_event("acme", "abc", "bob")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        wait_for_statuses(&github, "abc", 2).await,
        vec!["pending", "success"]
    );
}

#[tokio::test]
async fn test_review_calls_share_the_delivery_correlation_id() {
    let github = MockServer::start().await;
    mount_github(&github, "bob", &[]).await;
    let (recorder, mut events) = RecordingLogger::in_memory();

    let response = recorded_app(&github, None, Some(recorder))
        .oneshot(delivery("pull_request", &pull_request_event("acme", "abc", "bob")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    wait_for_statuses(&github, "abc", 2).await;

    let webhook = events.try_recv().unwrap();
    assert_eq!(webhook.event_type, EventType::WebhookReceived);
    assert_eq!(webhook.operation, "webhook:pull_request");

    let mut api_calls = 0;
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.event_type, EventType::GitHubApiCall);
        assert_eq!(event.correlation_id, webhook.correlation_id, "{}", event.operation);
        api_calls += 1;
    }
    // Status writes, collaborator and agreement lookups, each with a request event
    assert!(api_calls >= 4, "only {} API events recorded", api_calls);

    for request in github.received_requests().await.unwrap() {
        let header = request.headers.get("x-correlation-id").unwrap();
        assert_eq!(header.to_str().unwrap(), webhook.correlation_id);
    }
}

#[tokio::test]
async fn test_agreement_issue_reverifies_open_pull_requests() {
    let github = MockServer::start().await;
    mount_github(&github, "carol", &[PREFIX]).await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .and(query_param(
            "q",
            "user:acme user:widgets type:pr author:carol is:open",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"pull_request": {"url": format!("{}/repos/acme/x/pulls/1", github.uri())}},
                {"pull_request": {"url": format!("{}/repos/widgets/y/pulls/2", github.uri())}}
            ]
        })))
        .mount(&github)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/x/pulls/1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(pull_request("acme", "x", "sha-x", "carol")),
        )
        .mount(&github)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/widgets/y/pulls/2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(pull_request("widgets", "y", "sha-y", "carol")),
        )
        .mount(&github)
        .await;

    let event = json!({
        "action": "opened",
        "repository": {"name": "agreements", "full_name": "acme/agreements", "owner": {"login": "acme"}},
        "issue": {"title": PREFIX, "user": {"login": "carol"}}
    });
    let response = test_app(&github, None)
        .oneshot(delivery("issues", &event))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        wait_for_statuses(&github, "sha-x", 2).await,
        vec!["pending", "success"]
    );
    assert_eq!(
        wait_for_statuses(&github, "sha-y", 2).await,
        vec!["pending", "success"]
    );
}

#[tokio::test]
async fn test_ignored_events_are_acknowledged() {
    let github = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&github)
        .await;

    let response = test_app(&github, None)
        .oneshot(delivery("pull_request", &pull_request_event("elsewhere", "abc", "bob")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().starts_with("Ignored"));
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let github = MockServer::start().await;
    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("x-github-event", "pull_request")
        .body(Body::from("{not json"))
        .unwrap();

    let response = test_app(&github, None).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_signature_required_when_secret_configured() {
    let github = MockServer::start().await;
    let event = json!({"action": "closed"});
    let body = serde_json::to_vec(&event).unwrap();

    let unsigned = test_app(&github, Some("s3cret"))
        .oneshot(delivery("pull_request", &event))
        .await
        .unwrap();
    assert_eq!(unsigned.status(), StatusCode::UNAUTHORIZED);

    let mut mac = Hmac::<Sha256>::new_from_slice(b"s3cret").unwrap();
    mac.update(&body);
    let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

    let mut signed = delivery("pull_request", &event);
    signed
        .headers_mut()
        .insert("x-hub-signature-256", signature.parse().unwrap());
    let response = test_app(&github, Some("s3cret"))
        .oneshot(signed)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut forged = delivery("pull_request", &event);
    forged
        .headers_mut()
        .insert("x-hub-signature-256", "sha256=00".parse().unwrap());
    let response = test_app(&github, Some("s3cret"))
        .oneshot(forged)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
