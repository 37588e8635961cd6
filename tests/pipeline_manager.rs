//! Integration tests for the pipeline manager
//!
//! These tests run real stage servers on localhost with ephemeral ports and
//! put a manager in front of them.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::sleep;

use plumb::client::HttpStageClient;
use plumb::runtime::ForwardingChain;
use plumb::server::{serve_manager, ManagerState};

const LIMIT: usize = 1024;

/// Serve `app` on an ephemeral port and return its base URL
async fn spawn_stage(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stage");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A stage that appends its name to the `visited` array of the payload.
/// Payloads carrying `"fail": true` get a 500 instead.
fn appending_stage(name: &'static str, hits: Arc<AtomicUsize>) -> Router {
    Router::new().route(
        "/",
        post(move |body: Bytes| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                let mut payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
                if payload["fail"] == serde_json::json!(true) {
                    return (StatusCode::INTERNAL_SERVER_ERROR, "asked to fail".to_string());
                }
                payload["visited"]
                    .as_array_mut()
                    .unwrap()
                    .push(serde_json::json!(name));
                (StatusCode::OK, payload.to_string())
            }
        }),
    )
}

fn failing_stage() -> Router {
    Router::new().route(
        "/",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "stage exploded") }),
    )
}

fn oversized_stage() -> Router {
    Router::new().route("/", post(|| async { "x".repeat(LIMIT * 4) }))
}

fn loud_failing_stage() -> Router {
    Router::new().route(
        "/",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "E".repeat(LIMIT * 1000)) }),
    )
}

fn slow_stage(delay: Duration) -> Router {
    Router::new().route(
        "/",
        post(move |body: Bytes| async move {
            sleep(delay).await;
            body
        }),
    )
}

type Manager = (SocketAddr, watch::Sender<bool>, tokio::task::JoinHandle<()>);

/// Start a manager for `stages` and return its address plus the shutdown sender
async fn spawn_manager(stages: Vec<String>) -> Manager {
    spawn_manager_with_timeout(stages, Duration::from_secs(5)).await
}

async fn spawn_manager_with_timeout(stages: Vec<String>, timeout: Duration) -> Manager {
    let (tx, rx) = watch::channel(false);
    let client = HttpStageClient::new(timeout, LIMIT).unwrap();
    let state = ManagerState::new(Arc::new(client), ForwardingChain::new(stages), rx, LIMIT);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind manager");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        serve_manager(listener, state).await.unwrap();
    });

    // Give server time to start
    sleep(Duration::from_millis(50)).await;
    (addr, tx, handle)
}

#[tokio::test]
async fn test_payload_walks_stages_in_order() {
    let hits = Arc::new(AtomicUsize::new(0));
    let stages = vec![
        spawn_stage(appending_stage("source", hits.clone())).await,
        spawn_stage(appending_stage("filter", hits.clone())).await,
        spawn_stage(appending_stage("sink", hits.clone())).await,
    ];
    let (addr, _tx, _handle) = spawn_manager(stages).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/", addr))
        .header("content-type", "application/json")
        .body(r#"{"visited":[]}"#)
        .send()
        .await
        .expect("Failed to reach manager");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["visited"], serde_json::json!(["source", "filter", "sink"]));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_failing_stage_stops_the_walk() {
    let first = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(AtomicUsize::new(0));
    let stages = vec![
        spawn_stage(appending_stage("source", first.clone())).await,
        spawn_stage(failing_stage()).await,
        spawn_stage(appending_stage("sink", last.clone())).await,
    ];
    let (addr, _tx, _handle) = spawn_manager(stages).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/", addr))
        .body(r#"{"visited":[]}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "forward_failure");
    assert_eq!(body["stage"], serde_json::json!(1));
    assert!(body["error"].as_str().unwrap().contains("500"));

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(last.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_oversized_stage_response_is_reported() {
    let hits = Arc::new(AtomicUsize::new(0));
    let stages = vec![
        spawn_stage(appending_stage("source", hits.clone())).await,
        spawn_stage(oversized_stage()).await,
    ];
    let (addr, _tx, _handle) = spawn_manager(stages).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/", addr))
        .body(r#"{"visited":[]}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "payload_too_large");
    assert_eq!(body["stage"], serde_json::json!(1));
}

#[tokio::test]
async fn test_failing_stage_body_is_capped() {
    let stages = vec![spawn_stage(loud_failing_stage()).await];
    let (addr, _tx, _handle) = spawn_manager(stages).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/", addr))
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let raw = response.bytes().await.unwrap();
    assert!(raw.len() < LIMIT + 512, "error body is {} bytes", raw.len());

    let body: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(body["kind"], "forward_failure");
    assert!(body["error"].as_str().unwrap().ends_with("[truncated]"));
}

#[tokio::test]
async fn test_stage_timeout_is_forward_failure() {
    let stages = vec![spawn_stage(slow_stage(Duration::from_secs(2))).await];
    let (addr, _tx, _handle) =
        spawn_manager_with_timeout(stages, Duration::from_millis(200)).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/", addr))
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "forward_failure");
    assert_eq!(body["stage"], serde_json::json!(0));
}

#[tokio::test]
async fn test_chain_survives_failures_and_serves_concurrently() {
    let hits = Arc::new(AtomicUsize::new(0));
    let stages = vec![
        spawn_stage(appending_stage("source", hits.clone())).await,
        spawn_stage(appending_stage("sink", hits.clone())).await,
    ];
    let (addr, _tx, _handle) = spawn_manager(stages).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/", addr);

    let failed = client
        .post(&url)
        .body(r#"{"visited":[],"fail":true}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(failed.status(), StatusCode::BAD_GATEWAY);

    let send = |body: &'static str| client.post(&url).body(body).send();
    let (first, second) = tokio::join!(
        send(r#"{"visited":[],"n":1}"#),
        send(r#"{"visited":[],"n":2}"#)
    );

    for (response, n) in [(first.unwrap(), 1), (second.unwrap(), 2)] {
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["n"], serde_json::json!(n));
        assert_eq!(body["visited"], serde_json::json!(["source", "sink"]));
    }
}

#[tokio::test]
async fn test_oversized_request_is_rejected() {
    let hits = Arc::new(AtomicUsize::new(0));
    let stages = vec![spawn_stage(appending_stage("source", hits.clone())).await];
    let (addr, _tx, _handle) = spawn_manager(stages).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/", addr))
        .body("x".repeat(LIMIT * 2))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreachable_stage() {
    // Bind and drop to get a port nothing listens on
    let dead = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };
    let (addr, _tx, _handle) = spawn_manager(vec![dead]).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/", addr))
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "forward_failure");
    assert_eq!(body["stage"], serde_json::json!(0));
}

#[tokio::test]
async fn test_health_and_shutdown() {
    let hits = Arc::new(AtomicUsize::new(0));
    let stages = vec![spawn_stage(appending_stage("source", hits)).await];
    let (addr, tx, handle) = spawn_manager(stages).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    drop(response);
    drop(client);

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("Manager did not stop after shutdown")
        .unwrap();

    let result = reqwest::Client::new()
        .get(format!("http://{}/health", addr))
        .send()
        .await;
    assert!(result.is_err());
}
