use std::sync::Arc;

use reqwest::Client;
use textrelay::{app, build_state, AppConfig, EchoProcessor};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

async fn spawn_capped_app(max_request_bytes: usize) -> (String, JoinHandle<()>) {
    let config = AppConfig {
        max_request_bytes: Some(max_request_bytes),
        ..AppConfig::default()
    };
    let state = build_state(config, Arc::new(EchoProcessor), &[], None).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app(state);
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), handle)
}

#[tokio::test]
async fn oversized_bodies_are_rejected_with_413() {
    let (app_url, _handle) = spawn_capped_app(256).await;
    let client = Client::new();

    let oversized = format!("input={}", "x".repeat(1024));
    let resp = client
        .post(&app_url)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(oversized)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 413);
}

#[tokio::test]
async fn bodies_under_the_cap_are_processed() {
    let (app_url, _handle) = spawn_capped_app(256).await;
    let client = Client::new();

    let resp = client
        .post(&app_url)
        .header("content-type", "application/x-www-form-urlencoded")
        .body("input=Hello+world")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains("Hello world"));
}
