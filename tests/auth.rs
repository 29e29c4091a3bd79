use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::{routing::get, Router};
use reqwest::Client;
use serde_json::json;
use textrelay::{app, build_state, AppConfig, AuthConfig, EchoProcessor};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

// Verification endpoint: accepts only token=valid/secret=hunter2.
async fn start_auth_server() -> (String, JoinHandle<()>) {
    async fn verify(Query(params): Query<HashMap<String, String>>) -> (StatusCode, &'static str) {
        let token = params.get("token").map(String::as_str);
        let secret = params.get("secret").map(String::as_str);
        if token == Some("valid") && secret == Some("hunter2") {
            (StatusCode::OK, "ok")
        } else {
            (StatusCode::FORBIDDEN, "credentials rejected")
        }
    }
    let app = Router::new().route("/check", get(verify));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), handle)
}

async fn spawn_app(auth_url: &str) -> (String, JoinHandle<()>) {
    let config = AppConfig {
        auth: Some(AuthConfig {
            endpoint: format!("{}/check", auth_url),
            token_field: "token".to_owned(),
            secret_field: "secret".to_owned(),
        }),
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
async fn accepts_requests_with_valid_credentials() {
    let (auth_url, _auth_handle) = start_auth_server().await;
    let (app_url, _handle) = spawn_app(&auth_url).await;
    let client = Client::new();

    let resp = client
        .post(&app_url)
        .json(&json!({
            "input": "Hello world",
            "token": "valid",
            "secret": "hunter2"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains("Hello world"));
}

#[tokio::test]
async fn rejects_requests_with_bad_credentials() {
    let (auth_url, _auth_handle) = start_auth_server().await;
    let (app_url, _handle) = spawn_app(&auth_url).await;
    let client = Client::new();

    let resp = client
        .post(&app_url)
        .json(&json!({
            "input": "Hello world",
            "token": "nope",
            "secret": "wrong"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 403);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Authentication failed"));
    assert!(body.contains("credentials rejected"));
}

#[tokio::test]
async fn rejects_requests_with_missing_credentials() {
    let (auth_url, _auth_handle) = start_auth_server().await;
    let (app_url, _handle) = spawn_app(&auth_url).await;
    let client = Client::new();

    let resp = client
        .post(&app_url)
        .json(&json!({"input": "Hello world"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn the_form_page_is_protected_too() {
    let (auth_url, _auth_handle) = start_auth_server().await;
    let (app_url, _handle) = spawn_app(&auth_url).await;
    let client = Client::new();

    let resp = client.get(&app_url).send().await.unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .get(format!("{}/?token=valid&secret=hunter2", app_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}
