use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{routing::post, Json, Router};
use reqwest::Client;
use serde_json::{json, Map, Value};
use textrelay::{app, build_state, AppConfig, EchoProcessor, ObjectStore, ServiceError};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

struct StoredObject {
    key: String,
    body: Vec<u8>,
    content_type: String,
    metadata: Option<Map<String, Value>>,
}

/// In-memory stand-in for the S3 store: records uploads and hands out
/// deterministic read URLs.
#[derive(Default)]
struct MemoryStore {
    objects: Mutex<Vec<StoredObject>>,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        metadata: Option<&Map<String, Value>>,
    ) -> Result<String, ServiceError> {
        self.objects.lock().unwrap().push(StoredObject {
            key: key.to_owned(),
            body,
            content_type: content_type.to_owned(),
            metadata: metadata.cloned(),
        });
        Ok(format!("http://store.example.com/{}", key))
    }
}

async fn spawn_app(store: Arc<MemoryStore>) -> (String, JoinHandle<()>) {
    let state = build_state(
        AppConfig::default(),
        Arc::new(EchoProcessor),
        &[],
        Some(store),
    )
    .unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app(state);
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), handle)
}

async fn start_capture_server() -> (String, mpsc::UnboundedReceiver<Value>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new().route(
        "/",
        post(move |Json(payload): Json<Value>| {
            let tx = tx.clone();
            async move {
                tx.send(payload).ok();
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), rx, handle)
}

#[tokio::test]
async fn configured_store_replaces_inline_output_with_a_read_url() {
    let store = Arc::new(MemoryStore::default());
    let (cb_url, mut cb_rx, _cb_handle) = start_capture_server().await;
    let (app_url, _handle) = spawn_app(Arc::clone(&store)).await;
    let client = Client::new();

    let resp = client
        .post(&app_url)
        .json(&json!({
            "input": "Hello world",
            "callbacks": [cb_url],
            "metadata": {"customer": "acme"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let ticket: Value = resp.json().await.unwrap();
    let request_id = ticket["request_id"].as_str().unwrap().to_owned();

    let payload = timeout(Duration::from_secs(5), cb_rx.recv())
        .await
        .expect("timed out waiting for callback delivery")
        .unwrap();

    // Output travels by reference, never inline, when a store is configured.
    assert!(payload.get("input").is_none());
    assert_eq!(
        payload["input_url"].as_str().unwrap(),
        format!("http://store.example.com/{}.xml", request_id)
    );

    let objects = store.objects.lock().unwrap();
    assert_eq!(objects.len(), 1);
    let object = &objects[0];
    assert_eq!(object.key, format!("{}.xml", request_id));
    assert_eq!(object.content_type, "application/xml");
    assert!(String::from_utf8_lossy(&object.body).contains("Hello world"));
    assert_eq!(
        object.metadata.as_ref().unwrap()["customer"],
        json!("acme")
    );
}
