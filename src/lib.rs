//! Core library for textrelay.  This module wires together the callback
//! relay, request parsing and HTTP handlers.  The text-analysis component
//! itself is opaque: it is handed in at construction behind the
//! `TextProcessor` trait and the service stays a thin front-end around it.

mod config;
pub mod error;
pub mod error_relay;
pub mod extractor;
pub mod processor;
pub mod relay;
pub mod sanitizer;
pub mod transaction;
pub mod uploader;

pub use config::{AppConfig, AuthConfig};
pub use error::ServiceError;
pub use processor::{EchoProcessor, OutputType, ProcessorError, TextProcessor};
pub use relay::{AsyncAccepted, Relay};
pub use transaction::Transaction;
pub use uploader::{ObjectStore, S3Store};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use tower_http::limit::RequestBodyLimitLayer;
use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde_json::{Map, Value};

/// Fields that can carry the document to process. At least one must be
/// non-empty for a request to be valid.
const INPUT_FIELDS: [&str; 2] = ["input", "input_url"];

/// Opaque message for synchronous 5xx responses; details stay in the logs.
const GENERIC_ERROR: &str =
    "An error occurred. A team of garden gnomes has been dispatched to look into the problem.";

/// Internal application state shared across handlers. Holds the relay
/// (processor, whitelist, optional object store) and the settings the HTTP
/// layer needs. Immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub auth: Option<AuthConfig>,
    pub http: reqwest::Client,
    /// Maximum accepted raw request body size in bytes (None => unlimited)
    pub max_request_bytes: Option<usize>,
    pub transaction_input_cap: usize,
}

/// Build state from an explicit configuration, processor and optional
/// object store. Tests use this directly to inject in-memory stores.
pub fn build_state(
    config: AppConfig,
    processor: Arc<dyn TextProcessor>,
    accepted_params: &[&str],
    store: Option<Arc<dyn ObjectStore>>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_millis(config.outbound_timeout_ms))
        .build()?;

    let accepted: HashSet<String> = accepted_params.iter().map(|s| s.to_string()).collect();
    let relay = Arc::new(Relay::new(
        processor,
        accepted,
        store,
        http.clone(),
        config.transaction_input_cap,
    ));

    Ok(AppState {
        relay,
        auth: config.auth,
        http,
        max_request_bytes: config.max_request_bytes,
        transaction_input_cap: config.transaction_input_cap,
    })
}

/// Build state from environment variables. This function reads the
/// following variables:
///
/// * `AUTHENTICATION_ENDPOINT` (optional) – enables credential verification.
/// * `AUTHENTICATION_TOKEN` / `AUTHENTICATION_SECRET` (optional) – names of
///   the request fields carrying the credentials.
/// * `OUTPUT_BUCKET` / `OUTPUT_PREFIX` (optional) – S3 output offload.
/// * `OUTBOUND_TIMEOUT_MS`, `MAX_REQUEST_BYTES`, `TRANSACTION_INPUT_CAP`.
pub async fn build_state_from_env(
    processor: Arc<dyn TextProcessor>,
    accepted_params: &[&str],
) -> Result<AppState, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env().map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;

    let store: Option<Arc<dyn ObjectStore>> = match config.output_bucket.as_deref() {
        Some(bucket) => Some(Arc::new(S3Store::new(bucket, &config.output_prefix).await)),
        None => None,
    };

    build_state(config, processor, accepted_params, store)
}

/// Build the Axum router and attach handlers.  The router holds a copy
/// of the `AppState` for each invocation.
pub fn app(state: AppState) -> Router {
    let max_request_bytes = state.max_request_bytes;

    let router = Router::new()
        .route("/", get(index_handler).post(submit_handler))
        .route("/healthz", get(healthz_handler));

    // Axum's built-in extractor limit is replaced by the tower-http layer so
    // the cap applies to the raw body stream, not per extractor.
    let router = if let Some(limit) = max_request_bytes {
        router
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(limit))
    } else {
        router
    };

    router.with_state(state)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>textrelay</title></head>
<body>
  <h1>Process a document</h1>
  <form method="post" action="/">
    <p><label>Input text</label><br><textarea name="input" rows="10" cols="60"></textarea></p>
    <p><label>Input URL</label><br><input type="text" name="input_url" size="60"></p>
    <p><label>Callback URLs</label><br>
       <input type="text" name="callbacks[]" size="60"><br>
       <input type="text" name="callbacks[]" size="60"></p>
    <p><label>Error callback</label><br><input type="text" name="error_callback" size="60"></p>
    <p><input type="submit" value="Process"></p>
  </form>
</body>
</html>
"#;

/// Shows a form that allows users to submit data directly from their
/// browser.
async fn index_handler(
    State(state): State<AppState>,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> Response {
    if let Some(auth) = &state.auth {
        let params: Map<String, Value> = params
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        if let Err(err) = authenticate(&state.http, auth, &params).await {
            return authentication_response(err);
        }
    }
    Html(INDEX_HTML).into_response()
}

/// Simple health endpoint for container readiness / liveness checks.
async fn healthz_handler() -> Response {
    let json = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(json)).into_response()
}

/// Handler for `POST /`. Accepts either URL-encoded form fields or a single
/// JSON object body (selected by `Content-Type: application/json`).
///
/// Recognized fields:
///
/// | Field          | Description                                 |
/// |:---------------|:--------------------------------------------|
/// | input          | The raw input text to process               |
/// | input_url      | A URL to a document to download and process |
/// | callbacks      | An array of callback URLs                   |
/// | error_callback | A URL to submit errors to                   |
/// | request_id     | A unique ID to associate with the document  |
/// | metadata       | A custom metadata object, passed through    |
async fn submit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let options = if json_input(&headers) {
        match params_from_json(&body) {
            Ok(options) => options,
            Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
        }
    } else {
        params_from_form(&body)
    };

    if let Some(auth) = &state.auth {
        if let Err(err) = authenticate(&state.http, auth, &options).await {
            return authentication_response(err);
        }
    }

    let options = sanitizer::prepare_parameters(&options);

    let has_input = INPUT_FIELDS.iter().any(|field| {
        options
            .get(*field)
            .and_then(Value::as_str)
            .is_some_and(|value| !value.is_empty())
    });
    if !has_input {
        return (StatusCode::BAD_REQUEST, ServiceError::Validation.to_string()).into_response();
    }

    let has_callbacks = options
        .get("callbacks")
        .and_then(Value::as_array)
        .is_some_and(|chain| !chain.is_empty());

    if has_callbacks {
        process_async(&state, options)
    } else {
        process_sync(&state, options).await
    }
}

/// Processes a request synchronously; the analysis output becomes the
/// response body with the component's content type.
async fn process_sync(state: &AppState, options: Map<String, Value>) -> Response {
    let mut txn = Transaction::new(state.transaction_input_cap);

    let result = state.relay.analyze(&options, &mut txn).await;
    tracing::debug!(parameters = ?txn.parameters(), "transaction finished");

    match result {
        Ok((output, output_type)) => (
            StatusCode::OK,
            [(CONTENT_TYPE, output_type.content_type())],
            output,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "synchronous processing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR).into_response()
        }
    }
}

/// Processes a request asynchronously: responds at once with the request
/// identifier and eventual output URL while the relay works in the
/// background.
fn process_async(state: &AppState, options: Map<String, Value>) -> Response {
    let accepted = state.relay.dispatch(options);
    (StatusCode::OK, Json(accepted)).into_response()
}

fn json_input(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

/// Returns the parameters from a JSON payload. Keys stay strings all the
/// way through; nothing is interned from untrusted input.
fn params_from_json(body: &[u8]) -> Result<Map<String, Value>, &'static str> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("Request body must be a JSON object"),
        Err(_) => Err("Request body is not valid JSON"),
    }
}

/// Decodes URL-encoded form fields. Repeated `callbacks`/`callbacks[]`
/// fields accumulate into an array.
fn params_from_form(body: &[u8]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(body) {
        let key = key.into_owned();
        let array_key = key.strip_suffix("[]").map(str::to_owned);
        match array_key {
            Some(name) => push_form_value(&mut map, name, value.into_owned()),
            None if key == "callbacks" => push_form_value(&mut map, key, value.into_owned()),
            None => {
                map.insert(key, Value::String(value.into_owned()));
            }
        }
    }
    map
}

fn push_form_value(map: &mut Map<String, Value>, key: String, value: String) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(Value::String(value)),
        _ => {
            map.insert(key, Value::Array(vec![Value::String(value)]));
        }
    }
}

/// Verifies the request credentials against the external authentication
/// endpoint. The configured token/secret fields are read from the request
/// parameters and forwarded as query parameters.
async fn authenticate(
    http: &reqwest::Client,
    auth: &AuthConfig,
    params: &Map<String, Value>,
) -> Result<(), ServiceError> {
    let field = |name: &str| {
        params
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };
    let credentials = [
        (auth.token_field.clone(), field(&auth.token_field)),
        (auth.secret_field.clone(), field(&auth.secret_field)),
    ];

    let response = http
        .get(&auth.endpoint)
        .query(&credentials)
        .send()
        .await
        .map_err(|err| ServiceError::Authentication(err.to_string()))?;

    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::Authentication(body));
    }

    Ok(())
}

fn authentication_response(err: ServiceError) -> Response {
    (StatusCode::FORBIDDEN, err.to_string()).into_response()
}
