//! The callback relay: synchronous analysis plus the asynchronous
//! one-hop-at-a-time delivery protocol.
//!
//! Asynchronous requests are answered immediately with a request identifier
//! and the URL where results will eventually land. Analysis then runs on a
//! detached task; on success the output is posted to the first URL of the
//! callback chain with the shortened chain embedded in the payload.
//! Delivery is at-most-once: there are no retries, no idempotency tokens
//! and no persistence. A failed hop terminates the chain and is reported to
//! the error callback when one is configured.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::error_relay::ErrorReporter;
use crate::extractor::InputExtractor;
use crate::processor::{OutputType, TextProcessor};
use crate::sanitizer;
use crate::transaction::Transaction;
use crate::uploader::ObjectStore;

/// Immediate response for an asynchronous request: the tracking identifier
/// and the URL (final callback + identifier) where the end consumer will
/// find the result.
#[derive(Debug, Clone, Serialize)]
pub struct AsyncAccepted {
    pub request_id: String,
    pub output_url: String,
}

pub struct Relay {
    processor: Arc<dyn TextProcessor>,
    accepted_params: HashSet<String>,
    extractor: InputExtractor,
    reporter: ErrorReporter,
    store: Option<Arc<dyn ObjectStore>>,
    http: reqwest::Client,
    input_cap: usize,
}

impl Relay {
    pub fn new(
        processor: Arc<dyn TextProcessor>,
        accepted_params: HashSet<String>,
        store: Option<Arc<dyn ObjectStore>>,
        http: reqwest::Client,
        input_cap: usize,
    ) -> Self {
        Self {
            processor,
            accepted_params,
            extractor: InputExtractor::new(http.clone()),
            reporter: ErrorReporter::new(http.clone()),
            store,
            http,
            input_cap,
        }
    }

    /// Whitelists the options, resolves the input and runs the component.
    /// Returns the output together with its content type tag.
    pub async fn analyze(
        &self,
        options: &Map<String, Value>,
        txn: &mut Transaction,
    ) -> Result<(String, OutputType), ServiceError> {
        let comp_options = sanitizer::whitelist_options(options, &self.accepted_params);
        let input = self.extractor.extract(options).await?;

        let mut recorded = comp_options.clone();
        recorded.insert("input".to_owned(), Value::String(input.clone()));
        txn.add_parameters(&recorded);

        let output = self.processor.run(&input, &comp_options).await?;
        Ok((output, self.processor.output_type()))
    }

    /// Accepts an asynchronous request: establishes the request identifier,
    /// spawns the background task and returns the tracking ticket before
    /// any analysis has run.
    ///
    /// The caller must have verified that `callbacks` is non-empty.
    pub fn dispatch(self: &Arc<Self>, options: Map<String, Value>) -> AsyncAccepted {
        let request_id = options
            .get("request_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let final_url = options
            .get("callbacks")
            .and_then(Value::as_array)
            .and_then(|chain| chain.last())
            .and_then(Value::as_str)
            .unwrap_or_default();
        let output_url = format!("{}/{}", final_url, request_id);

        let relay = Arc::clone(self);
        let id = request_id.clone();
        tokio::spawn(async move {
            relay.run_async(options, id).await;
        });

        AsyncAccepted {
            request_id,
            output_url,
        }
    }

    /// Body of the detached task: analyze, deliver the first hop, and on
    /// any failure fall back to the error callback. Errors never propagate
    /// past this point; the original caller already holds a 200.
    async fn run_async(&self, options: Map<String, Value>, request_id: String) {
        let mut txn = Transaction::new(self.input_cap);

        let outcome = match self.analyze(&options, &mut txn).await {
            Ok((output, _)) => self.submit_output(&output, &request_id, &options).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(url) => {
                tracing::info!(%request_id, %url, "results delivered to next hop");
            }
            Err(err) => {
                tracing::error!(%request_id, error = %err, "asynchronous processing failed");

                if let Some(url) = options
                    .get("error_callback")
                    .and_then(Value::as_str)
                    .filter(|url| !url.is_empty())
                {
                    self.reporter.submit(&err.to_string(), &request_id, url).await;
                }
            }
        }

        tracing::debug!(%request_id, parameters = ?txn.parameters(), "transaction finished");
    }

    /// Delivers one hop: shifts the first URL off a working copy of the
    /// chain and posts the merged payload to it. The original `input` and
    /// `input_url` are dropped so the next hop never re-processes stale
    /// source input; the output travels inline under `input`, or as a
    /// signed `input_url` when an object store is configured.
    async fn submit_output(
        &self,
        output: &str,
        request_id: &str,
        options: &Map<String, Value>,
    ) -> Result<String, ServiceError> {
        let mut chain = options
            .get("callbacks")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let next_url = match chain.first().and_then(Value::as_str) {
            Some(url) => url.to_owned(),
            None => {
                return Err(ServiceError::Delivery {
                    url: String::new(),
                    reason: "callback chain is empty".to_owned(),
                })
            }
        };
        chain.remove(0);

        // Re-use the original options so extra data (e.g. metadata) stays in
        // place for downstream hops.
        let mut payload = options.clone();
        payload.remove("input");
        payload.remove("input_url");
        payload.insert("callbacks".to_owned(), Value::Array(chain));
        payload.insert("request_id".to_owned(), Value::String(request_id.to_owned()));

        if let Some(store) = &self.store {
            let metadata = options.get("metadata").and_then(Value::as_object);
            let url = store
                .put(
                    &format!("{request_id}.xml"),
                    output.as_bytes().to_vec(),
                    "application/xml",
                    metadata,
                )
                .await?;
            payload.insert("input_url".to_owned(), Value::String(url));
        } else {
            payload.insert("input".to_owned(), Value::String(output.to_owned()));
        }

        let response = self
            .http
            .post(&next_url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ServiceError::Delivery {
                url: next_url.clone(),
                reason: err.to_string(),
            })?;

        // Fire-and-forget: a non-success status is logged but not treated as
        // a delivery failure once the call itself completed.
        if !response.status().is_success() {
            tracing::warn!(
                request_id,
                url = %next_url,
                status = %response.status(),
                "next hop answered with a non-success status"
            );
        }

        Ok(next_url)
    }
}
