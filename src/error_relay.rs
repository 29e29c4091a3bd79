//! Best-effort reporting of asynchronous processing failures.

use serde_json::json;

/// Posts structured errors to a caller-supplied error callback URL.
/// Delivery failures of the report itself are logged and not escalated.
#[derive(Clone)]
pub struct ErrorReporter {
    http: reqwest::Client,
}

impl ErrorReporter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub async fn submit(&self, message: &str, request_id: &str, url: &str) {
        let body = json!({
            "error": message,
            "request_id": request_id,
        });

        match self.http.post(url).json(&body).send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(
                    request_id,
                    url,
                    status = %response.status(),
                    "error callback rejected the report"
                );
            }
            Ok(_) => {
                tracing::info!(request_id, url, "error reported to callback");
            }
            Err(err) => {
                tracing::warn!(request_id, url, error = %err, "failed to reach error callback");
            }
        }
    }
}
