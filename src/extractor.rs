//! Resolves the document to analyze from a set of request options.

use serde_json::{Map, Value};

use crate::error::ServiceError;

/// Produces the literal input text, either directly from the `input` field
/// or by downloading `input_url` (redirects are followed by the client's
/// default policy).
#[derive(Clone)]
pub struct InputExtractor {
    http: reqwest::Client,
}

impl InputExtractor {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub async fn extract(&self, options: &Map<String, Value>) -> Result<String, ServiceError> {
        let input_url = options
            .get("input_url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty());

        let Some(url) = input_url else {
            return Ok(options
                .get("input")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned());
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| ServiceError::Fetch {
                url: url.to_owned(),
                reason: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::Fetch {
                url: url.to_owned(),
                reason: format!("unexpected status {}", response.status()),
            });
        }

        response.text().await.map_err(|err| ServiceError::Fetch {
            url: url.to_owned(),
            reason: err.to_string(),
        })
    }
}
