use std::env;

use anyhow::{anyhow, Result};

use crate::transaction::DEFAULT_INPUT_CAP;

/// Credential verification settings. Present only when an authentication
/// endpoint is configured; the field names tell the service which request
/// parameters carry the token and the secret.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub endpoint: String,
    pub token_field: String,
    pub secret_field: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub auth: Option<AuthConfig>,
    /// S3 bucket for output offload. Unset means results are inlined in
    /// the forwarded payload.
    pub output_bucket: Option<String>,
    pub output_prefix: String,
    /// Connect timeout for outbound HTTP calls (input fetch, callbacks,
    /// authentication, upload) in milliseconds.
    pub outbound_timeout_ms: u64,
    /// Maximum accepted raw request body size in bytes (None => unlimited)
    pub max_request_bytes: Option<usize>,
    /// Cap on raw input recorded in the per-request diagnostics transaction.
    pub transaction_input_cap: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let auth = env::var("AUTHENTICATION_ENDPOINT")
            .ok()
            .filter(|endpoint| !endpoint.trim().is_empty())
            .map(|endpoint| AuthConfig {
                endpoint,
                token_field: env::var("AUTHENTICATION_TOKEN")
                    .unwrap_or_else(|_| "token".to_owned()),
                secret_field: env::var("AUTHENTICATION_SECRET")
                    .unwrap_or_else(|_| "secret".to_owned()),
            });

        let output_bucket = env::var("OUTPUT_BUCKET")
            .ok()
            .filter(|bucket| !bucket.trim().is_empty());
        let output_prefix = env::var("OUTPUT_PREFIX").unwrap_or_default();

        let outbound_timeout_ms = parse_optional_u64("OUTBOUND_TIMEOUT_MS")?.unwrap_or(5000);
        let max_request_bytes = parse_optional_u64("MAX_REQUEST_BYTES")?.map(|v| v as usize);
        let transaction_input_cap = parse_optional_u64("TRANSACTION_INPUT_CAP")?
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_INPUT_CAP);

        Ok(Self {
            auth,
            output_bucket,
            output_prefix,
            outbound_timeout_ms,
            max_request_bytes,
            transaction_input_cap,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auth: None,
            output_bucket: None,
            output_prefix: String::new(),
            outbound_timeout_ms: 5000,
            max_request_bytes: None,
            transaction_input_cap: DEFAULT_INPUT_CAP,
        }
    }
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
