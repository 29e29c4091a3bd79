//! Service error taxonomy.
//!
//! Synchronous requests surface these at the HTTP boundary; asynchronous
//! processing swallows them at the task boundary after best-effort reporting
//! to the configured error callback.

use thiserror::Error;

use crate::processor::ProcessorError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Neither `input` nor `input_url` was supplied. Maps to HTTP 400.
    #[error("No input specified in the \"input\" or \"input_url\" field")]
    Validation,

    /// Remote input could not be downloaded.
    #[error("Failed to download input from {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The text-analysis component failed. Propagated unchanged.
    #[error(transparent)]
    Processor(#[from] ProcessorError),

    /// Output could not be uploaded to the configured object store.
    #[error("Failed to store output under {key}: {reason}")]
    Storage { key: String, reason: String },

    /// A callback POST did not complete. Never retried.
    #[error("Failed to deliver results to {url}: {reason}")]
    Delivery { url: String, reason: String },

    /// Credential verification against the external endpoint failed.
    /// Maps to HTTP 403 with the verification body echoed.
    #[error("Authentication failed: {0}")]
    Authentication(String),
}
