//! The capability interface implemented by text-analysis components.
//!
//! Components are opaque to the rest of the service: they receive the
//! resolved input plus a whitelisted option map and return their output.
//! The content type is exposed through an explicit accessor with an `xml`
//! default instead of runtime probing.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Failure raised by a component. Propagated to the caller unchanged; the
/// service adds no retry or recovery logic around it.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProcessorError {
    message: String,
}

impl ProcessorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Content type tag reported by a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Xml,
    Json,
    Text,
}

impl OutputType {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputType::Xml => "application/xml",
            OutputType::Json => "application/json",
            OutputType::Text => "text/plain; charset=utf-8",
        }
    }
}

#[async_trait]
pub trait TextProcessor: Send + Sync {
    /// Analyzes `input` using the whitelisted `options`.
    async fn run(
        &self,
        input: &str,
        options: &Map<String, Value>,
    ) -> Result<String, ProcessorError>;

    /// Content type of the output. Components that produce something other
    /// than XML override this.
    fn output_type(&self) -> OutputType {
        OutputType::Xml
    }
}

/// Built-in component that wraps the input in a minimal KAF envelope.
/// Useful as a stand-in while wiring up a deployment and in tests.
pub struct EchoProcessor;

#[async_trait]
impl TextProcessor for EchoProcessor {
    async fn run(
        &self,
        input: &str,
        _options: &Map<String, Value>,
    ) -> Result<String, ProcessorError> {
        Ok(format!(
            "<?xml version=\"1.0\"?>\n<KAF version=\"1.2\">\n  <raw>{}</raw>\n</KAF>\n",
            escape_xml(input)
        ))
    }
}

fn escape_xml(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
