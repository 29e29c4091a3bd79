//! Request-scoped diagnostics context.
//!
//! A `Transaction` is created per request (or per background task) and
//! threaded explicitly through the analyze path; it is never looked up
//! through ambient thread-local state. Business logic only writes to it;
//! the accumulated parameters are emitted once via `tracing` when the
//! owning request or task finishes, after which the transaction is dropped.

use serde_json::{Map, Value};

/// Default cap on the amount of raw input recorded per transaction.
pub const DEFAULT_INPUT_CAP: usize = 256;

#[derive(Debug)]
pub struct Transaction {
    parameters: Map<String, Value>,
    input_cap: usize,
}

impl Transaction {
    pub fn new(input_cap: usize) -> Self {
        Self {
            parameters: Map::new(),
            input_cap,
        }
    }

    /// Merges the given parameters into the transaction. Raw input stored
    /// under the `input` key is truncated to the configured cap to bound
    /// per-request memory use.
    pub fn add_parameters(&mut self, parameters: &Map<String, Value>) {
        for (key, value) in parameters {
            let value = if key == "input" {
                match value.as_str() {
                    Some(text) if text.chars().count() > self.input_cap => {
                        Value::String(text.chars().take(self.input_cap).collect())
                    }
                    _ => value.clone(),
                }
            } else {
                value.clone()
            };
            self.parameters.insert(key.clone(), value);
        }
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_CAP)
    }
}
