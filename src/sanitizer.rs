//! Sanitizes raw request parameters and whitelists component options.
//!
//! `prepare_parameters` normalizes untrusted caller input into the canonical
//! option map; `whitelist_options` is the authorization boundary between that
//! map and the argument surface of the text-analysis component.

use std::collections::HashSet;

use serde_json::{Map, Value};

/// Returns a cleaned-up copy of the input parameters.
///
/// * String values `"true"`/`"on"` become `true`, `"false"` becomes `false`
///   (HTML forms submit `on` for checked checkboxes).
/// * Entries of `callbacks` that are not non-empty strings are stripped
///   (default form values submit empty strings; JSON callers may send
///   nulls or stray scalars).
/// * An empty `error_callback` is removed entirely; absence, not an empty
///   string, signals "no error callback".
///
/// Pure and idempotent; never fails.
pub fn prepare_parameters(input: &Map<String, Value>) -> Map<String, Value> {
    let mut sanitized = Map::new();

    for (key, value) in input {
        let value = match value.as_str() {
            Some("true") | Some("on") => Value::Bool(true),
            Some("false") => Value::Bool(false),
            _ => value.clone(),
        };
        sanitized.insert(key.clone(), value);
    }

    if let Some(Value::Array(callbacks)) = sanitized.get_mut("callbacks") {
        // The chain is a sequence of URL strings; anything else is dropped
        // here rather than skipped downstream.
        callbacks.retain(|url| matches!(url, Value::String(s) if !s.is_empty()));
    }

    if let Some(cb) = sanitized.get("error_callback") {
        if cb.as_str().is_some_and(str::is_empty) {
            sanitized.remove("error_callback");
        }
    }

    sanitized
}

/// Projects `options` onto the accepted key set. Keys not in `accepted`
/// never reach the processor.
pub fn whitelist_options(
    options: &Map<String, Value>,
    accepted: &HashSet<String>,
) -> Map<String, Value> {
    options
        .iter()
        .filter(|(key, _)| accepted.contains(key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
