//! Interpretation of `_bulk` responses.
//!
//! A bulk request can succeed at the HTTP level while individual documents
//! are rejected, so a 2xx status alone is not proof of delivery.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{SinkError, TransportError};

/// How to treat a 2xx response whose body does not say whether it had errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponsePolicy {
    /// Unparseable bodies or a missing `errors` flag count as failures and
    /// trigger redelivery. Duplicates are preferred over silent loss.
    #[default]
    Strict,
    /// Such bodies count as success; a warning is still logged.
    Lenient,
}

/// Result of one delivery attempt.
#[derive(Debug)]
pub enum BulkOutcome {
    Success,
    TransportFailure(TransportError),
    HttpFailure { status: u16, body: String },
    PartialFailure { rejected: Vec<ItemFailure>, body: String },
    MalformedResponse { body: String },
}

impl BulkOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BulkOutcome::Success)
    }

    /// `Success` is the only outcome that does not ask for redelivery.
    pub fn into_result(self) -> Result<(), SinkError> {
        match self {
            BulkOutcome::Success => Ok(()),
            BulkOutcome::TransportFailure(e) => Err(SinkError::Transport(e)),
            BulkOutcome::HttpFailure { status, body } => Err(SinkError::Http { status, body }),
            BulkOutcome::PartialFailure { rejected, body } => Err(SinkError::PartialFailure { rejected, body }),
            BulkOutcome::MalformedResponse { body } => Err(SinkError::MalformedResponse { body }),
        }
    }
}

/// One document the bulk endpoint refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub index: Option<String>,
    pub status: u16,
    pub kind: Option<String>,
    pub reason: Option<String>,
}

#[derive(Deserialize)]
struct ItemResult {
    #[serde(rename = "_index")]
    index: Option<String>,
    #[serde(default)]
    status: u16,
    error: Option<ItemError>,
}

#[derive(Deserialize)]
struct ItemError {
    #[serde(rename = "type")]
    kind: Option<String>,
    reason: Option<String>,
}

/// Classify a bulk response from its status code and body.
pub fn classify(status: u16, body: &str, policy: ResponsePolicy) -> BulkOutcome {
    if !(200..300).contains(&status) {
        return BulkOutcome::HttpFailure { status, body: body.to_string() };
    }

    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return ambiguous(body, &format!("body is not JSON: {}", e), policy),
    };

    match parsed.get("errors") {
        Some(Value::Bool(false)) => BulkOutcome::Success,
        Some(Value::Bool(true)) => BulkOutcome::PartialFailure {
            rejected: rejected_items(&parsed),
            body: body.to_string(),
        },
        Some(other) => ambiguous(body, &format!("`errors` is not a boolean: {}", other), policy),
        None => ambiguous(body, "`errors` field is missing", policy),
    }
}

fn ambiguous(body: &str, reason: &str, policy: ResponsePolicy) -> BulkOutcome {
    match policy {
        ResponsePolicy::Strict => BulkOutcome::MalformedResponse { body: body.to_string() },
        ResponsePolicy::Lenient => {
            warn!(reason, "unexpected bulk response, treating as success");
            BulkOutcome::Success
        }
    }
}

/// Items carrying an `error` object. Each item is keyed by its operation
/// (`index`, `create`, ...), which is not inspected.
fn rejected_items(response: &Value) -> Vec<ItemFailure> {
    let Some(items) = response.get("items").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|ops| ops.values())
        .filter_map(|op| ItemResult::deserialize(op).ok())
        .filter_map(|item| {
            let error = item.error?;
            Some(ItemFailure {
                index: item.index,
                status: item.status,
                kind: error.kind,
                reason: error.reason,
            })
        })
        .collect()
}
