use std::error::Error;

use crate::response::ItemFailure;

/// Error type returned when building a sink from configuration.
///
/// Every variant is fatal to sink creation; nothing here is retried.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid server url {url:?}: {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("api key must not be blank")]
    BlankApiKey,

    #[error("invalid index format {format:?}: {reason}")]
    InvalidIndexFormat { format: String, reason: String },

    #[error("request timeout must be greater than zero")]
    NonPositiveTimeout,

    #[error("timestamp field name must not be blank")]
    BlankTimestampField,

    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("client factory did not return a client")]
    MissingClient,

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("invalid value for {key}: {reason}")]
    InvalidEnv { key: &'static str, reason: String },
}

/// Failure to turn one event into its action/document pair.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("failed to format index name: {0}")]
    IndexName(String),

    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("document spans more than one line")]
    MultiLineDocument,

    #[error("formatter failed: {0}")]
    Custom(Box<dyn Error + Send + Sync>),
}

/// Failure to render a single property value.
#[derive(thiserror::Error, Debug)]
pub enum PropertyError {
    #[error("value renderer failed: {0}")]
    Renderer(Box<dyn Error + Send + Sync>),

    #[error("non-finite number {0} cannot be represented in JSON")]
    NonFiniteNumber(f64),
}

/// Transport-level failure while talking to the bulk endpoint.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("bulk request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("bulk request timed out")]
    Timeout,

    #[error("bulk request cancelled")]
    Cancelled,

    #[error("sink is shut down")]
    Closed,
}

/// Per-batch failure surfaced to the batching engine, which redelivers
/// the batch on any of these.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("none of the {events} events in the batch could be formatted")]
    EmptyPayload { events: usize },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("bulk request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("bulk request rejected {} document(s)", rejected.len())]
    PartialFailure { rejected: Vec<ItemFailure>, body: String },

    #[error("bulk response could not be interpreted: {body}")]
    MalformedResponse { body: String },
}

