use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ElasticsearchConfig;
use crate::error::{ConfigError, SinkError};
use crate::event::LogEvent;
use crate::payload::BulkPayloadBuilder;
use crate::response::{classify, BulkOutcome, ResponsePolicy};
use crate::sink::LogSink;
use crate::transport::{BulkTransport, ClientOwnership};

/// Rejected items logged individually per failed batch.
const MAX_LOGGED_REJECTIONS: usize = 10;

/// Stages of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryState {
    Formatting,
    Sending,
    Classifying,
    Done,
    Failed,
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeliveryState::Formatting => "formatting",
            DeliveryState::Sending => "sending",
            DeliveryState::Classifying => "classifying",
            DeliveryState::Done => "done",
            DeliveryState::Failed => "failed",
        })
    }
}

/// [`LogSink`] writing batches to an Elasticsearch `_bulk` endpoint.
///
/// Each call to [`deliver`](Self::deliver) is one attempt: build the
/// NDJSON body, POST it, classify the response. Anything short of full
/// success is returned as an error so the caller redelivers the batch.
pub struct ElasticsearchSink {
    builder: BulkPayloadBuilder,
    transport: BulkTransport,
    response_policy: ResponsePolicy,
    shutdown: CancellationToken,
}

impl ElasticsearchSink {
    /// Validate `config` and build the sink.
    ///
    /// **Returns**
    /// - `Err(ConfigError)` for a bad URL, blank API key, malformed index
    ///   template, zero timeout, blank timestamp field, invalid header, or
    ///   a client factory that yields no client.
    pub fn new(config: ElasticsearchConfig) -> Result<Self, ConfigError> {
        let validated = config.validate()?;
        let transport = BulkTransport::new(
            validated.endpoint,
            validated.headers,
            validated.timeout,
            validated.client,
        )?;

        debug!(
            endpoint = %transport.endpoint(),
            index = validated.index.as_str(),
            ownership = ?transport.ownership(),
            "elasticsearch sink ready"
        );

        Ok(ElasticsearchSink {
            builder: BulkPayloadBuilder::new(validated.index, validated.formatter),
            transport,
            response_policy: validated.response_policy,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn ownership(&self) -> ClientOwnership {
        self.transport.ownership()
    }

    /// Deliver one batch.
    ///
    /// An empty batch succeeds without a request. A non-empty batch whose
    /// events all fail to format fails without a request.
    pub async fn deliver(&self, batch: &[LogEvent]) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }

        debug!(state = %DeliveryState::Formatting, events = batch.len());
        let payload = self.builder.build(batch);
        if payload.is_empty() {
            warn!(events = batch.len(), "no event in the batch could be formatted");
            debug!(state = %DeliveryState::Failed);
            return Err(SinkError::EmptyPayload { events: batch.len() });
        }

        debug!(state = %DeliveryState::Sending, included = payload.included, skipped = payload.skipped);
        let outcome = match self.transport.send(payload.body, &self.shutdown).await {
            Ok(response) => {
                debug!(state = %DeliveryState::Classifying, status = response.status);
                classify(response.status, &response.body, self.response_policy)
            }
            Err(e) => BulkOutcome::TransportFailure(e),
        };

        report(&outcome);
        let state = if outcome.is_success() { DeliveryState::Done } else { DeliveryState::Failed };
        debug!(state = %state);
        outcome.into_result()
    }

    /// Cancel in-flight requests and, in owned mode, release the client.
    /// A shared client is left untouched.
    pub fn close(&self) {
        self.shutdown.cancel();
        if self.transport.close() {
            debug!("released owned http client");
        }
    }
}

fn report(outcome: &BulkOutcome) {
    match outcome {
        BulkOutcome::Success | BulkOutcome::TransportFailure(_) => {}
        BulkOutcome::HttpFailure { status, body } => {
            warn!(status, body = body.as_str(), "bulk request failed");
        }
        BulkOutcome::PartialFailure { rejected, .. } => {
            warn!(rejected = rejected.len(), "bulk request rejected some documents");
            for item in rejected.iter().take(MAX_LOGGED_REJECTIONS) {
                warn!(
                    index = item.index.as_deref().unwrap_or("<unknown>"),
                    status = item.status,
                    kind = item.kind.as_deref().unwrap_or("<unknown>"),
                    reason = item.reason.as_deref().unwrap_or(""),
                    "document rejected"
                );
            }
        }
        BulkOutcome::MalformedResponse { body } => {
            warn!(body = body.as_str(), "bulk response could not be interpreted");
        }
    }
}

#[async_trait]
impl LogSink for ElasticsearchSink {
    async fn emit_batch(&self, batch: &[LogEvent]) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.deliver(batch).await?;
        Ok(())
    }

    async fn shutdown(&self) {
        self.close();
    }
}
