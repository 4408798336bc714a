use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::error::FormatError;
use crate::event::LogEvent;
use crate::formatter::DocumentFormatter;
use crate::index::IndexTemplate;

/// NDJSON body for one `_bulk` request.
///
/// Holds one action line plus one document line per event that formatted
/// successfully; every line ends with a single `\n`.
#[derive(Debug, Default, Clone)]
pub struct BulkPayload {
    pub body: String,
    /// Events included in `body`.
    pub included: usize,
    /// Events skipped because they failed to format.
    pub skipped: usize,
}

impl BulkPayload {
    pub fn is_empty(&self) -> bool {
        self.included == 0
    }
}

#[derive(Serialize)]
struct BulkAction<'a> {
    index: BulkIndexTarget<'a>,
}

#[derive(Serialize)]
struct BulkIndexTarget<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
}

/// Assembles [`BulkPayload`]s from batches of events.
#[derive(Clone)]
pub struct BulkPayloadBuilder {
    index: IndexTemplate,
    formatter: Arc<dyn DocumentFormatter>,
}

impl BulkPayloadBuilder {
    pub fn new(index: IndexTemplate, formatter: Arc<dyn DocumentFormatter>) -> Self {
        BulkPayloadBuilder { index, formatter }
    }

    /// Build the body for `batch`.
    ///
    /// Events that fail to format are logged and left out; they never
    /// abort the rest of the batch.
    pub fn build(&self, batch: &[LogEvent]) -> BulkPayload {
        let mut payload = BulkPayload {
            body: String::with_capacity(batch.len() * 256),
            included: 0,
            skipped: 0,
        };

        for event in batch {
            match self.append(&mut payload.body, event) {
                Ok(()) => payload.included += 1,
                Err(e) => {
                    payload.skipped += 1;
                    warn!(
                        timestamp = %event.timestamp.to_rfc3339(),
                        error = %e,
                        "skipping log event that could not be formatted"
                    );
                }
            }
        }

        payload
    }

    fn append(&self, body: &mut String, event: &LogEvent) -> Result<(), FormatError> {
        let index = self.index.format(&event.timestamp)?;
        let action = serde_json::to_string(&BulkAction { index: BulkIndexTarget { index: &index } })?;
        let document = normalize_line(&self.formatter.format(event)?).to_string();
        if document.contains(['\r', '\n']) {
            return Err(FormatError::MultiLineDocument);
        }

        // Nothing is written until both lines are known good, so a failed
        // event leaves no half-written pair behind.
        body.push_str(&action);
        body.push('\n');
        body.push_str(&document);
        body.push('\n');
        Ok(())
    }
}

/// Strip any trailing line terminators from a formatted document.
fn normalize_line(document: &str) -> &str {
    document.trim_end_matches(['\r', '\n'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::JsonDocumentFormatter;
    use crate::test_support::capture_logs;
    use chrono::DateTime;
    use tracing::Level;

    fn event_at(ts: &str, msg: &str) -> LogEvent {
        LogEvent::new(Level::WARN, msg).with_timestamp(DateTime::parse_from_rfc3339(ts).unwrap())
    }

    fn builder(formatter: Arc<dyn DocumentFormatter>) -> BulkPayloadBuilder {
        BulkPayloadBuilder::new(IndexTemplate::parse("logs-{0:yyyy.MM.dd}").unwrap(), formatter)
    }

    #[test]
    fn pairs_action_and_document_per_event() {
        let batch = vec![
            event_at("2024-01-15T10:30:00Z", "first"),
            event_at("2024-01-16T00:00:01Z", "second"),
        ];
        let payload = builder(Arc::new(JsonDocumentFormatter::default())).build(&batch);

        assert_eq!(payload.included, 2);
        assert_eq!(payload.skipped, 0);

        let lines: Vec<&str> = payload.body.split_terminator('\n').collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], r#"{"index":{"_index":"logs-2024.01.15"}}"#);
        assert_eq!(lines[2], r#"{"index":{"_index":"logs-2024.01.16"}}"#);
        for doc in [lines[1], lines[3]] {
            serde_json::from_str::<serde_json::Value>(doc).unwrap();
        }
        assert!(payload.body.ends_with("}\n"));
    }

    #[test]
    fn normalizes_crlf_from_custom_formatters() {
        let formatter = |_: &LogEvent| -> Result<String, FormatError> { Ok("{\"a\":1}\r\n\r\n".to_string()) };
        let payload = builder(Arc::new(formatter)).build(&[event_at("2024-01-15T10:30:00Z", "x")]);

        assert_eq!(payload.body, "{\"index\":{\"_index\":\"logs-2024.01.15\"}}\n{\"a\":1}\n");
        assert!(!payload.body.contains('\r'));
    }

    #[test]
    fn skips_events_that_fail_to_format() {
        let formatter = |e: &LogEvent| -> Result<String, FormatError> {
            if e.message_template == "bad" {
                Err(FormatError::Custom("cannot format".into()))
            } else {
                Ok(format!("{{\"m\":\"{}\"}}", e.message_template))
            }
        };
        let batch = vec![
            event_at("2024-01-15T10:30:00Z", "ok-1"),
            event_at("2024-01-15T10:30:00Z", "bad"),
            event_at("2024-01-15T10:30:00Z", "ok-2"),
        ];
        let (payload, logs) = capture_logs(|| builder(Arc::new(formatter)).build(&batch));

        assert_eq!(payload.included, 2);
        assert_eq!(payload.skipped, 1);
        assert_eq!(payload.body.lines().count(), 4);
        assert!(!payload.body.contains("bad"));

        assert_eq!(logs.len(), 1, "{:?}", logs);
        assert!(logs[0].starts_with("WARN"));
        assert!(logs[0].contains("timestamp=2024-01-15T10:30:00+00:00"), "{}", logs[0]);
        assert!(logs[0].contains("cannot format"), "{}", logs[0]);
    }

    #[test]
    fn skips_documents_with_interior_line_breaks() {
        let formatter = |e: &LogEvent| -> Result<String, FormatError> {
            if e.message_template == "pretty" {
                Ok("{\n  \"a\": 1\r\n}".to_string())
            } else {
                Ok("{\"a\":1}".to_string())
            }
        };
        let batch = vec![
            event_at("2024-01-15T10:30:00Z", "pretty"),
            event_at("2024-01-15T10:30:00Z", "compact"),
        ];
        let payload = builder(Arc::new(formatter)).build(&batch);

        assert_eq!(payload.included, 1);
        assert_eq!(payload.skipped, 1);
        assert_eq!(payload.body.split_terminator('\n').count(), 2 * payload.included);
        assert!(!payload.body.contains('\r'));
        assert_eq!(payload.body, "{\"index\":{\"_index\":\"logs-2024.01.15\"}}\n{\"a\":1}\n");
    }

    #[test]
    fn all_failures_yield_empty_payload() {
        let formatter = |_: &LogEvent| -> Result<String, FormatError> { Err(FormatError::Custom("nope".into())) };
        let payload = builder(Arc::new(formatter)).build(&[event_at("2024-01-15T10:30:00Z", "x")]);

        assert!(payload.is_empty());
        assert!(payload.body.is_empty());
        assert_eq!(payload.skipped, 1);
    }

    #[test]
    fn empty_batch_yields_empty_payload() {
        let payload = builder(Arc::new(JsonDocumentFormatter::default())).build(&[]);
        assert!(payload.is_empty());
        assert_eq!(payload.skipped, 0);
    }
}
