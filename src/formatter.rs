use chrono::SecondsFormat;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use tracing::warn;

use crate::error::FormatError;
use crate::event::LogEvent;
use crate::template;

/// Default name of the timestamp field in indexed documents.
pub const DEFAULT_TIMESTAMP_FIELD: &str = "@timestamp";

/// Turns one [`LogEvent`] into a single-line JSON document.
///
/// Implementations must return exactly one line. The payload builder
/// normalizes the line ending, so a trailing `\n` is optional.
pub trait DocumentFormatter: Send + Sync {
    fn format(&self, event: &LogEvent) -> Result<String, FormatError>;
}

impl<F> DocumentFormatter for F
where
    F: Fn(&LogEvent) -> Result<String, FormatError> + Send + Sync,
{
    fn format(&self, event: &LogEvent) -> Result<String, FormatError> {
        self(event)
    }
}

/// Built-in document shape:
///
/// ```text
/// {"@timestamp":"..","Level":"ERROR","MessageTemplate":"..","RenderedMessage":"..",
///  "Exception":"..","Properties":{..}}
/// ```
///
/// `RenderedMessage` is only written when enabled, `Exception` only when
/// the event carries one and `Properties` only when non-empty.
#[derive(Debug, Clone)]
pub struct JsonDocumentFormatter {
    timestamp_field: String,
    render_message: bool,
}

impl Default for JsonDocumentFormatter {
    fn default() -> Self {
        JsonDocumentFormatter::new(DEFAULT_TIMESTAMP_FIELD, false)
    }
}

impl JsonDocumentFormatter {
    pub fn new(timestamp_field: impl Into<String>, render_message: bool) -> Self {
        JsonDocumentFormatter { timestamp_field: timestamp_field.into(), render_message }
    }

    fn document<'a>(&'a self, event: &'a LogEvent) -> Document<'a> {
        let rendered = self.render_message.then(|| {
            event
                .rendered_message
                .clone()
                .unwrap_or_else(|| template::render(&event.message_template, &event.properties))
        });

        let properties = event
            .properties
            .iter()
            .map(|(name, value)| {
                let json = value.to_json().unwrap_or_else(|e| {
                    warn!(property = %name, error = %e, "failed to format property value, substituting placeholder");
                    Value::String(format!("<unformattable: {}>", e))
                });
                (name.as_str(), json)
            })
            .collect();

        Document {
            timestamp_field: &self.timestamp_field,
            timestamp: event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, false),
            level: event.level.as_str(),
            message_template: &event.message_template,
            rendered_message: rendered,
            exception: event.exception.as_ref().map(|e| e.to_string()),
            properties,
        }
    }
}

impl DocumentFormatter for JsonDocumentFormatter {
    fn format(&self, event: &LogEvent) -> Result<String, FormatError> {
        let mut line = serde_json::to_string(&self.document(event))?;
        line.push('\n');
        Ok(line)
    }
}

struct Document<'a> {
    timestamp_field: &'a str,
    timestamp: String,
    level: &'static str,
    message_template: &'a str,
    rendered_message: Option<String>,
    exception: Option<String>,
    properties: Vec<(&'a str, Value)>,
}

impl Serialize for Document<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(self.timestamp_field, &self.timestamp)?;
        map.serialize_entry("Level", self.level)?;
        map.serialize_entry("MessageTemplate", self.message_template)?;
        if let Some(rendered) = &self.rendered_message {
            map.serialize_entry("RenderedMessage", rendered)?;
        }
        if let Some(exception) = &self.exception {
            map.serialize_entry("Exception", exception)?;
        }
        if !self.properties.is_empty() {
            map.serialize_entry("Properties", &Properties(&self.properties))?;
        }
        map.end()
    }
}

struct Properties<'a>(&'a [(&'a str, Value)]);

impl Serialize for Properties<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
