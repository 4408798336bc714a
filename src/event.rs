use chrono::{DateTime, FixedOffset, Utc};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::Level;

use crate::error::PropertyError;

/// A single structured log event as handed to the sink.
///
/// Events are immutable once built; the sink only ever borrows them.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp: DateTime<FixedOffset>,
    pub level: Level,
    pub message_template: String,
    pub rendered_message: Option<String>,
    pub exception: Option<ExceptionInfo>,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl LogEvent {
    /// Create an event stamped with the current UTC time.
    pub fn new(level: Level, message_template: impl Into<String>) -> Self {
        LogEvent {
            timestamp: Utc::now().into(),
            level,
            message_template: message_template.into(),
            rendered_message: None,
            exception: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn with_rendered_message(mut self, rendered: impl Into<String>) -> Self {
        self.rendered_message = Some(rendered.into());
        self
    }
}

/// Structured property value: a scalar, a sequence, a nested mapping, or
/// a user-supplied value that renders itself lazily.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    Sequence(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
    Custom(Arc<dyn ValueRenderer>),
}

/// Hook for values that know how to turn themselves into a [`PropertyValue`].
///
/// Rendering may fail; the formatter substitutes a placeholder for the
/// failing property instead of dropping the whole document.
pub trait ValueRenderer: fmt::Debug + Send + Sync {
    fn render(&self) -> Result<PropertyValue, Box<dyn Error + Send + Sync>>;
}

impl PropertyValue {
    /// Convert into a JSON value, resolving custom renderers recursively.
    pub fn to_json(&self) -> Result<serde_json::Value, PropertyError> {
        use serde_json::Value;

        Ok(match self {
            PropertyValue::Null => Value::Null,
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::I64(n) => Value::from(*n),
            PropertyValue::U64(n) => Value::from(*n),
            PropertyValue::F64(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .ok_or(PropertyError::NonFiniteNumber(*f))?,
            PropertyValue::Str(s) => Value::String(s.clone()),
            PropertyValue::Sequence(items) => Value::Array(
                items
                    .iter()
                    .map(PropertyValue::to_json)
                    .collect::<Result<_, _>>()?,
            ),
            PropertyValue::Map(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key.clone(), value.to_json()?);
                }
                Value::Object(out)
            }
            PropertyValue::Custom(renderer) => renderer
                .render()
                .map_err(PropertyError::Renderer)?
                .to_json()?,
        })
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::I64(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::I64(v.into())
    }
}

impl From<u64> for PropertyValue {
    fn from(v: u64) -> Self {
        PropertyValue::U64(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::F64(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Str(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Str(v)
    }
}

impl From<Vec<PropertyValue>> for PropertyValue {
    fn from(v: Vec<PropertyValue>) -> Self {
        PropertyValue::Sequence(v)
    }
}

impl From<BTreeMap<String, PropertyValue>> for PropertyValue {
    fn from(v: BTreeMap<String, PropertyValue>) -> Self {
        PropertyValue::Map(v)
    }
}

/// Text form of an error attached to an event, including its cause chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub message: String,
    pub causes: Vec<String>,
}

impl ExceptionInfo {
    pub fn new(message: impl Into<String>) -> Self {
        ExceptionInfo { message: message.into(), causes: Vec::new() }
    }

    /// Capture `err` and every error reachable through [`Error::source`].
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        ExceptionInfo { message: err.to_string(), causes }
    }
}

impl fmt::Display for ExceptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for cause in &self.causes {
            write!(f, " ---> {}", cause)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer failure")]
    struct Outer(#[source] Inner);

    #[derive(Debug, thiserror::Error)]
    #[error("inner failure")]
    struct Inner;

    #[test]
    fn exception_captures_cause_chain() {
        let info = ExceptionInfo::from_error(&Outer(Inner));
        assert_eq!(info.message, "outer failure");
        assert_eq!(info.causes, vec!["inner failure".to_string()]);
        assert_eq!(info.to_string(), "outer failure ---> inner failure");
    }

    #[test]
    fn nested_values_convert_to_json() {
        let mut inner = BTreeMap::new();
        inner.insert("id".to_string(), PropertyValue::from(7_i64));
        let value = PropertyValue::Sequence(vec![PropertyValue::Map(inner), "x".into(), PropertyValue::Null]);

        let json = value.to_json().unwrap();
        assert_eq!(json, serde_json::json!([{"id": 7}, "x", null]));
    }

    #[test]
    fn non_finite_float_is_rejected() {
        let err = PropertyValue::F64(f64::NAN).to_json().unwrap_err();
        assert!(matches!(err, PropertyError::NonFiniteNumber(_)));
    }
}
