pub mod error;
pub mod event;
pub mod template;
pub mod index;
pub mod formatter;
pub mod payload;
pub mod response;
pub mod transport;
pub mod config;
pub mod sink;
pub mod elasticsearch;
pub mod env;

pub mod layer;
pub mod init;

#[cfg(test)]
mod test_support;

pub use config::ElasticsearchConfig;
pub use elasticsearch::ElasticsearchSink;
pub use error::{ConfigError, SinkError, TransportError};
pub use event::{ExceptionInfo, LogEvent, PropertyValue};
