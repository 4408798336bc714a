use crate::layer::BulkLogLayer;
use crate::sink::LogSink;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the shipping layer and its batching task.
///
/// **Fields**
/// - `channel_buffer`: maximum number of queued [`LogEvent`]s before new
///   events are dropped.
/// - `batch_size`: events per batch handed to the sink.
/// - `flush_interval`: maximum time between flushes of a partial batch.
/// - `min_level`: least severe level that is shipped.
/// - `max_attempts`: deliveries of one batch before it is dropped.
/// - `initial_backoff` / `max_backoff`: delay between redeliveries,
///   doubled after each failure up to the maximum.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is
///   installed alongside and events are printed to the console too.
///
/// [`LogEvent`]: crate::event::LogEvent
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub min_level: Level,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            min_level: Level::INFO,
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            enable_stdout: true,
        }
    }
}

/// Install a global `tracing` subscriber shipping events to `sink`.
///
/// **Parameters**
/// - `sink`: implementation of [`LogSink`] that will receive batches.
/// - `config`: [`LayerConfig`] controlling buffering and batching.
///
/// **Returns**
/// - The handle of the batching task.
/// - `Err(..)` if a global subscriber is already installed.
///
/// Must be called from within a Tokio runtime.
pub fn init_tracing_with_config(
    sink: Arc<dyn LogSink>,
    config: LayerConfig,
) -> Result<JoinHandle<()>, SetGlobalDefaultError> {
    let (layer, handle) = BulkLogLayer::new(sink, &config);

    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(handle)
}

/// Initialize tracing with sensible defaults.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::default`].
pub fn init_tracing(sink: Arc<dyn LogSink>) -> Result<JoinHandle<()>, SetGlobalDefaultError> {
    init_tracing_with_config(sink, LayerConfig::default())
}
