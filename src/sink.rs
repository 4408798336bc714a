use crate::event::LogEvent;
use async_trait::async_trait;
use std::error::Error;

/// Asynchronous destination for batches of [`LogEvent`]s.
///
/// Implementations transport a batch to a concrete backend. The batching
/// task in [`crate::layer`] calls `emit_batch` for at most one batch at a
/// time per sink and never from an application thread.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver one batch.
    ///
    /// **Parameters**
    /// - `batch`: events in arrival order; may be empty.
    ///
    /// **Returns**
    /// - `Ok(())` if the backend accepted the whole batch.
    /// - `Err(..)` if the batch must be redelivered (network error,
    ///   HTTP status, rejected documents, etc). The caller retries the
    ///   same batch with backoff and eventually drops it.
    async fn emit_batch(&self, batch: &[LogEvent]) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Called when a timed flush finds nothing queued.
    ///
    /// Default implementation is a no-op.
    async fn on_empty_batch(&self) {}

    /// Release any resources held by the sink.
    ///
    /// Default implementation is a no-op.
    async fn shutdown(&self) {}
}
