use crate::event::{ExceptionInfo, LogEvent, PropertyValue};
use crate::init::LayerConfig;
use crate::sink::LogSink;
use chrono::Utc;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::field::{Field, Visit};
use tracing::{debug, warn, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Events from this crate are diagnostics and are never shipped, which
/// keeps a failing sink from feeding on its own warnings.
const INTERNAL_TARGET_PREFIX: &str = "tracing_bulk_sink";

/// `tracing_subscriber` layer that turns events into [`LogEvent`]s and
/// ships them in batches to a [`LogSink`] from a background task.
///
/// Events below the configured minimum level are ignored. Network I/O is
/// fully decoupled from application threads; when the channel is full new
/// events are dropped and counted.
pub struct BulkLogLayer {
    sender: mpsc::Sender<LogEvent>,
    min_level: Level,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Successfully enqueued into channel.
    pub enqueued_events: Arc<AtomicU64>,
    /// Dropped because the channel was full.
    pub dropped_events: Arc<AtomicU64>,
}

impl BulkLogLayer {
    /// Create a new layer and spawn the batching task feeding `sink`.
    ///
    /// Minimal thresholds are enforced for the buffer, batch size, flush
    /// interval and attempt count to avoid degenerate configurations. The
    /// task ends, after a final flush, once the layer is dropped.
    pub fn new(sink: Arc<dyn LogSink>, config: &LayerConfig) -> (Self, JoinHandle<()>) {
        let buffer = config.channel_buffer.max(16);
        let policy = BatchPolicy {
            batch_size: config.batch_size.max(1),
            flush_interval: config.flush_interval.max(Duration::from_millis(10)),
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff.max(config.initial_backoff),
        };

        let (tx, rx) = mpsc::channel::<LogEvent>(buffer);
        let handle = tokio::spawn(run_batches(sink, rx, policy));

        (
            Self {
                sender: tx,
                min_level: config.min_level,
                total_events: Arc::new(AtomicU64::new(0)),
                enqueued_events: Arc::new(AtomicU64::new(0)),
                dropped_events: Arc::new(AtomicU64::new(0)),
            },
            handle,
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct BatchPolicy {
    batch_size: usize,
    flush_interval: Duration,
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

async fn run_batches(sink: Arc<dyn LogSink>, mut rx: mpsc::Receiver<LogEvent>, policy: BatchPolicy) {
    let mut batch = Vec::with_capacity(policy.batch_size);
    let mut ticker = interval(policy.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(event) => {
                    batch.push(event);
                    if batch.len() >= policy.batch_size {
                        send_batch(&*sink, &mut batch, &policy).await;
                    }
                }
                None => {
                    if !batch.is_empty() {
                        send_batch(&*sink, &mut batch, &policy).await;
                    }
                    sink.shutdown().await;
                    break;
                }
            },
            _ = ticker.tick() => {
                if batch.is_empty() {
                    sink.on_empty_batch().await;
                } else {
                    send_batch(&*sink, &mut batch, &policy).await;
                }
            }
        }
    }
}

/// Deliver `batch`, redelivering it whole on error with exponential
/// backoff. The batch is cleared once delivered or once every attempt
/// has failed.
async fn send_batch(sink: &dyn LogSink, batch: &mut Vec<LogEvent>, policy: &BatchPolicy) {
    let mut backoff = policy.initial_backoff;

    for attempt in 1..=policy.max_attempts {
        let err: Box<dyn Error + Send + Sync> = match sink.emit_batch(batch).await {
            Ok(()) => {
                debug!(events = batch.len(), attempt, "log batch delivered");
                batch.clear();
                return;
            }
            Err(e) => e,
        };

        if attempt == policy.max_attempts {
            warn!(events = batch.len(), attempts = attempt, error = %err, "giving up on log batch");
            break;
        }

        warn!(attempt, error = %err, retry_in = ?backoff, "log batch delivery failed, retrying");
        sleep(backoff).await;
        backoff = std::cmp::min(backoff * 2, policy.max_backoff);
    }

    batch.clear();
}

impl<S> Layer<S> for BulkLogLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        if *meta.level() > self.min_level || meta.target().starts_with(INTERNAL_TARGET_PREFIX) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        visitor
            .properties
            .insert("SourceContext".to_string(), PropertyValue::from(meta.target()));

        let record = LogEvent {
            timestamp: Utc::now().into(),
            level: *meta.level(),
            message_template: visitor.message.unwrap_or_default(),
            rendered_message: None,
            exception: visitor.exception,
            properties: visitor.properties,
        };

        match self.sender.try_send(record) {
            Ok(()) => {
                self.enqueued_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Collects event fields: `message` becomes the template, errors become
/// the exception, everything else a property.
#[derive(Default)]
pub struct FieldVisitor {
    pub properties: BTreeMap<String, PropertyValue>,
    pub message: Option<String>,
    pub exception: Option<ExceptionInfo>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: PropertyValue) {
        self.properties.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, PropertyValue::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, PropertyValue::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, PropertyValue::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, PropertyValue::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, PropertyValue::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        let info = ExceptionInfo::from_error(value);
        if self.exception.is_none() {
            self.exception = Some(info);
        } else {
            self.insert(field, PropertyValue::from(info.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, PropertyValue::from(format!("{:?}", value)));
        }
    }
}
