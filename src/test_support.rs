//! Captures diagnostics emitted through `tracing` while a closure runs.

use std::fmt::{self, Write};
use std::sync::{Arc, Mutex};
use tracing::field::Field;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::Registry;

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<String>>>);

impl<S: Subscriber> Layer<S> for Capture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut line = event.metadata().level().to_string();
        let mut visit = |field: &Field, value: &dyn fmt::Debug| {
            let _ = write!(line, " {}={:?}", field.name(), value);
        };
        event.record(&mut visit);
        self.0.lock().unwrap().push(line);
    }
}

/// Run `f` and return its result with one line per event logged meanwhile,
/// formatted as `LEVEL field=value ...`.
pub(crate) fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
    let capture = Capture::default();
    let subscriber = Registry::default().with(capture.clone());
    let out = tracing::subscriber::with_default(subscriber, f);
    let lines = capture.0.lock().unwrap().clone();
    (out, lines)
}
