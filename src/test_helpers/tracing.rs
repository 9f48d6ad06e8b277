//! Tracing capture harness for unit tests.
//!
//! Records every event emitted while a future runs so tests can assert on
//! levels, messages and structured fields.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Arc, Mutex},
};

use tracing::{
    Event,
    Level,
    Metadata,
    Subscriber,
    field::{Field, Visit},
    instrument::WithSubscriber,
    span::{Attributes, Id, Record},
};

#[derive(Clone, Default)]
struct RecordingSubscriber {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingSubscriber {
    fn take_events(&self) -> Vec<RecordedEvent> {
        let mut guard = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *guard)
    }
}

/// Captured tracing event.
#[derive(Debug)]
pub(crate) struct RecordedEvent {
    level: Level,
    fields: HashMap<String, String>,
    message: Option<String>,
}

impl RecordedEvent {
    pub(crate) const fn level(&self) -> Level { self.level }

    pub(crate) fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub(crate) fn message(&self) -> Option<&str> { self.message.as_deref() }
}

#[derive(Default)]
struct FieldRecorder {
    fields: HashMap<String, String>,
    message: Option<String>,
}

impl FieldRecorder {
    fn record_value(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_owned(), value);
        }
    }
}

impl Visit for FieldRecorder {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_value(field, format!("{value:?}"));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, value.to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, value.to_owned());
    }
}

impl Subscriber for RecordingSubscriber {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool { true }

    fn new_span(&self, _attrs: &Attributes<'_>) -> Id { Id::from_u64(1) }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let mut recorder = FieldRecorder::default();
        event.record(&mut recorder);
        let record = RecordedEvent {
            level: *event.metadata().level(),
            fields: recorder.fields,
            message: recorder.message,
        };
        let mut guard = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(record);
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

/// Run `fut` with a recording subscriber and return its output together with
/// every event it emitted.
pub(crate) async fn capture_events<F: Future>(fut: F) -> (F::Output, Vec<RecordedEvent>) {
    let subscriber = RecordingSubscriber::default();
    let output = fut
        .with_subscriber(tracing::Dispatch::new(subscriber.clone()))
        .await;
    (output, subscriber.take_events())
}
