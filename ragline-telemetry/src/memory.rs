use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Instant, SystemTime};
use tracing::{Id, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

/// A closed span as captured by [`InMemorySpanLayer`].
#[derive(Debug, Clone, Serialize)]
pub struct SpanRecord {
    #[serde(rename = "span_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "parent_span_id", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Wall-clock start, nanoseconds since the Unix epoch.
    pub start_time: u128,
    /// Time from span creation to close, in microseconds.
    pub duration_us: u128,
    pub fields: HashMap<String, serde_json::Value>,
}

/// Shared, cloneable storage for captured spans.
#[derive(Debug, Clone, Default)]
pub struct SpanStorage {
    spans: Arc<RwLock<Vec<SpanRecord>>>,
}

impl SpanStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured spans in close order.
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Captured spans with the given name, in close order.
    pub fn spans_named(&self, name: &str) -> Vec<SpanRecord> {
        self.spans
            .read()
            .map(|s| s.iter().filter(|r| r.name == name).cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut spans) = self.spans.write() {
            spans.clear();
        }
    }

    fn push(&self, record: SpanRecord) {
        if let Ok(mut spans) = self.spans.write() {
            spans.push(record);
        }
    }
}

/// A tracing layer that records every closed span into a [`SpanStorage`].
pub struct InMemorySpanLayer {
    storage: SpanStorage,
}

impl InMemorySpanLayer {
    pub fn new(storage: SpanStorage) -> Self {
        Self { storage }
    }
}

struct Timing {
    wall: u128,
    started: Instant,
}

struct SpanFields(HashMap<String, serde_json::Value>);

impl<S> Layer<S> for InMemorySpanLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &tracing::span::Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let wall = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();

        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        extensions.insert(Timing { wall, started: Instant::now() });
        extensions.insert(SpanFields(visitor.0));
    }

    fn on_record(&self, id: &Id, values: &tracing::span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            let mut visitor = JsonVisitor::default();
            values.record(&mut visitor);
            fields.0.extend(visitor.0);
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else {
            return;
        };
        let extensions = span.extensions();
        let (start_time, duration_us) = extensions
            .get::<Timing>()
            .map(|t| (t.wall, t.started.elapsed().as_micros()))
            .unwrap_or_default();
        let fields = extensions.get::<SpanFields>().map(|f| f.0.clone()).unwrap_or_default();

        self.storage.push(SpanRecord {
            id: format!("{:016x}", id.into_u64()),
            name: span.metadata().name().to_string(),
            parent_id: span.parent().map(|p| format!("{:016x}", p.id().into_u64())),
            start_time,
            duration_us,
            fields,
        });
    }
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, serde_json::Value>);

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::info_span;
    use tracing_subscriber::layer::SubscriberExt;

    fn capture(f: impl FnOnce()) -> SpanStorage {
        let storage = SpanStorage::new();
        let subscriber =
            tracing_subscriber::registry().with(InMemorySpanLayer::new(storage.clone()));
        tracing::subscriber::with_default(subscriber, f);
        storage
    }

    #[test]
    fn records_closed_span_with_fields() {
        let storage = capture(|| {
            let span = info_span!("ask", top_k = 2u64, question = "why?");
            let _guard = span.enter();
        });

        let spans = storage.spans_named("ask");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].fields["top_k"], serde_json::json!(2));
        assert_eq!(spans[0].fields["question"], serde_json::json!("why?"));
        assert!(spans[0].start_time > 0);
        assert!(spans[0].parent_id.is_none());
    }

    #[test]
    fn child_spans_point_at_parent() {
        let storage = capture(|| {
            let outer = info_span!("ingest");
            let _outer = outer.enter();
            let inner = info_span!("stage", stage = "embed");
            drop(inner.enter());
            drop(inner);
        });

        let stage = &storage.spans_named("stage")[0];
        let ingest = &storage.spans_named("ingest")[0];
        assert_eq!(stage.parent_id.as_deref(), Some(ingest.id.as_str()));
        assert_eq!(storage.spans().len(), 2);
    }

    #[test]
    fn recorded_values_are_merged() {
        let storage = capture(|| {
            let span = info_span!("ingest", chunk_count = tracing::field::Empty);
            span.record("chunk_count", 7u64);
        });
        assert_eq!(storage.spans_named("ingest")[0].fields["chunk_count"], serde_json::json!(7));

        storage.clear();
        assert!(storage.spans().is_empty());
    }
}
