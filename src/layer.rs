use crate::context::ContextFilter;
use crate::exception::ExceptionInfo;
use crate::formatter::JsonFormatter;
use crate::record::{Level, LogEvent, Message, ProcessInfo, SourceLocation};
use crate::sink::LineSink;
use crate::value::{AttrValue, Attributes};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that turns events into JSON records.
///
/// Each event at or above `max_level` becomes a [`LogEvent`]: the target
/// is the logger name, `message` the message, other fields extra
/// attributes, and an error-typed field the exception. The innermost span
/// name is reported as `funcName` (with `#[instrument]` that is the function
/// being run). The event then passes through the configured
/// [`ContextFilter`]s and is formatted and written to the [`LineSink`] on
/// the calling thread.
pub struct JsonLogLayer {
    formatter: JsonFormatter,
    filters: Vec<ContextFilter>,
    sink: Arc<dyn LineSink>,
    max_level: tracing::Level,
    process: ProcessInfo,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Records successfully written to the sink.
    pub emitted_events: Arc<AtomicU64>,
    /// Records the sink failed to write.
    pub failed_writes: Arc<AtomicU64>,
}

impl JsonLogLayer {
    /// Create a layer writing records formatted by `formatter` to `sink`.
    ///
    /// Captures `TRACE` and above until narrowed with
    /// [`with_max_level`](Self::with_max_level).
    pub fn new(sink: Arc<dyn LineSink>, formatter: JsonFormatter) -> Self {
        Self {
            formatter,
            filters: Vec::new(),
            sink,
            max_level: tracing::Level::TRACE,
            process: ProcessInfo::current().clone(),
            total_events: Arc::new(AtomicU64::new(0)),
            emitted_events: Arc::new(AtomicU64::new(0)),
            failed_writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `filter` on every event, after previously added filters.
    pub fn with_context(mut self, filter: ContextFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Least severe level that is still recorded.
    pub fn with_max_level(mut self, level: tracing::Level) -> Self {
        self.max_level = level;
        self
    }

    /// Report `name` as `processName` instead of the executable name.
    pub fn with_process_name(mut self, name: impl Into<String>) -> Self {
        self.process.name = name.into();
        self
    }

    pub fn formatter(&self) -> &JsonFormatter {
        &self.formatter
    }

    fn build_event<S>(&self, event: &Event<'_>, ctx: &Context<'_, S>) -> LogEvent
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        let meta = event.metadata();

        let mut fields = Attributes::new();
        let mut message: Option<String> = None;
        let mut exception: Option<ExceptionInfo> = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
            exception: &mut exception,
        };
        event.record(&mut visitor);

        let function = ctx
            .event_scope(event)
            .and_then(|mut scope| scope.next())
            .map(|span| span.name().to_string())
            .or_else(|| meta.module_path().map(str::to_string))
            .unwrap_or_else(|| meta.target().to_string());
        let location = SourceLocation::new(
            meta.file().unwrap_or("<unknown>"),
            meta.line().unwrap_or(0),
            function,
        );

        let mut record = LogEvent::new(
            Level::from(meta.level()),
            meta.target(),
            Message::Text(message.unwrap_or_default()),
            location,
        );
        record.process = self.process.clone();
        record.exception = exception;
        record.extra = fields;
        record
    }
}

impl<S> Layer<S> for JsonLogLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        if *event.metadata().level() > self.max_level {
            return;
        }

        let mut record = self.build_event(event, &ctx);
        for filter in &self.filters {
            filter.apply(&mut record);
        }

        let line = self.formatter.format(&record);
        match self.sink.write_line(&line) {
            Ok(()) => {
                self.emitted_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.failed_writes.fetch_add(1, Ordering::Relaxed);
                // Logging through tracing from inside the layer would recurse.
                eprintln!("failed to write log record: {}", e);
            }
        }
    }
}

/// Collects an event's fields into extra attributes.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut Attributes,
    pub message: &'a mut Option<String>,
    pub exception: &'a mut Option<ExceptionInfo>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name(), value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name(), value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name(), value);
    }

    fn record_i128(&mut self, field: &Field, value: i128) {
        let value = i64::try_from(value).map_or_else(|_| AttrValue::Str(value.to_string()), AttrValue::Int);
        self.fields.insert(field.name(), value);
    }

    fn record_u128(&mut self, field: &Field, value: u128) {
        let value = u64::try_from(value).map_or_else(|_| AttrValue::Str(value.to_string()), AttrValue::UInt);
        self.fields.insert(field.name(), value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name(), value);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name(), value);
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        // The first error field is the exception; later ones stay attributes.
        if self.exception.is_none() {
            *self.exception = Some(ExceptionInfo::from_dyn_error(value));
        } else {
            self.fields.insert(field.name(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name(), format!("{:?}", value));
        }
    }
}
