//! JSON record formatter.
//!
//! [`JsonFormatter::format`] turns a [`LogEvent`] into one JSON document.
//! Keys are emitted in a fixed order:
//!
//! 1. the standard fields, in [`STANDARD_FIELDS`] order, followed by
//!    `exc_text` (always `null`; the structured `traceback` replaces it);
//! 2. `timestamp`, `YYYY-MM-DD HH:MM:SS,mmm` by default;
//! 3. extra attributes in insertion order, skipping names the formatter
//!    owns;
//! 4. `traceback`, only when the event carries an exception.
//!
//! Keys listed in [`FormatterConfig::excluded_fields`] are left out wherever
//! they would appear.

use crate::encoder::JsonEncoder;
use crate::error::{ConfigError, FormatError};
use crate::exception::ExceptionSerializer;
use crate::record::{is_reserved, LogEvent, STANDARD_FIELDS};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;

/// Default `timestamp` layout; milliseconds are appended as `,mmm`.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Time zone used to render `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    #[default]
    Local,
    Utc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatterConfig {
    pub clock: Clock,
    /// strftime layout for `timestamp`. When this is the default layout the
    /// millisecond suffix `,mmm` is appended; custom layouts are used as-is.
    pub date_format: String,
    /// Keys never emitted.
    pub excluded_fields: BTreeSet<String>,
    /// Keep at most this many innermost frames in `traceback.stack`.
    pub max_frames: Option<usize>,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            clock: Clock::Local,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            excluded_fields: BTreeSet::new(),
            max_frames: None,
        }
    }
}

/// Formats [`LogEvent`]s as single JSON documents.
///
/// The formatter owns one [`JsonEncoder`]; changes made through
/// [`encoder_mut`](Self::encoder_mut) apply from the next call on. Nothing
/// per-call is stored on the formatter, so a shared `&JsonFormatter` can be
/// used from any number of threads.
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    encoder: JsonEncoder,
    config: FormatterConfig,
    exceptions: ExceptionSerializer,
}

impl JsonFormatter {
    pub fn new(config: FormatterConfig, encoder: JsonEncoder) -> Result<Self, ConfigError> {
        validate_date_format(&config.date_format)?;
        Ok(Self {
            encoder,
            exceptions: ExceptionSerializer { max_frames: config.max_frames },
            config,
        })
    }

    pub fn encoder(&self) -> &JsonEncoder {
        &self.encoder
    }

    pub fn encoder_mut(&mut self) -> &mut JsonEncoder {
        &mut self.encoder
    }

    pub fn config(&self) -> &FormatterConfig {
        &self.config
    }

    /// Format `event`, degrading rather than failing.
    ///
    /// If encoding the full record fails, a minimal document with the
    /// message, level and logger name is returned instead.
    pub fn format(&self, event: &LogEvent) -> String {
        self.try_format(event).unwrap_or_else(|err| self.fallback(event, &err))
    }

    pub fn try_format(&self, event: &LogEvent) -> Result<String, FormatError> {
        self.encoder.encode(&RecordView { formatter: self, event })
    }

    /// Format into `out`, appending to whatever it already holds.
    pub fn format_into(&self, event: &LogEvent, out: &mut Vec<u8>) -> Result<(), FormatError> {
        self.encoder.encode_into(out, &RecordView { formatter: self, event })?;
        Ok(())
    }

    /// Rendered `timestamp` field for `event`.
    pub fn format_time(&self, event: &LogEvent) -> String {
        let secs = event.created.floor();
        // Whole microseconds, so `.123` is not rendered as `,122`.
        let micros = (((event.created - secs) * 1e6).round() as u32).min(999_999);
        let millis = micros / 1_000;
        let Some(utc) = DateTime::<Utc>::from_timestamp(secs as i64, micros * 1_000) else {
            return event.created.to_string();
        };
        let rendered = match self.config.clock {
            Clock::Local => utc.with_timezone(&Local).format(&self.config.date_format).to_string(),
            Clock::Utc => utc.format(&self.config.date_format).to_string(),
        };
        if self.config.date_format == DEFAULT_DATE_FORMAT {
            format!("{rendered},{millis:03}")
        } else {
            rendered
        }
    }

    /// Minimal record used when the full one cannot be encoded. Goes through
    /// the same encoder so the layout matches; plain compact JSON is the last
    /// resort.
    fn fallback(&self, event: &LogEvent, err: &FormatError) -> String {
        let message = event.message.resolve();
        let doc = Fallback {
            message: &message,
            levelname: event.level.name(),
            levelno: event.level.code(),
            name: &event.name,
            format_error: err.to_string(),
        };
        self.encoder
            .encode(&doc)
            .or_else(|_| serde_json::to_string(&doc))
            .unwrap_or_else(|_| String::from("{}"))
    }

    fn emits(&self, key: &str) -> bool {
        !self.config.excluded_fields.contains(key)
    }
}

fn validate_date_format(format: &str) -> Result<(), ConfigError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::InvalidDateFormat(format.to_string()));
    }
    Ok(())
}

#[derive(Serialize)]
struct Fallback<'a> {
    message: &'a str,
    levelname: &'a str,
    levelno: u32,
    name: &'a str,
    format_error: String,
}

/// Borrowed view serialized as the record document.
struct RecordView<'a> {
    formatter: &'a JsonFormatter,
    event: &'a LogEvent,
}

impl Serialize for RecordView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let f = self.formatter;
        let e = self.event;
        let mut map = serializer.serialize_map(None)?;

        for key in STANDARD_FIELDS {
            if !f.emits(key) {
                continue;
            }
            match key {
                "created" => map.serialize_entry(key, &e.created)?,
                "levelname" => map.serialize_entry(key, e.level.name())?,
                "levelno" => map.serialize_entry(key, &e.level.code())?,
                "message" => map.serialize_entry(key, &e.message.resolve())?,
                "pathname" => map.serialize_entry(key, &e.location.file)?,
                "lineno" => map.serialize_entry(key, &e.location.line)?,
                "funcName" => map.serialize_entry(key, &e.location.function)?,
                "process" => map.serialize_entry(key, &e.process.pid)?,
                "processName" => map.serialize_entry(key, &e.process.name)?,
                "thread" => map.serialize_entry(key, &e.thread.id)?,
                "threadName" => map.serialize_entry(key, &e.thread.name)?,
                "relativeCreated" => map.serialize_entry(key, &e.relative_created)?,
                "msecs" => map.serialize_entry(key, &e.msecs())?,
                "name" => map.serialize_entry(key, &e.name)?,
                "module" => map.serialize_entry(key, e.location.module())?,
                "filename" => map.serialize_entry(key, e.location.filename())?,
                "stack_info" => map.serialize_entry(key, &e.stack_info)?,
                _ => {}
            }
        }
        if f.emits("exc_text") {
            map.serialize_entry("exc_text", &())?;
        }
        if f.emits("timestamp") {
            map.serialize_entry("timestamp", &f.format_time(e))?;
        }

        for (key, value) in e.extra.iter() {
            if is_reserved(key) || !f.emits(key) {
                continue;
            }
            map.serialize_entry(key, &f.encoder.value(value))?;
        }

        if let Some(exc) = &e.exception {
            if f.emits("traceback") {
                map.serialize_entry("traceback", &f.exceptions.serialize(exc))?;
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncoderConfig;
    use crate::exception::{ExceptionInfo, RawFrame};
    use crate::record::{Level, SourceLocation};
    use serde_json::Value;

    fn event() -> LogEvent {
        LogEvent::new(Level::Info, "root", "Hi there", SourceLocation::new("demo/app.rs", 7, "main"))
            .with_created(1_700_000_000.125)
    }

    fn parse(line: &str) -> serde_json::Map<String, Value> {
        match serde_json::from_str(line).unwrap() {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn info_event_has_standard_fields_and_no_traceback() {
        let out = JsonFormatter::default().format(&event());
        assert!(!out.contains('\n'));
        let doc = parse(&out);
        assert_eq!(doc["levelname"], "INFO");
        assert_eq!(doc["levelno"], 20);
        assert_eq!(doc["message"], "Hi there");
        assert_eq!(doc["name"], "root");
        assert_eq!(doc["module"], "app");
        assert_eq!(doc["filename"], "app.rs");
        assert_eq!(doc["lineno"], 7);
        assert_eq!(doc["exc_text"], Value::Null);
        assert_eq!(doc["stack_info"], Value::Null);
        assert!(!doc.contains_key("traceback"));
        for key in STANDARD_FIELDS {
            assert!(doc.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn keys_follow_documented_order() {
        let e = event()
            .with_extra("zeta", 1)
            .with_extra("alpha", 2)
            .with_exception(ExceptionInfo::new("E", "boom"));
        let out = JsonFormatter::default().format(&e);
        let positions: Vec<usize> = ["created", "stack_info", "exc_text", "timestamp", "zeta", "alpha", "traceback"]
            .iter()
            .map(|k| out.find(&format!("\"{k}\":")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{out}");
    }

    #[test]
    fn utc_timestamp_has_millisecond_suffix() {
        let config = FormatterConfig { clock: Clock::Utc, ..FormatterConfig::default() };
        let formatter = JsonFormatter::new(config, JsonEncoder::default()).unwrap();
        assert_eq!(formatter.format_time(&event()), "2023-11-14 22:13:20,125");
    }

    #[test]
    fn binary_fractions_do_not_lose_a_millisecond() {
        let config = FormatterConfig { clock: Clock::Utc, ..FormatterConfig::default() };
        let formatter = JsonFormatter::new(config, JsonEncoder::default()).unwrap();
        let e = event().with_created(1_700_000_000.123);
        assert_eq!(formatter.format_time(&e), "2023-11-14 22:13:20,123");
        assert_eq!(parse(&formatter.format(&e))["msecs"], 123.0);
    }

    #[test]
    fn extras_with_unowned_names_are_emitted() {
        let e = event()
            .with_extra("args", "--verbose")
            .with_extra("msg", "hello")
            .with_extra("exc_info", true);
        let out = JsonFormatter::default().format(&e);
        let doc = parse(&out);
        assert_eq!(doc["args"], "--verbose");
        assert_eq!(doc["msg"], "hello");
        assert_eq!(doc["exc_info"], true);
        assert_eq!(out.matches("\"args\":").count(), 1);
    }

    #[test]
    fn fallback_record_uses_encoder_layout() {
        let mut formatter = JsonFormatter::default();
        formatter.encoder_mut().set_separators(", ", ": ").unwrap();
        let err = FormatError::Serialize(serde_json::Error::io(std::io::Error::other("sink closed")));
        let out = formatter.fallback(&event(), &err);
        assert!(out.starts_with("{\"message\": \"Hi there\", \"levelname\": \"INFO\""), "{out}");
        let doc = parse(&out);
        assert_eq!(doc["levelno"], 20);
        assert_eq!(doc["name"], "root");
        assert!(doc["format_error"].as_str().is_some_and(|m| m.contains("sink closed")));
    }

    #[test]
    fn local_timestamp_matches_chrono_local() {
        let e = event();
        let expected = DateTime::<Utc>::from_timestamp(1_700_000_000, 0)
            .unwrap()
            .with_timezone(&Local)
            .format(DEFAULT_DATE_FORMAT)
            .to_string();
        assert_eq!(JsonFormatter::default().format_time(&e), format!("{expected},125"));
    }

    #[test]
    fn custom_date_format_is_validated() {
        let bad = FormatterConfig { date_format: "%Y-%Q".into(), ..FormatterConfig::default() };
        assert_eq!(
            JsonFormatter::new(bad, JsonEncoder::default()).unwrap_err(),
            ConfigError::InvalidDateFormat("%Y-%Q".into())
        );

        let iso = FormatterConfig { clock: Clock::Utc, date_format: "%Y-%m-%dT%H:%M:%S%.3fZ".into(), ..FormatterConfig::default() };
        let formatter = JsonFormatter::new(iso, JsonEncoder::default()).unwrap();
        assert_eq!(formatter.format_time(&event()), "2023-11-14T22:13:20.125Z");
    }

    #[test]
    fn extras_cannot_shadow_standard_fields() {
        let e = event().with_extra("message", "spoofed").with_extra("request_id", "r-1");
        let out = JsonFormatter::default().format(&e);
        assert_eq!(out.matches("\"message\":").count(), 1);
        let doc = parse(&out);
        assert_eq!(doc["message"], "Hi there");
        assert_eq!(doc["request_id"], "r-1");
    }

    #[test]
    fn excluded_fields_are_dropped() {
        let config = FormatterConfig {
            excluded_fields: ["process", "processName", "exc_text", "secret"].map(String::from).into(),
            ..FormatterConfig::default()
        };
        let formatter = JsonFormatter::new(config, JsonEncoder::default()).unwrap();
        let doc = parse(&formatter.format(&event().with_extra("secret", "hunter2")));
        for key in ["process", "processName", "exc_text", "secret"] {
            assert!(!doc.contains_key(key), "{key} should be excluded");
        }
        assert!(doc.contains_key("thread"));
    }

    #[test]
    fn exception_becomes_traceback() {
        let exc = ExceptionInfo::new("RuntimeError", "injected error").push_frame(
            RawFrame::new("demo/app.rs", 12, "main").with_source_line("    return Err(injected());\n"),
        );
        let mut e = event().with_exception(exc);
        e.level = Level::Error;
        let doc = parse(&JsonFormatter::default().format(&e));
        assert_eq!(doc["levelname"], "ERROR");
        assert_eq!(doc["exc_text"], Value::Null);
        let tb = &doc["traceback"];
        assert_eq!(tb["type"], "RuntimeError");
        assert_eq!(tb["message"], "injected error");
        assert_eq!(tb["stack"].as_array().map(Vec::len), Some(1));
        assert_eq!(tb["stack"][0]["text"], "return Err(injected());");
        assert_eq!(tb["stack"][0]["line"], "12");
    }

    #[test]
    fn repeated_formatting_is_byte_identical() {
        let formatter = JsonFormatter::default();
        let e = event().with_extra("k", vec![1, 2, 3]);
        assert_eq!(formatter.format(&e), formatter.format(&e));
    }

    #[test]
    fn encoder_changes_apply_to_next_call() {
        let mut formatter = JsonFormatter::default();
        let e = event();
        assert!(formatter.format(&e).contains("\"message\":\"Hi there\","));
        formatter.encoder_mut().set_separators(",  ", ":  ").unwrap();
        let out = formatter.format(&e);
        assert!(!out.contains("\"message\":\"Hi there\","));
        assert!(out.contains("\"message\":  \"Hi there\",  "));
    }

    #[test]
    fn pretty_printing_still_parses() {
        let encoder = JsonEncoder::new(EncoderConfig { indent: Some(4), ..EncoderConfig::default() }).unwrap();
        let formatter = JsonFormatter::new(FormatterConfig::default(), encoder).unwrap();
        let out = formatter.format(&event());
        assert!(out.contains("\n    \"created\":"));
        assert_eq!(parse(&out)["message"], "Hi there");
    }
}
