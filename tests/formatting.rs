use json_log_format::{
    AttrValue, Clock, EncoderConfig, ExceptionInfo, FormatterConfig, FrameOrder, JsonEncoder, JsonFormatter, Level,
    LogEvent, Message, RawFrame, SourceLocation,
};
use serde_json::Value;
use std::thread;

fn event(level: Level, message: impl Into<Message>) -> LogEvent {
    LogEvent::new(level, "service.api", message, SourceLocation::new("src/api/handlers.rs", 88, "create_order"))
        .with_created(1_700_000_000.5)
}

fn utc_formatter() -> JsonFormatter {
    let config = FormatterConfig { clock: Clock::Utc, ..FormatterConfig::default() };
    JsonFormatter::new(config, JsonEncoder::default()).unwrap()
}

fn parse(line: &str) -> serde_json::Map<String, Value> {
    match serde_json::from_str(line).unwrap() {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

#[test]
fn record_parses_back_with_every_standard_field() {
    let out = utc_formatter().format(&event(Level::Info, "Hi there").with_extra("order_id", 1234));
    let doc = parse(&out);

    for key in [
        "created",
        "levelname",
        "levelno",
        "message",
        "pathname",
        "lineno",
        "funcName",
        "process",
        "processName",
        "thread",
        "threadName",
        "relativeCreated",
        "msecs",
        "name",
        "module",
        "filename",
        "stack_info",
        "exc_text",
        "timestamp",
    ] {
        assert!(doc.contains_key(key), "missing {key}");
    }
    assert_eq!(doc["message"], "Hi there");
    assert_eq!(doc["levelno"], 20);
    assert_eq!(doc["pathname"], "src/api/handlers.rs");
    assert_eq!(doc["filename"], "handlers.rs");
    assert_eq!(doc["module"], "handlers");
    assert_eq!(doc["lineno"], 88);
    assert_eq!(doc["funcName"], "create_order");
    assert_eq!(doc["msecs"], 500.0);
    assert_eq!(doc["timestamp"], "2023-11-14 22:13:20,500");
    assert_eq!(doc["order_id"], 1234);
    assert_eq!(doc["exc_text"], Value::Null);
    assert!(!doc.contains_key("traceback"));
}

#[test]
fn formatting_is_deterministic() {
    let formatter = utc_formatter();
    let e = event(Level::Warning, Message::template("retry {} of {}", vec![2.into(), 5.into()]))
        .with_extra("backend", "payments")
        .with_extra("latency", 1.5);
    let first = formatter.format(&e);
    assert_eq!(first, formatter.format(&e));
    assert_eq!(parse(&first)["message"], "retry 2 of 5");
}

#[test]
fn error_record_carries_structured_traceback() {
    let exception = ExceptionInfo::new("RuntimeError", "injected error").with_frames(
        vec![
            RawFrame::new("src/main.rs", 12, "main").with_source_line("    run()"),
            RawFrame::new("src/api/handlers.rs", 90, "create_order").with_source_line("fail()  "),
        ],
        FrameOrder::OldestFirst,
    );
    let out = utc_formatter().format(&event(Level::Error, "order failed").with_exception(exception));
    let doc = parse(&out);

    assert_eq!(doc["levelname"], "ERROR");
    let traceback = &doc["traceback"];
    assert_eq!(traceback["type"], "RuntimeError");
    assert_eq!(traceback["message"], "injected error");
    let stack = traceback["stack"].as_array().unwrap();
    assert_eq!(stack.len(), 2);
    assert_eq!(stack[0]["file"], "src/main.rs");
    assert_eq!(stack[0]["text"], "run()");
    assert_eq!(stack[1]["func"], "create_order");
    assert_eq!(stack[1]["line"], "90");
    assert_eq!(stack[1]["text"], "fail()");
    let keys: Vec<&String> = doc.keys().collect();
    assert_eq!(keys.last().map(|k| k.as_str()), Some("traceback"));
}

#[test]
fn customized_separators_show_up_in_output() {
    let mut formatter = utc_formatter();
    formatter.encoder_mut().set_separators(",  ", ":  ").unwrap();
    let out = formatter.format(&event(Level::Info, ""));
    assert!(out.contains("\"message\":  \"\",  "), "{out}");
    assert_eq!(parse(&out)["message"], "");
}

#[test]
fn indented_output_is_multi_line_and_parses() {
    let encoder = JsonEncoder::new(EncoderConfig { indent: Some(4), ..EncoderConfig::default() }).unwrap();
    let config = FormatterConfig { clock: Clock::Utc, ..FormatterConfig::default() };
    let formatter = JsonFormatter::new(config, encoder).unwrap();
    let out = formatter.format(&event(Level::Debug, "pretty").with_extra("nested", vec![1, 2]));
    assert!(out.contains("\n    \"created\":"));
    assert_eq!(parse(&out)["nested"], serde_json::json!([1, 2]));
}

#[test]
fn unencodable_values_use_the_default_converter() {
    let mut formatter = utc_formatter();
    formatter
        .encoder_mut()
        .set_default(|value| Value::String(format!("<{value}>")));
    let out = formatter.format(&event(Level::Info, "x").with_extra("ratio", AttrValue::Float(f64::INFINITY)));
    assert_eq!(parse(&out)["ratio"], "<Infinity>");
}

#[test]
fn shared_formatter_gives_identical_output_on_every_thread() {
    let formatter = utc_formatter();
    let e = event(Level::Info, "Hi there")
        .with_extra("request_id", "r-42")
        .with_extra("nested", vec![1, 2, 3]);
    let expected = formatter.format(&e);

    let (formatter, e) = (&formatter, &e);
    let outputs: Vec<String> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(move || (0..100).map(|_| formatter.format(e)).collect::<Vec<_>>()))
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(outputs.len(), 800);
    assert!(outputs.iter().all(|out| *out == expected));
}
