use json_log_format::{
    AttrValue, EncoderConfig, ExceptionInfo, FormatterConfig, FrameOrder, JsonEncoder, JsonFormatter,
    Level, LogEvent, RawFrame, SourceLocation,
};

fn main() {
    let formatter = JsonFormatter::default();

    let event = LogEvent::new(Level::Info, "demo", "Hi there", SourceLocation::caller("main"))
        .with_extra("user_id", 42)
        .with_extra("tags", vec!["a", "b"]);
    println!("{}", formatter.format(&event));

    let exception = ExceptionInfo::new("RuntimeError", "injected error").with_frames(
        vec![
            RawFrame::new("demos/json_logging.rs", 10, "main").with_source_line("handle_request()"),
            RawFrame::new("demos/json_logging.rs", 27, "handle_request")
                .with_source_line("return Err(Error::injected())"),
        ],
        FrameOrder::OldestFirst,
    );
    let event = LogEvent::new(Level::Error, "demo", "request failed", SourceLocation::caller("main"))
        .with_exception(exception);

    let pretty = JsonEncoder::new(EncoderConfig { indent: Some(2), ..EncoderConfig::default() })
        .and_then(|encoder| JsonFormatter::new(FormatterConfig::default(), encoder));
    match pretty {
        Ok(formatter) => println!("{}", formatter.format(&event)),
        Err(e) => eprintln!("invalid formatter configuration: {}", e),
    }

    let mut spaced = JsonFormatter::default();
    if let Err(e) = spaced.encoder_mut().set_separators(", ", ": ") {
        eprintln!("invalid separators: {}", e);
    }
    let event = LogEvent::new(Level::Warning, "demo", "odd value", SourceLocation::caller("main"))
        .with_extra("ratio", AttrValue::Float(f64::NAN));
    println!("{}", spaced.format(&event));
}
