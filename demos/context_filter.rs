use json_log_format::{
    from_fn, Attributes, ContextError, ContextFilter, JsonFormatter, Level, LogContext, LogEvent, SourceLocation,
    ThreadContext,
};
use std::thread;

fn log(filter: &ContextFilter, formatter: &JsonFormatter, message: &str) {
    let mut event = LogEvent::new(Level::Info, "demo.context", message, SourceLocation::caller("log"));
    filter.apply(&mut event);
    println!("{}", formatter.format(&event));
}

fn main() {
    let formatter = JsonFormatter::default();

    // request_id comes from the thread's scoped context, "-" otherwise.
    let filter = match ContextFilter::builder()
        .source(ThreadContext)
        .default_value("request_id", "-")
        .property("user")
        .build()
    {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("invalid context filter: {}", e);
            return;
        }
    };

    log(&filter, &formatter, "before any request");

    thread::scope(|s| {
        for id in ["req-1", "req-2"] {
            let (filter, formatter) = (&filter, &formatter);
            s.spawn(move || {
                let _request = LogContext::new().with("request_id", id).enter();
                log(filter, formatter, "handling request");
                LogContext::add_property("user", "alice");
                log(filter, formatter, "authenticated");
            });
        }
    });

    // A source that fails still yields the defaults.
    let flaky = ContextFilter::builder()
        .source(from_fn(|_: &LogEvent| -> Result<Attributes, ContextError> {
            Err(ContextError::Failed("context store offline".into()))
        }))
        .default_value("request_id", "-")
        .build();
    if let Ok(flaky) = flaky {
        log(&flaky, &formatter, "degraded context");
        eprintln!("resolution failures: {}", flaky.resolution_failures.load(std::sync::atomic::Ordering::Relaxed));
    }
}
