use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use json_log_format::init::init_tracing;
use json_log_format::noop_sink::NoopSink;

fn main() {
    let sink = Arc::new(NoopSink);
    if let Err(e) = init_tracing(sink) {
        eprintln!("failed to install subscriber: {}", e);
        return;
    }

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!(
        "default config: formatted {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
}
