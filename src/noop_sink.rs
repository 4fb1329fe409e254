use crate::sink::LineSink;
use std::io;

/// A sink that simply drops all lines.
///
/// Useful for measuring the cost of building and formatting records without
/// any output I/O, and for tests that don't care about the output.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl LineSink for NoopSink {
    fn write_line(&self, _line: &str) -> io::Result<()> {
        Ok(())
    }
}
