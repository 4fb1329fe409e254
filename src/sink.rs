use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Destination for formatted records.
///
/// Each call receives one complete document without a trailing line
/// separator; the sink applies its own line convention. Called synchronously
/// on the thread that logged, so implementations should not block for long.
pub trait LineSink: Send + Sync {
    /// Write a single formatted record.
    ///
    /// **Returns**
    /// - `Ok(())` if the line was accepted.
    /// - `Err(..)` if the underlying writer failed. The caller counts the
    ///   failure and moves on; the line is not retried.
    fn write_line(&self, line: &str) -> io::Result<()>;

    /// Flush buffered output. Default implementation is a no-op.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: LineSink + ?Sized> LineSink for Arc<S> {
    fn write_line(&self, line: &str) -> io::Result<()> {
        (**self).write_line(line)
    }

    fn flush(&self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Sink over any [`io::Write`], terminating each record with `\n`.
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer) }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl WriterSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl WriterSink<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> LineSink for WriterSink<W> {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // One write per record so concurrent lines never interleave.
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        writer.write_all(&buf)
    }

    fn flush(&self) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.flush()
    }
}

/// Sink that keeps every line in memory. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn take(&self) -> Vec<String> {
        self.lines.lock().map(|mut l| std::mem::take(&mut *l)).unwrap_or_default()
    }
}

impl LineSink for MemorySink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory sink poisoned"))?
            .push(line.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_sink_appends_newline() {
        let sink = WriterSink::new(Vec::new());
        sink.write_line(r#"{"a":1}"#).unwrap();
        sink.write_line(r#"{"a":2}"#).unwrap();
        assert_eq!(sink.into_inner(), b"{\"a\":1}\n{\"a\":2}\n".to_vec());
    }

    #[test]
    fn memory_sink_clones_share_lines() {
        let sink = MemorySink::new();
        let shared: Arc<dyn LineSink> = Arc::new(sink.clone());
        shared.write_line("one").unwrap();
        assert_eq!(sink.lines(), vec!["one".to_string()]);
        assert_eq!(sink.take().len(), 1);
        assert!(sink.lines().is_empty());
    }
}
