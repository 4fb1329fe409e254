use crate::exception::ExceptionInfo;
use crate::value::{AttrValue, Attributes};
use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Standard field names emitted by the formatter, in output order.
pub const STANDARD_FIELDS: [&str; 17] = [
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
];

/// Names the formatter owns in addition to [`STANDARD_FIELDS`]. Extra
/// attributes using any of these are never emitted.
pub const RESERVED_FIELDS: [&str; 3] = ["exc_text", "timestamp", "traceback"];

/// Whether `key` is owned by the formatter and cannot be an extra attribute.
pub fn is_reserved(key: &str) -> bool {
    STANDARD_FIELDS.contains(&key) || RESERVED_FIELDS.contains(&key)
}

/// Severity of a [`LogEvent`], with the conventional numeric codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Level {
    NotSet,
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Custom { name: String, code: u32 },
}

impl Level {
    pub fn code(&self) -> u32 {
        match self {
            Level::NotSet => 0,
            Level::Trace => 5,
            Level::Debug => 10,
            Level::Info => 20,
            Level::Warning => 30,
            Level::Error => 40,
            Level::Critical => 50,
            Level::Custom { code, .. } => *code,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Level::NotSet => "NOTSET",
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
            Level::Custom { name, .. } => name,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NOTSET" => Ok(Level::NotSet),
            "TRACE" => Ok(Level::Trace),
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARN" | "WARNING" => Ok(Level::Warning),
            "ERROR" => Ok(Level::Error),
            "CRITICAL" | "FATAL" => Ok(Level::Critical),
            other => Err(format!("unknown level {other:?}")),
        }
    }
}

#[cfg(feature = "layer")]
impl From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warning,
            _ => Level::Error,
        }
    }
}

/// Log message, either final text or a `{}` template with arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Template { template: String, args: Vec<AttrValue> },
}

impl Message {
    pub fn template(template: impl Into<String>, args: Vec<AttrValue>) -> Self {
        Message::Template { template: template.into(), args }
    }

    /// Resolve the message to its final text.
    ///
    /// Each `{}` consumes the next argument; `{{` and `}}` are literal braces.
    /// Placeholders without a matching argument are kept verbatim and surplus
    /// arguments are ignored, so resolution never fails.
    pub fn resolve(&self) -> Cow<'_, str> {
        match self {
            Message::Text(text) => Cow::Borrowed(text),
            Message::Template { template, args } => Cow::Owned(interpolate(template, args)),
        }
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Message::Text(value.to_owned())
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Message::Text(value)
    }
}

fn interpolate(template: &str, args: &[AttrValue]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('{', Some('{')) => {
                chars.next();
                out.push('{');
            }
            ('}', Some('}')) => {
                chars.next();
                out.push('}');
            }
            ('{', Some('}')) => {
                chars.next();
                match args.next() {
                    Some(arg) => push_display(&mut out, arg),
                    None => out.push_str("{}"),
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn push_display(out: &mut String, value: &AttrValue) {
    use std::fmt::Write;
    let _ = match value {
        AttrValue::Null => write!(out, "null"),
        AttrValue::Bool(v) => write!(out, "{v}"),
        AttrValue::Int(v) => write!(out, "{v}"),
        AttrValue::UInt(v) => write!(out, "{v}"),
        AttrValue::Float(v) => write!(out, "{v}"),
        AttrValue::Str(v) => write!(out, "{v}"),
        AttrValue::Opaque(v) => write!(out, "{v}"),
        other => write!(out, "{other:?}"),
    };
}

/// Call site that produced an event.
///
/// Attribution is always explicit: the logging frontend passes the location
/// it wants reported rather than having it inferred from the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub function: String,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self { file: file.into(), line, function: function.into() }
    }

    /// Location of the caller of this function.
    #[track_caller]
    pub fn caller(function: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self::new(loc.file(), loc.line(), function)
    }

    /// Final path component, e.g. `lib.rs`.
    pub fn filename(&self) -> &str {
        Path::new(&self.file)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.file)
    }

    /// File name without extension, e.g. `lib`.
    pub fn module(&self) -> &str {
        Path::new(&self.file)
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.file)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

impl ProcessInfo {
    /// Identity of the running process, computed once.
    pub fn current() -> &'static ProcessInfo {
        static CURRENT: OnceLock<ProcessInfo> = OnceLock::new();
        CURRENT.get_or_init(|| {
            let name = std::env::args_os()
                .next()
                .and_then(|arg0| {
                    Path::new(&arg0)
                        .file_stem()
                        .map(|stem| stem.to_string_lossy().into_owned())
                })
                .unwrap_or_else(|| "main".to_string());
            ProcessInfo { pid: std::process::id(), name }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: u64,
    pub name: String,
}

impl ThreadInfo {
    /// Identity of the calling thread. Ids are sequential, assigned on the
    /// first call made from each thread.
    pub fn current() -> ThreadInfo {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        thread_local! {
            static ID: u64 = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        }
        let id = ID.with(|id| *id);
        let current = std::thread::current();
        ThreadInfo {
            id,
            name: current.name().unwrap_or("<unnamed>").to_string(),
        }
    }
}

/// Reference point for `relativeCreated`, fixed on first use.
fn start_instant() -> Instant {
    static START: OnceLock<Instant> = OnceLock::new();
    *START.get_or_init(Instant::now)
}

/// One log call's captured state.
///
/// Created per log call, passed through filters and the formatter, then
/// dropped. Filters annotate it through [`LogEvent::extra`].
#[derive(Debug, Clone)]
pub struct LogEvent {
    /// Seconds since the Unix epoch.
    pub created: f64,
    pub level: Level,
    /// Logger name.
    pub name: String,
    pub message: Message,
    pub location: SourceLocation,
    pub process: ProcessInfo,
    pub thread: ThreadInfo,
    /// Milliseconds since logging started in this process.
    pub relative_created: f64,
    pub stack_info: Option<String>,
    pub exception: Option<ExceptionInfo>,
    pub extra: Attributes,
}

impl LogEvent {
    /// Capture an event now on the calling thread.
    pub fn new(
        level: Level,
        name: impl Into<String>,
        message: impl Into<Message>,
        location: SourceLocation,
    ) -> Self {
        let start = start_instant();
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        Self {
            created,
            level,
            name: name.into(),
            message: message.into(),
            location,
            process: ProcessInfo::current().clone(),
            thread: ThreadInfo::current(),
            relative_created: start.elapsed().as_secs_f64() * 1000.0,
            stack_info: None,
            exception: None,
            extra: Attributes::new(),
        }
    }

    pub fn with_created(mut self, created: f64) -> Self {
        self.created = created;
        self
    }

    pub fn with_exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn with_stack_info(mut self, stack_info: impl Into<String>) -> Self {
        self.stack_info = Some(stack_info.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.extra.insert(key, value);
        self
    }

    /// Millisecond component of [`created`](Self::created).
    ///
    /// Rounded to the microsecond so binary fractions such as `.123` do not
    /// come out as `122.999..`.
    pub fn msecs(&self) -> f64 {
        (((self.created - self.created.floor()) * 1e6).round() / 1e3).min(999.999)
    }
}
