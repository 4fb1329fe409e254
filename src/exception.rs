//! Machine-readable exception traces.
//!
//! An [`ExceptionInfo`] carries what was captured when the error was created:
//! its type, message and [`RawFrame`]s. [`ExceptionSerializer`] turns that
//! into the `traceback` document, a [`Traceback`] whose `stack` lists
//! [`FrameDescriptor`]s oldest call first and the raising frame last.

use serde::Serialize;

/// Order in which frames were captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameOrder {
    /// Outermost call first, raising frame last.
    #[default]
    OldestFirst,
    /// Raising frame first, as most unwinders report them.
    InnermostFirst,
}

/// A stack frame as captured when the error was created. Any piece may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
    pub file: Option<String>,
    pub function: Option<String>,
    pub line: Option<u32>,
    pub source_line: Option<String>,
}

impl RawFrame {
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            function: Some(function.into()),
            line: Some(line),
            source_line: None,
        }
    }

    pub fn with_source_line(mut self, text: impl Into<String>) -> Self {
        self.source_line = Some(text.into());
        self
    }
}

/// Exception attached to an event that was logged while handling an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub type_name: String,
    pub message: String,
    pub frames: Vec<RawFrame>,
    pub order: FrameOrder,
}

impl ExceptionInfo {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            frames: Vec::new(),
            order: FrameOrder::OldestFirst,
        }
    }

    /// Build from a typed error; the type name is the last path segment of
    /// `E`, e.g. `ParseIntError`.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + 'static,
    {
        Self::new(short_type_name(std::any::type_name::<E>()), err.to_string())
    }

    /// Build from a type-erased error. Without the concrete type, the name is
    /// taken from the leading identifier of its `Debug` form, which for
    /// derived impls is the type or variant name.
    pub fn from_dyn_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let debug = format!("{err:?}");
        let ident: String = debug
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
            .collect();
        let type_name = if ident.is_empty() { "Error" } else { short_type_name(&ident) };
        Self::new(type_name, err.to_string())
    }

    pub fn with_frames(mut self, frames: Vec<RawFrame>, order: FrameOrder) -> Self {
        self.frames = frames;
        self.order = order;
        self
    }

    pub fn push_frame(mut self, frame: RawFrame) -> Self {
        self.frames.push(frame);
        self
    }
}

fn short_type_name(full: &str) -> &str {
    // Strip generics before splitting on paths: `a::B<c::D>` -> `B`.
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").find(|seg| !seg.is_empty()).unwrap_or(base)
}

/// One entry of a serialized stack. Missing pieces are omitted rather than
/// emitted as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl From<&RawFrame> for FrameDescriptor {
    fn from(frame: &RawFrame) -> Self {
        FrameDescriptor {
            file: frame.file.clone(),
            func: frame.function.clone(),
            line: frame.line.map(|l| l.to_string()),
            text: frame
                .source_line
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_owned),
        }
    }
}

/// The `traceback` document of a formatted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Traceback {
    #[serde(rename = "type")]
    pub type_name: String,
    pub message: String,
    pub stack: Vec<FrameDescriptor>,
}

/// Converts [`ExceptionInfo`] into a [`Traceback`].
///
/// Stacks are emitted in full unless `max_frames` is set, in which case the
/// innermost `max_frames` frames are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExceptionSerializer {
    pub max_frames: Option<usize>,
}

impl ExceptionSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frames(max_frames: usize) -> Self {
        Self { max_frames: Some(max_frames) }
    }

    pub fn serialize(&self, exc: &ExceptionInfo) -> Traceback {
        let mut stack: Vec<FrameDescriptor> = exc.frames.iter().map(FrameDescriptor::from).collect();
        if exc.order == FrameOrder::InnermostFirst {
            stack.reverse();
        }
        if let Some(max) = self.max_frames {
            let skip = stack.len().saturating_sub(max);
            stack.drain(..skip);
        }
        Traceback {
            type_name: exc.type_name.clone(),
            message: exc.message.clone(),
            stack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames() -> Vec<RawFrame> {
        vec![
            RawFrame::new("main.rs", 10, "main").with_source_line("    run();"),
            RawFrame::new("app.rs", 20, "run").with_source_line("handle()"),
            RawFrame::new("handler.rs", 30, "handle")
                .with_source_line("  return Err(injected());  "),
        ]
    }

    #[test]
    fn keeps_oldest_first_order_and_trims_text() {
        let exc = ExceptionInfo::new("RuntimeError", "injected error").with_frames(frames(), FrameOrder::OldestFirst);
        let tb = ExceptionSerializer::new().serialize(&exc);
        assert_eq!(tb.stack.len(), 3);
        assert_eq!(tb.stack[0].func.as_deref(), Some("main"));
        assert_eq!(tb.stack[0].text.as_deref(), Some("run();"));
        let last = tb.stack.last().unwrap();
        assert_eq!(last.text.as_deref(), Some("return Err(injected());"));
        assert_eq!(last.line.as_deref(), Some("30"));
    }

    #[test]
    fn reverses_innermost_first_input() {
        let mut raw = frames();
        raw.reverse();
        let exc = ExceptionInfo::new("E", "m").with_frames(raw, FrameOrder::InnermostFirst);
        let tb = ExceptionSerializer::new().serialize(&exc);
        let funcs: Vec<_> = tb.stack.iter().filter_map(|f| f.func.as_deref()).collect();
        assert_eq!(funcs, vec!["main", "run", "handle"]);
    }

    #[test]
    fn missing_source_is_omitted_not_empty() {
        let exc = ExceptionInfo::new("E", "m")
            .push_frame(RawFrame::new("lib.rs", 1, "f"))
            .push_frame(RawFrame { line: Some(2), ..RawFrame::default() });
        let tb = ExceptionSerializer::new().serialize(&exc);
        let json = serde_json::to_value(&tb).unwrap();
        assert_eq!(json["stack"][0], serde_json::json!({"file": "lib.rs", "func": "f", "line": "1"}));
        assert_eq!(json["stack"][1], serde_json::json!({"line": "2"}));
        assert_eq!(json["type"], "E");
    }

    #[test]
    fn bound_keeps_innermost_frames() {
        let exc = ExceptionInfo::new("E", "m").with_frames(frames(), FrameOrder::OldestFirst);
        let tb = ExceptionSerializer::with_max_frames(2).serialize(&exc);
        let funcs: Vec<_> = tb.stack.iter().filter_map(|f| f.func.as_deref()).collect();
        assert_eq!(funcs, vec!["run", "handle"]);
    }

    #[test]
    fn type_names_are_shortened() {
        let err = "x".parse::<u32>().unwrap_err();
        let exc = ExceptionInfo::from_error(&err);
        assert_eq!(exc.type_name, "ParseIntError");
        assert_eq!(exc.message, err.to_string());

        let erased: &(dyn std::error::Error + 'static) = &err;
        assert_eq!(ExceptionInfo::from_dyn_error(erased).type_name, "ParseIntError");
    }
}
