//! Structured JSON log records.
//!
//! A [`LogEvent`] is rendered by a [`JsonFormatter`] as one JSON document
//! with the standard record fields, caller attributes and an optional
//! traceback. [`ContextFilter`] guarantees configured keys on every record,
//! pulling values from a [`ContextSource`] and falling back to defaults.
//! With the `layer` feature, [`JsonLogLayer`] plugs all of this into
//! `tracing`.

pub mod access;
pub mod context;
pub mod encoder;
pub mod env;
pub mod error;
pub mod exception;
pub mod formatter;
pub mod noop_sink;
pub mod record;
pub mod scope;
pub mod sink;
pub mod value;

#[cfg(feature = "layer")]
pub mod init;
#[cfg(feature = "layer")]
pub mod layer;

pub use access::{AccessLog, RequestSummary};
pub use context::{from_fn, ContextFilter, ContextSource, Precedence};
pub use encoder::{EncoderConfig, JsonEncoder, Unencodable};
pub use error::{ConfigError, ContextError, FormatError};
pub use exception::{ExceptionInfo, ExceptionSerializer, FrameOrder, RawFrame};
pub use formatter::{Clock, FormatterConfig, JsonFormatter};
pub use noop_sink::NoopSink;
pub use record::{Level, LogEvent, Message, SourceLocation};
pub use scope::{LogContext, ThreadContext};
pub use sink::{LineSink, MemorySink, WriterSink};
pub use value::{AttrValue, Attributes, OpaqueValue};

#[cfg(feature = "layer")]
pub use error::InitError;
#[cfg(feature = "layer")]
pub use init::{init_tracing, init_tracing_with_config, LayerConfig};
#[cfg(feature = "layer")]
pub use layer::JsonLogLayer;
