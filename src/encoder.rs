//! JSON encoder shared by a formatter.
//!
//! Holds configuration only: separators, optional indentation and the
//! default converter for values with no native JSON form. Encoding borrows
//! the encoder immutably, so one instance serves concurrent callers;
//! reconfiguring needs `&mut` and therefore happens outside of encoding.

use crate::error::ConfigError;
use crate::value::{AttrValue, Attributes, OpaqueValue};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;
use std::io;
use std::sync::Arc;

/// Upper bound on `indent`, in spaces.
pub const MAX_INDENT: usize = 16;

/// A value the encoder cannot represent natively.
#[derive(Clone, Copy)]
pub enum Unencodable<'a> {
    /// NaN or an infinity.
    NonFinite(f64),
    Opaque(&'a dyn OpaqueValue),
}

impl fmt::Display for Unencodable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unencodable::NonFinite(v) if v.is_nan() => f.write_str("NaN"),
            Unencodable::NonFinite(v) if *v > 0.0 => f.write_str("Infinity"),
            Unencodable::NonFinite(_) => f.write_str("-Infinity"),
            Unencodable::Opaque(v) => fmt::Display::fmt(*v, f),
        }
    }
}

impl fmt::Debug for Unencodable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unencodable::NonFinite(v) => f.debug_tuple("NonFinite").field(v).finish(),
            Unencodable::Opaque(v) => write!(f, "Opaque({})", (**v).type_name()),
        }
    }
}

/// Converter applied to [`Unencodable`] values.
pub type DefaultConverter = Arc<dyn Fn(Unencodable<'_>) -> serde_json::Value + Send + Sync>;

/// Default conversion: the value's display string.
pub fn stringify(value: Unencodable<'_>) -> serde_json::Value {
    serde_json::Value::String(value.to_string())
}

/// Raw encoder settings, validated by [`JsonEncoder::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Pretty-print with this many spaces per level. `None` is single-line.
    pub indent: Option<usize>,
    pub item_separator: String,
    pub key_separator: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            indent: None,
            item_separator: ",".to_string(),
            key_separator: ":".to_string(),
        }
    }
}

/// Configured JSON encoder.
#[derive(Clone)]
pub struct JsonEncoder {
    indent: Option<Vec<u8>>,
    item_separator: String,
    key_separator: String,
    default: DefaultConverter,
}

impl fmt::Debug for JsonEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonEncoder")
            .field("indent", &self.indent())
            .field("item_separator", &self.item_separator)
            .field("key_separator", &self.key_separator)
            .finish_non_exhaustive()
    }
}

impl Default for JsonEncoder {
    fn default() -> Self {
        Self {
            indent: None,
            item_separator: ",".to_string(),
            key_separator: ":".to_string(),
            default: Arc::new(stringify),
        }
    }
}

impl JsonEncoder {
    /// Build an encoder, rejecting separators that would produce invalid
    /// JSON.
    pub fn new(config: EncoderConfig) -> Result<Self, ConfigError> {
        let mut encoder = JsonEncoder::default();
        encoder.set_indent(config.indent)?;
        encoder.set_separators(config.item_separator, config.key_separator)?;
        Ok(encoder)
    }

    /// Replace the default converter.
    pub fn with_default<F>(mut self, default: F) -> Self
    where
        F: Fn(Unencodable<'_>) -> serde_json::Value + Send + Sync + 'static,
    {
        self.set_default(default);
        self
    }

    pub fn set_default<F>(&mut self, default: F)
    where
        F: Fn(Unencodable<'_>) -> serde_json::Value + Send + Sync + 'static,
    {
        self.default = Arc::new(default);
    }

    pub fn set_indent(&mut self, indent: Option<usize>) -> Result<(), ConfigError> {
        match indent {
            Some(n) if n > MAX_INDENT => Err(ConfigError::IndentTooLarge(n)),
            _ => {
                self.indent = indent.map(|n| vec![b' '; n]);
                Ok(())
            }
        }
    }

    pub fn set_separators(
        &mut self,
        item_separator: impl Into<String>,
        key_separator: impl Into<String>,
    ) -> Result<(), ConfigError> {
        let item = item_separator.into();
        let key = key_separator.into();
        if !is_separator(&item, ',') {
            return Err(ConfigError::InvalidItemSeparator(item));
        }
        if !is_separator(&key, ':') {
            return Err(ConfigError::InvalidKeySeparator(key));
        }
        self.item_separator = item;
        self.key_separator = key;
        Ok(())
    }

    pub fn indent(&self) -> Option<usize> {
        self.indent.as_ref().map(Vec::len)
    }

    pub fn item_separator(&self) -> &str {
        &self.item_separator
    }

    pub fn key_separator(&self) -> &str {
        &self.key_separator
    }

    /// Apply the default converter.
    pub fn convert(&self, value: Unencodable<'_>) -> serde_json::Value {
        (self.default)(value)
    }

    /// Encode `value` into `writer` with this encoder's layout.
    pub fn encode_into<W, T>(&self, writer: W, value: &T) -> serde_json::Result<()>
    where
        W: io::Write,
        T: Serialize + ?Sized,
    {
        let formatter = LayoutFormatter::new(self);
        let mut ser = serde_json::Serializer::with_formatter(writer, formatter);
        value.serialize(&mut ser)
    }

    /// Encode `value` to a string.
    pub fn encode<T>(&self, value: &T) -> Result<String, crate::error::FormatError>
    where
        T: Serialize + ?Sized,
    {
        let mut buf = Vec::with_capacity(512);
        self.encode_into(&mut buf, value)?;
        Ok(String::from_utf8(buf)?)
    }

    /// Serializable view of an attribute value that routes unencodable
    /// pieces through the default converter.
    pub fn value<'a>(&'a self, value: &'a AttrValue) -> Encoded<'a> {
        Encoded { value, encoder: self }
    }

    pub fn attributes<'a>(&'a self, attrs: &'a Attributes) -> EncodedMap<'a> {
        EncodedMap { attrs, encoder: self }
    }
}

fn is_separator(sep: &str, punct: char) -> bool {
    let trimmed = sep.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r'));
    trimmed.len() == 1 && trimmed.starts_with(punct)
}

/// See [`JsonEncoder::value`].
pub struct Encoded<'a> {
    value: &'a AttrValue,
    encoder: &'a JsonEncoder,
}

impl Serialize for Encoded<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            AttrValue::Null => serializer.serialize_unit(),
            AttrValue::Bool(v) => serializer.serialize_bool(*v),
            AttrValue::Int(v) => serializer.serialize_i64(*v),
            AttrValue::UInt(v) => serializer.serialize_u64(*v),
            AttrValue::Float(v) if v.is_finite() => serializer.serialize_f64(*v),
            AttrValue::Float(v) => self.encoder.convert(Unencodable::NonFinite(*v)).serialize(serializer),
            AttrValue::Str(v) => serializer.serialize_str(v),
            AttrValue::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&self.encoder.value(item))?;
                }
                seq.end()
            }
            AttrValue::Map(attrs) => self.encoder.attributes(attrs).serialize(serializer),
            AttrValue::Opaque(v) => self.encoder.convert(Unencodable::Opaque(&**v)).serialize(serializer),
        }
    }
}

/// See [`JsonEncoder::attributes`].
pub struct EncodedMap<'a> {
    attrs: &'a Attributes,
    encoder: &'a JsonEncoder,
}

impl Serialize for EncodedMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.attrs.len()))?;
        for (key, value) in self.attrs.iter() {
            map.serialize_entry(key, &self.encoder.value(value))?;
        }
        map.end()
    }
}

/// `serde_json` formatter applying the encoder's separators and indent.
struct LayoutFormatter<'a> {
    indent: Option<&'a [u8]>,
    item_separator: &'a [u8],
    key_separator: &'a [u8],
    depth: usize,
    has_value: bool,
}

impl<'a> LayoutFormatter<'a> {
    fn new(encoder: &'a JsonEncoder) -> Self {
        Self {
            indent: encoder.indent.as_deref(),
            item_separator: encoder.item_separator.as_bytes(),
            key_separator: encoder.key_separator.as_bytes(),
            depth: 0,
            has_value: false,
        }
    }

    fn newline<W: ?Sized + io::Write>(&self, writer: &mut W) -> io::Result<()> {
        if let Some(indent) = self.indent {
            writer.write_all(b"\n")?;
            for _ in 0..self.depth {
                writer.write_all(indent)?;
            }
        }
        Ok(())
    }

    fn open<W: ?Sized + io::Write>(&mut self, writer: &mut W, bracket: &[u8]) -> io::Result<()> {
        self.depth += 1;
        self.has_value = false;
        writer.write_all(bracket)
    }

    fn close<W: ?Sized + io::Write>(&mut self, writer: &mut W, bracket: &[u8]) -> io::Result<()> {
        self.depth -= 1;
        if self.has_value {
            self.newline(writer)?;
        }
        writer.write_all(bracket)
    }

    fn item<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if !first {
            writer.write_all(self.item_separator)?;
        }
        self.newline(writer)
    }
}

impl serde_json::ser::Formatter for LayoutFormatter<'_> {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.open(writer, b"[")
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.close(writer, b"]")
    }

    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.item(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.open(writer, b"{")
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.close(writer, b"}")
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.item(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.key_separator)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }
}
