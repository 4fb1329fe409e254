//! Values carried in a record's extra attributes.
//!
//! [`AttrValue`] is a closed set of JSON-shaped variants plus an
//! [`AttrValue::Opaque`] escape hatch for arbitrary native values. Opaque
//! values (and non-finite floats) cannot be encoded natively; the encoder
//! routes them through its default converter instead.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A native value with no JSON representation of its own.
///
/// Blanket-implemented for every `Display + Send + Sync + 'static` type, so
/// any such value can be attached with [`AttrValue::opaque`]. Converters can
/// recover the concrete type through `downcast_ref`. Since `Arc<dyn
/// OpaqueValue>` is itself `Display`, call trait methods on the dereferenced
/// value (`(**arc).type_name()`), not on the `Arc`.
pub trait OpaqueValue: fmt::Display + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;

    fn type_name(&self) -> &'static str;
}

impl dyn OpaqueValue {
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl<T> OpaqueValue for T
where
    T: fmt::Display + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Value stored in [`Attributes`].
#[derive(Clone)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Seq(Vec<AttrValue>),
    Map(Attributes),
    Opaque(Arc<dyn OpaqueValue>),
}

impl AttrValue {
    /// Wrap a value that has no native encoding.
    pub fn opaque<T>(value: T) -> Self
    where
        T: fmt::Display + Send + Sync + 'static,
    {
        AttrValue::Opaque(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Debug for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => f.write_str("Null"),
            AttrValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            AttrValue::Int(v) => f.debug_tuple("Int").field(v).finish(),
            AttrValue::UInt(v) => f.debug_tuple("UInt").field(v).finish(),
            AttrValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
            AttrValue::Str(v) => f.debug_tuple("Str").field(v).finish(),
            AttrValue::Seq(v) => f.debug_tuple("Seq").field(v).finish(),
            AttrValue::Map(v) => f.debug_tuple("Map").field(v).finish(),
            AttrValue::Opaque(v) => write!(f, "Opaque({}: {})", (**v).type_name(), v),
        }
    }
}

// Opaque values compare by their display form.
impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttrValue::Null, AttrValue::Null) => true,
            (AttrValue::Bool(a), AttrValue::Bool(b)) => a == b,
            (AttrValue::Int(a), AttrValue::Int(b)) => a == b,
            (AttrValue::UInt(a), AttrValue::UInt(b)) => a == b,
            (AttrValue::Float(a), AttrValue::Float(b)) => a == b,
            (AttrValue::Str(a), AttrValue::Str(b)) => a == b,
            (AttrValue::Seq(a), AttrValue::Seq(b)) => a == b,
            (AttrValue::Map(a), AttrValue::Map(b)) => a == b,
            (AttrValue::Opaque(a), AttrValue::Opaque(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

macro_rules! from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for AttrValue {
            fn from(value: $t) -> Self {
                AttrValue::Int(i64::from(value))
            }
        })*
    };
}

macro_rules! from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for AttrValue {
            fn from(value: $t) -> Self {
                AttrValue::UInt(u64::from(value))
            }
        })*
    };
}

from_signed!(i8, i16, i32, i64);
from_unsigned!(u8, u16, u32, u64);

impl From<usize> for AttrValue {
    fn from(value: usize) -> Self {
        AttrValue::UInt(value as u64)
    }
}

impl From<f32> for AttrValue {
    fn from(value: f32) -> Self {
        AttrValue::Float(f64::from(value))
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(AttrValue::Null, Into::into)
    }
}

impl<T: Into<AttrValue>> From<Vec<T>> for AttrValue {
    fn from(value: Vec<T>) -> Self {
        AttrValue::Seq(value.into_iter().map(Into::into).collect())
    }
}

impl From<Attributes> for AttrValue {
    fn from(value: Attributes) -> Self {
        AttrValue::Map(value)
    }
}

impl From<serde_json::Value> for AttrValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => AttrValue::Null,
            Value::Bool(b) => AttrValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    AttrValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    AttrValue::UInt(u)
                } else {
                    AttrValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => AttrValue::Str(s),
            Value::Array(items) => AttrValue::Seq(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => AttrValue::Map(map.into_iter().collect()),
        }
    }
}

/// Insertion-ordered string-keyed map of [`AttrValue`]s.
///
/// Inserting an existing key replaces the value in place and keeps the
/// original position, so encoding order only depends on first insertion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attributes {
    entries: Vec<(String, AttrValue)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Option<AttrValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Insert `key` only when it is absent. Returns `true` if inserted.
    pub fn insert_if_absent(&mut self, key: &str, value: impl FnOnce() -> AttrValue) -> bool {
        if self.contains_key(key) {
            return false;
        }
        self.entries.push((key.to_owned(), value()));
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<AttrValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}

impl<K, V> Extend<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<AttrValue>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl IntoIterator for Attributes {
    type Item = (String, AttrValue);
    type IntoIter = std::vec::IntoIter<(String, AttrValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_first_position() {
        let mut attrs = Attributes::new().with("a", 1).with("b", 2);
        let prev = attrs.insert("a", 3);
        assert_eq!(prev, Some(AttrValue::Int(1)));
        let keys: Vec<_> = attrs.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(attrs.get("a"), Some(&AttrValue::Int(3)));
    }

    #[test]
    fn insert_if_absent_does_not_overwrite() {
        let mut attrs = Attributes::new().with("request_id", "abc");
        assert!(!attrs.insert_if_absent("request_id", || AttrValue::from("-")));
        assert!(attrs.insert_if_absent("user", || AttrValue::Null));
        assert_eq!(attrs.get("request_id").and_then(AttrValue::as_str), Some("abc"));
        assert!(attrs.get("user").is_some_and(AttrValue::is_null));
    }

    #[test]
    fn json_values_convert_to_closed_variants() {
        let value: AttrValue = serde_json::json!({"n": 1, "f": 1.5, "list": [true, null]}).into();
        let AttrValue::Map(map) = value else {
            panic!("expected map");
        };
        assert_eq!(map.get("n"), Some(&AttrValue::Int(1)));
        assert_eq!(map.get("f"), Some(&AttrValue::Float(1.5)));
        assert_eq!(
            map.get("list"),
            Some(&AttrValue::Seq(vec![AttrValue::Bool(true), AttrValue::Null]))
        );
    }

    #[test]
    fn opaque_values_expose_concrete_type() {
        struct Port(u16);
        impl fmt::Display for Port {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "port {}", self.0)
            }
        }

        let AttrValue::Opaque(inner) = AttrValue::opaque(Port(8080)) else {
            panic!("expected opaque");
        };
        assert_eq!(inner.to_string(), "port 8080");
        assert_eq!(inner.downcast_ref::<Port>().map(|p| p.0), Some(8080));
    }
}
