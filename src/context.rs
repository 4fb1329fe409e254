//! Context injection.
//!
//! A [`ContextFilter`] makes sure a set of keys is present in every event's
//! extra attributes. Values come from a pluggable [`ContextSource`] and fall
//! back to per-key defaults. The filter never suppresses or fails an event:
//! a source that errors or panics counts as an empty context.
//!
//! Precedence on a key collision, highest first:
//!
//! 1. standard record fields (reserved names are never written);
//! 2. attributes the event already carries;
//! 3. the resolved context and the defaults, ordered by [`Precedence`].

use crate::error::{ConfigError, ContextError};
use crate::record::{is_reserved, LogEvent};
use crate::value::{AttrValue, Attributes};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

/// Produces context values for an event.
///
/// Implementations may be called concurrently for unrelated events and must
/// keep any per-request state outside of `&self` (thread-local, task-local,
/// or in the event itself).
pub trait ContextSource: Send + Sync {
    fn resolve(&self, event: &LogEvent) -> Result<Attributes, ContextError>;
}

/// Fixed context, the same for every event.
impl ContextSource for Attributes {
    fn resolve(&self, _event: &LogEvent) -> Result<Attributes, ContextError> {
        Ok(self.clone())
    }
}

/// Source backed by a closure. See [`from_fn`].
pub struct FnSource<F>(F);

impl<F> ContextSource for FnSource<F>
where
    F: Fn(&LogEvent) -> Result<Attributes, ContextError> + Send + Sync,
{
    fn resolve(&self, event: &LogEvent) -> Result<Attributes, ContextError> {
        (self.0)(event)
    }
}

/// Wrap a closure as a [`ContextSource`].
pub fn from_fn<F>(f: F) -> FnSource<F>
where
    F: Fn(&LogEvent) -> Result<Attributes, ContextError> + Send + Sync,
{
    FnSource(f)
}

/// Which value wins when both the source and the defaults supply a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precedence {
    #[default]
    SourceOverDefaults,
    DefaultsOverSource,
}

/// Adds context attributes to events.
pub struct ContextFilter {
    source: Option<Box<dyn ContextSource>>,
    defaults: Attributes,
    precedence: Precedence,
    /// Events processed.
    pub applied: AtomicU64,
    /// Resolutions that failed or panicked and were treated as empty.
    pub resolution_failures: AtomicU64,
}

impl fmt::Debug for ContextFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextFilter")
            .field("has_source", &self.source.is_some())
            .field("defaults", &self.defaults)
            .field("precedence", &self.precedence)
            .finish()
    }
}

impl ContextFilter {
    pub fn builder() -> ContextFilterBuilder {
        ContextFilterBuilder::default()
    }

    /// Filter that only guarantees `defaults` are present.
    pub fn with_defaults(defaults: Attributes) -> Result<Self, ConfigError> {
        Self::builder().defaults(defaults).build()
    }

    pub fn defaults(&self) -> &Attributes {
        &self.defaults
    }

    pub fn precedence(&self) -> Precedence {
        self.precedence
    }

    /// Replace the defaults.
    pub fn set_defaults(&mut self, defaults: Attributes) -> Result<(), ConfigError> {
        validate_keys(&defaults)?;
        self.defaults = defaults;
        Ok(())
    }

    pub fn set_source(&mut self, source: impl ContextSource + 'static) {
        self.source = Some(Box::new(source));
    }

    pub fn set_precedence(&mut self, precedence: Precedence) {
        self.precedence = precedence;
    }

    /// Annotate `event` with context. Always returns `true`: the event is
    /// never suppressed.
    pub fn apply(&self, event: &mut LogEvent) -> bool {
        self.applied.fetch_add(1, Ordering::Relaxed);
        let context = self.merged(event);
        for (key, value) in context {
            if is_reserved(&key) {
                continue;
            }
            event.extra.insert_if_absent(&key, || value);
        }
        true
    }

    /// Context that [`apply`](Self::apply) would write for `event`, before
    /// reserved and already-present keys are skipped.
    pub fn merged(&self, event: &LogEvent) -> Attributes {
        let mut context = self.resolve(event);
        match self.precedence {
            Precedence::SourceOverDefaults => {
                for (key, value) in self.defaults.iter() {
                    context.insert_if_absent(key, || value.clone());
                }
            }
            Precedence::DefaultsOverSource => {
                for (key, value) in self.defaults.iter() {
                    context.insert(key, value.clone());
                }
            }
        }
        context
    }

    fn resolve(&self, event: &LogEvent) -> Attributes {
        let Some(source) = &self.source else {
            return Attributes::new();
        };
        match catch_unwind(AssertUnwindSafe(|| source.resolve(event))) {
            Ok(Ok(context)) => context,
            Ok(Err(_)) | Err(_) => {
                self.resolution_failures.fetch_add(1, Ordering::Relaxed);
                Attributes::new()
            }
        }
    }
}

fn validate_keys(attrs: &Attributes) -> Result<(), ConfigError> {
    for key in attrs.keys() {
        if key.is_empty() {
            return Err(ConfigError::EmptyKey);
        }
        if is_reserved(key) {
            return Err(ConfigError::ReservedKey(key.to_string()));
        }
    }
    Ok(())
}

/// Builder for [`ContextFilter`].
#[derive(Default)]
pub struct ContextFilterBuilder {
    source: Option<Box<dyn ContextSource>>,
    defaults: Attributes,
    precedence: Precedence,
}

impl ContextFilterBuilder {
    pub fn source(mut self, source: impl ContextSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn default_value(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.defaults.insert(key, value);
        self
    }

    pub fn defaults(mut self, defaults: Attributes) -> Self {
        self.defaults.extend(defaults);
        self
    }

    /// Ensure `key` is always present, `null` unless something supplies it.
    pub fn property(self, key: impl Into<String>) -> Self {
        self.default_value(key, AttrValue::Null)
    }

    pub fn precedence(mut self, precedence: Precedence) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn build(self) -> Result<ContextFilter, ConfigError> {
        validate_keys(&self.defaults)?;
        Ok(ContextFilter {
            source: self.source,
            defaults: self.defaults,
            precedence: self.precedence,
            applied: AtomicU64::new(0),
            resolution_failures: AtomicU64::new(0),
        })
    }
}
