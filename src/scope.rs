//! Thread-scoped context.
//!
//! `LogContext::new().with("request_id", id).enter()` pushes a frame onto the
//! current thread's context stack until the returned guard is dropped.
//! [`ThreadContext`] is the [`ContextSource`] that reads it, so a single
//! shared [`ContextFilter`](crate::context::ContextFilter) sees each
//! thread's own values and nothing leaks between concurrent requests.

use crate::context::ContextSource;
use crate::error::ContextError;
use crate::record::LogEvent;
use crate::value::{AttrValue, Attributes};
use std::cell::RefCell;
use std::marker::PhantomData;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Attributes>> = const { RefCell::new(Vec::new()) };
}

/// A frame of context values waiting to be entered.
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    properties: Attributes,
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.properties.insert(key, value);
        self
    }

    /// Push this frame for the current thread.
    #[must_use = "the context is popped when the guard is dropped"]
    pub fn enter(self) -> LogContextGuard {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(self.properties));
        LogContextGuard { _not_send: PhantomData }
    }

    /// Add a property to the innermost entered frame, if any.
    pub fn add_property(key: impl Into<String>, value: impl Into<AttrValue>) -> bool {
        CONTEXT_STACK.with(|stack| match stack.borrow_mut().last_mut() {
            Some(frame) => {
                frame.insert(key, value);
                true
            }
            None => false,
        })
    }

    /// Values visible on this thread, inner frames overriding outer ones.
    pub fn current() -> Attributes {
        CONTEXT_STACK.with(|stack| merge_frames(&stack.borrow()))
    }
}

fn merge_frames(frames: &[Attributes]) -> Attributes {
    let mut merged = Attributes::new();
    for frame in frames {
        for (key, value) in frame.iter() {
            merged.insert(key, value.clone());
        }
    }
    merged
}

/// Pops its frame on drop. Not `Send`: the frame belongs to the thread that
/// entered it.
pub struct LogContextGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for LogContextGuard {
    fn drop(&mut self) {
        // try_with: the thread-local may already be gone during thread exit.
        let _ = CONTEXT_STACK.try_with(|stack| stack.borrow_mut().pop());
    }
}

/// [`ContextSource`] reading the calling thread's context stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadContext;

impl ContextSource for ThreadContext {
    fn resolve(&self, _event: &LogEvent) -> Result<Attributes, ContextError> {
        CONTEXT_STACK
            .try_with(|stack| merge_frames(&stack.borrow()))
            .map_err(|_| ContextError::Unavailable)
    }
}
