//! Generation-based callback invalidation.
//!
//! An [`InvalidationToken`] hands out bound callbacks that remember the generation
//! current when they were bound. When a bound callback finally executes, it compares
//! that generation with the token's generation *at that moment* and does nothing on a
//! mismatch. [`reset`](InvalidationToken::reset) moves the token to a new generation,
//! so everything bound earlier becomes a no-op, wherever and whenever it runs.
//!
//! When a callback is bound together with a [`DispatchContext`], the check happens on
//! the far side of the context, after the thread hop. A reset that races a callback
//! already posted to the owning thread still suppresses it.
//!
//! The token is not synchronized for concurrent binding or resetting: bind and reset
//! from the owning thread only.
//!
//! # Example
//!
//! ```ignore
//! let mut token = InvalidationToken::new();
//! let stale = token.bind(|| println!("never printed"));
//! token.reset();
//! stale();
//! ```

use crate::dispatch::DispatchContext;
use crate::error::Result;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Generation counter that turns stale bound callbacks into no-ops.
#[derive(Debug)]
pub struct InvalidationToken {
    generation: Arc<AtomicU64>,
}

/// Generation captured by a bound callback.
struct Bound {
    current: Arc<AtomicU64>,
    at_bind: u64,
}

impl Bound {
    fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.at_bind
    }
}

impl InvalidationToken {
    pub fn new() -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn capture(&self) -> Bound {
        Bound {
            current: self.generation.clone(),
            at_bind: self.generation.load(Ordering::Acquire),
        }
    }

    /// Wraps `callback` so it only runs if the token has not been reset since binding.
    pub fn bind<F>(&self, callback: F) -> impl FnOnce() + Send + 'static
    where
        F: FnOnce() + Send + 'static,
    {
        let bound = self.capture();
        move || {
            if bound.is_current() {
                callback();
            } else {
                trace!("dropping invalidated callback");
            }
        }
    }

    /// Like [`bind`](Self::bind), for callbacks taking one argument.
    pub fn bind_with<A, F>(&self, callback: F) -> impl FnOnce(A) + Send + 'static
    where
        F: FnOnce(A) + Send + 'static,
    {
        let bound = self.capture();
        move |argument| {
            if bound.is_current() {
                callback(argument);
            } else {
                trace!("dropping invalidated callback");
            }
        }
    }

    /// Wraps `callback` so that invoking the result posts it to `context`, where the
    /// generation is checked before running it.
    pub fn bind_post<F>(
        &self,
        callback: F,
        context: Arc<dyn DispatchContext>,
    ) -> impl FnOnce() + Send + 'static
    where
        F: FnOnce() + Send + 'static,
    {
        let callback = self.bind(callback);
        move || context.post(Box::new(callback))
    }

    /// Like [`bind_post`](Self::bind_post), for callbacks taking one argument.
    pub fn bind_post_with<A, F>(
        &self,
        callback: F,
        context: Arc<dyn DispatchContext>,
    ) -> impl FnOnce(A) + Send + 'static
    where
        A: Send + 'static,
        F: FnOnce(A) + Send + 'static,
    {
        let callback = self.bind_with(callback);
        move |argument| context.post(Box::new(move || callback(argument)))
    }

    /// Wraps `callback` so that invoking the result sends it to `context` and blocks
    /// until the context has run (or skipped) it.
    pub fn bind_send<F>(
        &self,
        callback: F,
        context: Arc<dyn DispatchContext>,
    ) -> impl FnOnce() -> Result<()> + Send + 'static
    where
        F: FnOnce() + Send + 'static,
    {
        let callback = self.bind(callback);
        move || context.send(Box::new(callback))
    }

    /// Moves to a new generation, invalidating every callback bound so far.
    pub fn reset(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Same as [`reset`](Self::reset).
    pub fn dispose(&mut self) {
        self.reset();
    }
}

impl Default for InvalidationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InvalidationToken {
    fn drop(&mut self) {
        self.reset();
    }
}
