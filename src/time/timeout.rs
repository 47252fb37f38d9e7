//! One-shot timeout callbacks.
//!
//! A [`Timeout`] runs a callback once, through a dispatch context, after a delay,
//! unless it is cancelled or dropped first.
//!
//! # Example
//!
//! ```ignore
//! let mut timeout = Timeout::start(Duration::from_secs(5), || println!("gave up"))?;
//! // the reply arrived in time
//! timeout.cancel();
//! ```

use crate::dispatch::registry::{current_verified, verify};
use crate::dispatch::{Capabilities, DispatchContext};
use crate::error::Result;
use crate::time::driver::{Countdown, schedule};
use crate::token::InvalidationToken;

use std::sync::Arc;
use std::time::Duration;

const REQUIRED: Capabilities = Capabilities::ASYNC_NON_REENTRANT;

/// A pending one-shot callback. Dropping it cancels the callback.
#[derive(Debug)]
pub struct Timeout {
    token: InvalidationToken,
    countdown: Option<Countdown>,
}

impl Timeout {
    /// Schedules `callback` on the calling thread's current dispatch context, or on
    /// [`DefaultContext`] when the thread has none.
    pub fn start<F>(duration: Duration, callback: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let context = current_verified(REQUIRED)?;
        Self::with_context(duration, context, callback)
    }

    /// Schedules `callback` to run through `context` after `duration`.
    pub fn with_context<F>(
        duration: Duration,
        context: Arc<dyn DispatchContext>,
        callback: F,
    ) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        verify(context.identity(), REQUIRED)?;

        let token = InvalidationToken::new();
        let expiry = token.bind_post(callback, context);
        let countdown = schedule(duration, expiry);

        Ok(Self {
            token,
            countdown: Some(countdown),
        })
    }

    /// Prevents the callback from running, even if its delay already elapsed and it
    /// is waiting in the dispatch context's queue.
    pub fn cancel(&mut self) {
        self.token.reset();
        self.countdown = None;
    }
}
