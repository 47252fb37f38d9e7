//! Built-in dispatch context implementations.

use crate::dispatch::{Callback, ContextIdentity, DispatchContext};
use crate::error::{Error, Result, panic_message};
use crate::runtime::core::Dispatcher;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use tracing::warn;

/// Dispatch context that enqueues onto a [`Dispatcher`].
///
/// Registered with [`Capabilities::STANDARD`](super::Capabilities::STANDARD): callbacks
/// run one at a time, in order, on the dispatcher's pump thread.
#[derive(Clone, Debug)]
pub struct DispatcherContext {
    dispatcher: Dispatcher,
}

impl DispatcherContext {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl DispatchContext for DispatcherContext {
    fn post(&self, callback: Callback) {
        self.dispatcher.enqueue(callback);
    }

    fn send(&self, callback: Callback) -> Result<()> {
        invoke_blocking(&self.dispatcher, callback)
    }

    fn create_copy(&self) -> Arc<dyn DispatchContext> {
        Arc::new(self.clone())
    }

    fn identity(&self) -> ContextIdentity {
        ContextIdentity::of::<Self>()
    }
}

/// Dispatch context with no thread affinity.
///
/// `post` runs the callback on a fresh thread; `send` runs it inline on the caller.
/// Only the async-non-reentrant guarantee is registered for it.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultContext;

impl DispatchContext for DefaultContext {
    fn post(&self, callback: Callback) {
        let spawned = thread::Builder::new()
            .name("affinity-default".to_string())
            .spawn(callback);

        if let Err(err) = spawned {
            warn!(%err, "failed to spawn thread for posted callback");
        }
    }

    fn send(&self, callback: Callback) -> Result<()> {
        panic::catch_unwind(AssertUnwindSafe(callback))
            .map_err(|payload| Error::CallbackPanicked(panic_message(&*payload)))
    }

    fn create_copy(&self) -> Arc<dyn DispatchContext> {
        Arc::new(*self)
    }

    fn identity(&self) -> ContextIdentity {
        ContextIdentity::of::<Self>()
    }
}

/// Enqueues `function` on `dispatcher` and blocks until it has run, returning its value.
///
/// A panic inside `function` is caught on the pump thread and returned to the caller.
pub(crate) fn invoke_blocking<F, R>(dispatcher: &Dispatcher, function: F) -> Result<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if dispatcher.is_current() {
        return Err(Error::WouldDeadlock);
    }

    let (done, completion) = mpsc::sync_channel(1);
    dispatcher.enqueue(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(function));
        let _ = done.send(outcome);
    });

    match completion.recv() {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(payload)) => Err(Error::CallbackPanicked(panic_message(&*payload))),
        Err(_) => Err(Error::Disconnected),
    }
}
