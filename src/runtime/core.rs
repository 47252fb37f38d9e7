//! Dispatcher that pumps an action queue on exactly one thread.
//!
//! The dispatcher owns its queue. Any thread may enqueue; one thread at a time runs
//! the pump, executing actions in the order they were enqueued until it reaches an
//! exit entry.

use crate::dispatch::{DispatchContext, DispatcherContext};
use crate::error::{Error, Result};
use crate::runtime::context::{current_dispatcher, enter_action};
use crate::runtime::queue::{Action, ActionQueue};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

struct Shared {
    queue: ActionQueue,
    running: AtomicBool,
}

/// Handle to a dispatcher.
///
/// Clones refer to the same queue; two handles compare equal when they refer to the
/// same dispatcher.
///
/// # Example
/// ```ignore
/// let dispatcher = Dispatcher::new();
/// dispatcher.enqueue(|| println!("first"));
/// dispatcher.enqueue_exit();
/// dispatcher.run()?;
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Creates a dispatcher with an empty queue.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: ActionQueue::new(),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Queues `action` for execution on the pump thread.
    ///
    /// Callable from any thread at any time, including before [`run`](Self::run)
    /// starts. Actions must not panic: a panic escaping an action aborts the pump.
    ///
    /// # Arguments
    /// * `action` - The closure to run on the pump thread
    pub fn enqueue<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.queue.push(Action::Run(Box::new(action)));
    }

    /// Queues an exit entry; the pump returns once it reaches it.
    pub fn enqueue_exit(&self) {
        self.shared.queue.push(Action::Exit);
    }

    /// Runs the pump on the calling thread until an exit entry is dequeued.
    ///
    /// While an action executes, [`Dispatcher::current`] on this thread returns this
    /// dispatcher and the thread's current dispatch context is this dispatcher's
    /// [`DispatcherContext`].
    ///
    /// # Errors
    /// Returns [`Error::AlreadyRunning`] if another pump is active on this dispatcher.
    ///
    /// # Panics
    /// A panic escaping an action is not caught; it unwinds out of `run`.
    pub fn run(&self) -> Result<()> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyRunning);
        }

        struct Stopped<'a>(&'a AtomicBool);

        impl Drop for Stopped<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::Release);
            }
        }

        let _stopped = Stopped(&self.shared.running);
        let context: Arc<dyn DispatchContext> = self.context();

        debug!(dispatcher = ?self, "pump started");

        loop {
            match self.shared.queue.pop_wait() {
                Action::Run(action) => enter_action(self.clone(), context.clone(), action),
                Action::Exit => break,
            }
        }

        debug!(dispatcher = ?self, "pump exited");
        Ok(())
    }

    /// Returns the dispatcher executing an action on the calling thread.
    ///
    /// # Returns
    /// Some(dispatcher) inside an action, None anywhere else
    pub fn current() -> Option<Dispatcher> {
        current_dispatcher()
    }

    /// Returns a dispatch context that enqueues onto this dispatcher.
    pub fn context(&self) -> Arc<DispatcherContext> {
        Arc::new(DispatcherContext::new(self.clone()))
    }

    /// Checks if a pump is currently running on this dispatcher.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Checks if no action is waiting in the queue.
    pub fn is_idle(&self) -> bool {
        self.shared.queue.is_empty()
    }

    /// Checks if the calling thread is executing an action of this dispatcher.
    pub(crate) fn is_current(&self) -> bool {
        current_dispatcher().is_some_and(|current| current == *self)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Dispatcher {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Dispatcher {}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dispatcher")
            .field(&Arc::as_ptr(&self.shared))
            .finish()
    }
}
