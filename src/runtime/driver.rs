//! Dedicated worker thread that pumps a dispatcher.
//!
//! A [`DispatcherThread`] owns a [`Dispatcher`] and, once started, runs its pump on a
//! thread of its own. Other threads hand it work with [`do_async`](DispatcherThread::do_async)
//! or [`do_sync`](DispatcherThread::do_sync), or through its
//! [`context`](DispatcherThread::context).

use crate::dispatch::DispatchContext;
use crate::dispatch::contexts::invoke_blocking;
use crate::error::{Error, Result, panic_message};
use crate::runtime::core::Dispatcher;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// A thread dedicated to pumping one dispatcher.
///
/// Usually created through [`DispatcherThreadBuilder`](crate::DispatcherThreadBuilder).
///
/// # Example
/// ```ignore
/// let worker = DispatcherThreadBuilder::new().name("io").build();
/// worker.start()?;
/// let answer = worker.do_sync(|| 21 * 2)?;
/// worker.join()?;
/// ```
pub struct DispatcherThread {
    dispatcher: Dispatcher,
    name: Mutex<Option<String>>,
    stack_size: Option<usize>,
    started: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DispatcherThread {
    pub(crate) fn with_config(name: Option<String>, stack_size: Option<usize>) -> Self {
        Self {
            dispatcher: Dispatcher::new(),
            name: Mutex::new(name),
            stack_size,
            started: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    /// Creates an unstarted, unnamed thread with the default stack size.
    pub fn new() -> Self {
        Self::with_config(None, None)
    }

    /// Returns the thread name, if one was set.
    pub fn name(&self) -> Option<String> {
        lock(&self.name).clone()
    }

    /// Names the thread.
    ///
    /// # Errors
    /// [`Error::AlreadySet`] if a name was already given, [`Error::AlreadyRunning`]
    /// once the thread has started.
    pub fn set_name(&self, name: impl Into<String>) -> Result<()> {
        if self.started.load(Ordering::Acquire) {
            return Err(Error::AlreadyRunning);
        }

        let mut slot = lock(&self.name);
        if slot.is_some() {
            return Err(Error::AlreadySet("name"));
        }
        *slot = Some(name.into());

        Ok(())
    }

    /// Spawns the thread and starts pumping.
    ///
    /// Work queued before `start` runs first, in order.
    ///
    /// # Errors
    /// [`Error::AlreadyRunning`] when called a second time, [`Error::Io`] if the
    /// operating system refuses to spawn the thread.
    pub fn start(&self) -> Result<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyRunning);
        }

        let mut builder = thread::Builder::new();
        if let Some(name) = self.name() {
            builder = builder.name(name);
        }
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let dispatcher = self.dispatcher.clone();
        let spawned = builder.spawn(move || {
            if let Err(err) = dispatcher.run() {
                warn!(%err, "dispatcher thread could not pump");
            }
        });

        match spawned {
            Ok(handle) => {
                debug!(name = ?self.name(), "dispatcher thread started");
                *lock(&self.handle) = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.started.store(false, Ordering::Release);
                Err(err.into())
            }
        }
    }

    /// Queues an exit after all pending work and waits for the thread to finish.
    ///
    /// # Errors
    /// [`Error::NotStarted`] before `start`, [`Error::WouldDeadlock`] from the thread
    /// itself, [`Error::PumpPanicked`] if an action panicked and aborted the pump.
    pub fn join(&self) -> Result<()> {
        if !self.started.load(Ordering::Acquire) {
            return Err(Error::NotStarted);
        }
        if self.dispatcher.is_current() {
            return Err(Error::WouldDeadlock);
        }

        let Some(handle) = lock(&self.handle).take() else {
            return Ok(());
        };

        self.dispatcher.enqueue_exit();
        let joined = handle.join();
        debug!(name = ?self.name(), "dispatcher thread joined");

        joined.map_err(|payload| Error::PumpPanicked(panic_message(&*payload)))
    }

    /// Queues `action` to run on the thread.
    pub fn do_async<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatcher.enqueue(action);
    }

    /// Runs `function` on the thread and waits for its result.
    ///
    /// # Errors
    /// [`Error::CallbackPanicked`] if `function` panics, [`Error::WouldDeadlock`] when
    /// called from the thread itself.
    pub fn do_sync<F, R>(&self, function: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        invoke_blocking(&self.dispatcher, function)
    }

    /// Returns a dispatch context targeting this thread.
    pub fn context(&self) -> Arc<dyn DispatchContext> {
        self.dispatcher.context()
    }

    /// Returns the dispatcher pumped by this thread.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl Default for DispatcherThread {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DispatcherThread {
    fn drop(&mut self) {
        let Some(handle) = lock(&self.handle).take() else {
            return;
        };

        self.dispatcher.enqueue_exit();
        if !self.dispatcher.is_current() {
            let _ = handle.join();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
