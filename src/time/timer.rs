//! Periodic and single-shot timer bound to a dispatch context.
//!
//! A [`Timer`] arms a host [`Countdown`](super::driver::Countdown) whose expiry is
//! bound through an [`InvalidationToken`] and posted to the timer's dispatch context,
//! so the Elapsed handler always runs on the owning thread and never after the timer
//! was cancelled or dropped.
//!
//! While the handler runs, every setter writes a shadow copy of the settings. The
//! handler therefore sees a consistent view, and its changes take effect only once
//! it returns: the countdown is then either released or re-armed for the (possibly
//! new) interval.
//!
//! # Example
//!
//! ```ignore
//! let timer = Timer::new()?;
//! timer.on_elapsed(|timer| {
//!     println!("tick");
//!     timer.cancel();
//! });
//! timer.set_periodic(Duration::from_millis(50));
//! ```

use crate::dispatch::registry::{current_verified, verify};
use crate::dispatch::{Capabilities, DispatchContext};
use crate::error::Result;
use crate::time::driver::{Countdown, schedule};
use crate::token::InvalidationToken;

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::trace;

/// Elapsed handler, called with the timer that fired.
pub type ElapsedHandler = Box<dyn FnMut(&Timer) + Send + 'static>;

const REQUIRED: Capabilities = Capabilities::SERIALIZED_EXECUTION;

const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug)]
struct Settings {
    enabled: bool,
    auto_reset: bool,
    interval: Duration,
}

struct TimerState {
    context: Arc<dyn DispatchContext>,
    settings: Settings,
    // Present only while the Elapsed handler runs.
    shadow: Option<Settings>,
    token: InvalidationToken,
    countdown: Option<Countdown>,
    elapsed: Option<ElapsedHandler>,
    disposed: bool,
}

impl TimerState {
    fn view(&mut self) -> &mut Settings {
        match self.shadow.as_mut() {
            Some(shadow) => shadow,
            None => &mut self.settings,
        }
    }

    fn is_firing(&self) -> bool {
        self.shadow.is_some()
    }

    fn disarm(&mut self) {
        self.token.reset();
        if let Some(countdown) = self.countdown.take() {
            countdown.cancel();
        }
    }

    fn arm(&mut self, weak: Weak<Mutex<TimerState>>) {
        self.disarm();
        if self.disposed || !self.settings.enabled {
            return;
        }

        let expiry = self
            .token
            .bind_post(move || Timer::fire(weak), self.context.clone());
        self.countdown = Some(schedule(self.settings.interval, expiry));
    }
}

/// A timer whose Elapsed handler runs through a dispatch context.
///
/// Clones share the same timer. The timer is disposed when the last clone is dropped
/// or on [`dispose`](Self::dispose).
#[derive(Clone)]
pub struct Timer {
    state: Arc<Mutex<TimerState>>,
}

impl Timer {
    /// Creates a disabled timer on the calling thread's current dispatch context.
    ///
    /// # Errors
    /// [`Error::InsufficientCapabilities`](crate::Error::InsufficientCapabilities) if
    /// the current context does not serialize execution.
    pub fn new() -> Result<Self> {
        let context = current_verified(REQUIRED)?;
        Self::with_context(context)
    }

    /// Creates a disabled timer whose handler runs through `context`.
    pub fn with_context(context: Arc<dyn DispatchContext>) -> Result<Self> {
        verify(context.identity(), REQUIRED)?;

        Ok(Self {
            state: Arc::new(Mutex::new(TimerState {
                context,
                settings: Settings {
                    enabled: false,
                    auto_reset: true,
                    interval: DEFAULT_INTERVAL,
                },
                shadow: None,
                token: InvalidationToken::new(),
                countdown: None,
                elapsed: None,
                disposed: false,
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn weak(&self) -> Weak<Mutex<TimerState>> {
        Arc::downgrade(&self.state)
    }

    /// Sets the handler invoked each time the timer fires.
    pub fn on_elapsed<F>(&self, handler: F)
    where
        F: FnMut(&Timer) + Send + 'static,
    {
        self.lock().elapsed = Some(Box::new(handler));
    }

    pub fn enabled(&self) -> bool {
        self.lock().view().enabled
    }

    /// Starts or stops the countdown.
    ///
    /// Enabling an enabled timer does not restart it; see [`restart`](Self::restart).
    pub fn set_enabled(&self, enabled: bool) {
        let weak = self.weak();
        let mut state = self.lock();
        if state.is_firing() {
            state.view().enabled = enabled;
            return;
        }
        if state.settings.enabled == enabled {
            return;
        }

        state.settings.enabled = enabled;
        if enabled {
            state.arm(weak);
        } else {
            state.disarm();
        }
    }

    /// Whether the timer re-arms itself after firing.
    pub fn auto_reset(&self) -> bool {
        self.lock().view().auto_reset
    }

    pub fn set_auto_reset(&self, auto_reset: bool) {
        self.lock().view().auto_reset = auto_reset;
    }

    pub fn interval(&self) -> Duration {
        self.lock().view().interval
    }

    /// Changes the interval; an enabled timer restarts its countdown from now.
    pub fn set_interval(&self, interval: Duration) {
        let weak = self.weak();
        let mut state = self.lock();
        state.view().interval = interval;
        if !state.is_firing() && state.settings.enabled {
            state.arm(weak);
        }
    }

    /// Disables the timer.
    pub fn cancel(&self) {
        self.set_enabled(false);
    }

    /// Enables the timer and restarts its countdown from now.
    pub fn restart(&self) {
        let weak = self.weak();
        let mut state = self.lock();
        state.view().enabled = true;
        if !state.is_firing() {
            state.arm(weak);
        }
    }

    /// Fires once after `interval`, then disables itself.
    pub fn set_single_shot(&self, interval: Duration) {
        self.configure(false, interval);
    }

    /// Fires every `interval` until cancelled.
    pub fn set_periodic(&self, interval: Duration) {
        self.configure(true, interval);
    }

    fn configure(&self, auto_reset: bool, interval: Duration) {
        {
            let mut state = self.lock();
            let view = state.view();
            view.auto_reset = auto_reset;
            view.interval = interval;
        }
        self.restart();
    }

    /// Stops the timer for good and releases its handler.
    ///
    /// An expiry that already reached the dispatch context is suppressed.
    pub fn dispose(&self) {
        let mut state = self.lock();
        state.disposed = true;
        state.view().enabled = false;
        state.settings.enabled = false;
        state.disarm();
        state.token.dispose();
        if !state.is_firing() {
            state.elapsed = None;
        }
    }

    fn fire(weak: Weak<Mutex<TimerState>>) {
        let Some(state) = weak.upgrade() else {
            return;
        };
        let timer = Timer { state };

        let mut handler = {
            let mut state = timer.lock();
            state.countdown = None;
            if state.disposed || !state.settings.enabled {
                return;
            }

            let settings = state.settings;
            state.shadow = Some(Settings {
                enabled: settings.auto_reset,
                ..settings
            });
            state.elapsed.take()
        };

        trace!("timer elapsed");
        let outcome = match handler.as_mut() {
            Some(handler) => panic::catch_unwind(AssertUnwindSafe(|| handler(&timer))),
            None => Ok(()),
        };

        {
            let mut state = timer.lock();
            if state.elapsed.is_none() && !state.disposed {
                state.elapsed = handler;
            }
            if let Some(shadow) = state.shadow.take() {
                state.settings = shadow;
            }
            if state.settings.enabled && !state.disposed {
                state.arm(timer.weak());
            } else {
                state.settings.enabled = false;
                state.disarm();
            }
        }

        if let Err(payload) = outcome {
            panic::resume_unwind(payload);
        }
    }
}
