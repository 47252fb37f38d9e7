//! Host countdown primitive.
//!
//! A single process-wide timer thread keeps a list of (deadline, callback) entries and
//! runs each callback, on the timer thread, once its deadline passes. Callbacks are
//! expected to do nothing heavier than posting to a dispatch context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

type Expiry = Box<dyn FnOnce() + Send + 'static>;

static DRIVER: OnceLock<TimerDriver> = OnceLock::new();

struct Entry {
    id: u64,
    deadline: Instant,
    callback: Expiry,
}

struct Timers {
    entries: Vec<Entry>,
    next_id: u64,
}

impl Timers {
    /// Removes every entry whose deadline has passed, earliest first.
    fn take_expired(&mut self, now: Instant) -> Vec<Entry> {
        let (mut due, pending): (Vec<Entry>, Vec<Entry>) = self
            .entries
            .drain(..)
            .partition(|entry| entry.deadline <= now);
        self.entries = pending;

        due.sort_by_key(|entry| (entry.deadline, entry.id));
        due
    }

    /// Returns the time remaining until the next deadline, if any.
    fn next_remaining(&self, now: Instant) -> Option<Duration> {
        self.entries
            .iter()
            .map(|entry| entry.deadline.saturating_duration_since(now))
            .min()
    }
}

/// Manages registered countdowns and runs them when their deadline is reached.
struct TimerDriver {
    timers: Mutex<Timers>,
    changed: Condvar,
    started: AtomicBool,
}

impl TimerDriver {
    fn get() -> &'static TimerDriver {
        let driver = DRIVER.get_or_init(|| TimerDriver {
            timers: Mutex::new(Timers {
                entries: Vec::new(),
                next_id: 1,
            }),
            changed: Condvar::new(),
            started: AtomicBool::new(false),
        });
        driver.ensure_thread();
        driver
    }

    fn ensure_thread(&'static self) {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let spawned = thread::Builder::new()
            .name("affinity-timer".to_string())
            .spawn(move || self.run());

        match spawned {
            Ok(_) => debug!("timer thread started"),
            Err(err) => {
                warn!(%err, "failed to start timer thread");
                self.started.store(false, Ordering::Release);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, deadline: Instant, callback: Expiry) -> u64 {
        let mut timers = self.lock();
        let id = timers.next_id;
        timers.next_id += 1;
        timers.entries.push(Entry {
            id,
            deadline,
            callback,
        });
        drop(timers);

        self.changed.notify_one();
        id
    }

    fn cancel(&self, id: u64) -> bool {
        let mut timers = self.lock();
        let before = timers.entries.len();
        timers.entries.retain(|entry| entry.id != id);
        before != timers.entries.len()
    }

    fn run(&self) {
        let mut timers = self.lock();
        loop {
            let due = timers.take_expired(Instant::now());
            if !due.is_empty() {
                drop(timers);
                for entry in due {
                    (entry.callback)();
                }
                timers = self.lock();
                continue;
            }

            timers = match timers.next_remaining(Instant::now()) {
                Some(remaining) => {
                    self.changed
                        .wait_timeout(timers, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .changed
                    .wait(timers)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

/// A pending countdown. Dropping it cancels the countdown.
#[derive(Debug)]
pub struct Countdown {
    id: u64,
}

impl Countdown {
    /// Cancels the countdown. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&self) -> bool {
        TimerDriver::get().cancel(self.id)
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs `callback` on the timer thread once `duration` has elapsed.
pub fn schedule<F>(duration: Duration, callback: F) -> Countdown
where
    F: FnOnce() + Send + 'static,
{
    let deadline = Instant::now() + duration;
    let id = TimerDriver::get().register(deadline, Box::new(callback));
    Countdown { id }
}
