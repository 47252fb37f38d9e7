//! Thread-safe action queue feeding a dispatcher's pump.
//!
//! Provides a FIFO queue that any thread may push actions into and that exactly one
//! pump thread pops from, blocking while the queue is empty.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// A unit of work queued on a dispatcher.
///
/// `Exit` is an ordinary queue entry: it stops the pump only once every action
/// enqueued before it has run.
pub(crate) enum Action {
    Run(Box<dyn FnOnce() + Send + 'static>),
    Exit,
}

/// A thread-safe, FIFO queue of actions with a "non-empty" signal.
///
/// Uses a Mutex-wrapped VecDeque so producers on any thread can push, and a Condvar
/// the pump blocks on between actions.
pub(crate) struct ActionQueue {
    queue: Mutex<VecDeque<Action>>,
    non_empty: Condvar,
}

impl ActionQueue {
    /// Creates a new empty action queue.
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            non_empty: Condvar::new(),
        }
    }

    /// Enqueues an action at the back of the queue.
    ///
    /// Signals the pump when the queue goes from empty to non-empty.
    ///
    /// # Arguments
    /// * `action` - The action or exit marker to enqueue
    pub(crate) fn push(&self, action: Action) {
        let mut queue = self.lock();
        let was_empty = queue.is_empty();
        queue.push_back(action);
        drop(queue);

        if was_empty {
            self.non_empty.notify_one();
        }
    }

    /// Blocks until an action is available, then dequeues it.
    ///
    /// # Returns
    /// The action at the front of the queue
    pub(crate) fn pop_wait(&self) -> Action {
        let mut queue = self.lock();
        loop {
            if let Some(action) = queue.pop_front() {
                return action;
            }
            queue = self
                .non_empty
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Checks if the queue is empty.
    ///
    /// # Returns
    /// true if no action is queued, false otherwise
    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Actions run outside the lock, so a poisoned queue still holds consistent data.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Action>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
