//! Thread-affine dispatch abstraction.
//!
//! Every asynchronous component of the crate marshals its callbacks through a
//! [`DispatchContext`]: a two-operation adapter over some executor with thread
//! affinity. Implementations declare what they guarantee in the process-wide
//! [`registry`], and components [`verify`](registry::verify) those guarantees when
//! they are created.
//!
//! - [`contexts::DispatcherContext`] wraps a [`Dispatcher`](crate::Dispatcher).
//! - [`contexts::DefaultContext`] is the no-affinity fallback.
//! - Foreign executors (GUI main loops and the like) implement the trait themselves
//!   and call [`registry::register`] once with accurate flags.

pub mod capabilities;
pub mod contexts;
pub mod registry;

pub use capabilities::Capabilities;
pub use contexts::{DefaultContext, DispatcherContext};

use crate::error::Result;

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A zero-argument callback handed to a dispatch context.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Adapter over a thread-affine executor.
pub trait DispatchContext: Send + Sync {
    /// Queues `callback` and returns immediately.
    fn post(&self, callback: Callback);

    /// Queues `callback` and blocks until it has run.
    ///
    /// A panic raised by the callback is returned as
    /// [`Error::CallbackPanicked`](crate::Error::CallbackPanicked).
    fn send(&self, callback: Callback) -> Result<()>;

    /// Returns an independent handle to the same executor.
    fn create_copy(&self) -> Arc<dyn DispatchContext>;

    /// Identifies the implementation in the capability registry.
    fn identity(&self) -> ContextIdentity;
}

/// Registry key of a [`DispatchContext`] implementation.
#[derive(Clone, Copy)]
pub struct ContextIdentity {
    id: TypeId,
    name: &'static str,
}

/// Marker standing for "no dispatch context installed on this thread".
struct NoContext;

impl ContextIdentity {
    /// Identity of the implementation type `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Identity used when the calling thread has no current context.
    pub fn none() -> Self {
        Self {
            id: TypeId::of::<NoContext>(),
            name: "<no context>",
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ContextIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ContextIdentity {}

impl Hash for ContextIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ContextIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
