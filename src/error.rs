//! Error type shared by every component of the runtime.
//!
//! Only contract violations and synchronous-callback failures are reported through
//! [`Error`]. Transport failures never surface here: they are delivered as
//! [`std::io::Result`] values on the relevant completion.

use crate::dispatch::Capabilities;
use crate::net::state::TransferState;

use std::any::Any;
use thiserror::Error;

/// Errors raised synchronously at the call site.
#[derive(Debug, Error)]
pub enum Error {
    /// A connection operation was issued from a state that does not allow it.
    #[error("cannot {operation} while the connection is {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: TransferState,
    },

    /// A dispatch context does not declare the guarantees a component relies on.
    #[error("dispatch context `{context}` provides {registered} but {required} is required")]
    InsufficientCapabilities {
        context: &'static str,
        required: Capabilities,
        registered: Capabilities,
    },

    /// A write window does not fit inside its payload.
    #[error("range {offset}+{length} exceeds payload of {available} bytes")]
    InvalidRange {
        offset: usize,
        length: usize,
        available: usize,
    },

    /// A pump or dedicated thread was started while already running.
    #[error("already running")]
    AlreadyRunning,

    /// The dedicated thread has not been started yet.
    #[error("not started")]
    NotStarted,

    /// The object was closed or disposed.
    #[error("closed")]
    Closed,

    /// A property that may only be set once was set again.
    #[error("`{0}` may only be set once")]
    AlreadySet(&'static str),

    /// A blocking enqueue was issued from the thread that pumps its target.
    #[error("blocking enqueue from the target's own pump thread would deadlock")]
    WouldDeadlock,

    /// A callback run through a synchronous entry point panicked.
    #[error("callback panicked: {0}")]
    CallbackPanicked(String),

    /// A blocking enqueue was dropped before its callback ran.
    #[error("dispatcher dropped the callback before running it")]
    Disconnected,

    /// The pump of a dedicated thread was aborted by a panicking action.
    #[error("pump aborted: {0}")]
    PumpPanicked(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
