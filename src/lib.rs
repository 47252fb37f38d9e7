//! Thread-affine dispatcher runtime with context-bound timers and TCP connections.
//!
//! Work is queued to a [`Dispatcher`], whose pump runs each action on one thread in
//! FIFO order. Components that complete on arbitrary threads (timers, sockets) route
//! their callbacks back through a [`DispatchContext`], so user code always runs on
//! the thread that owns it.
//!
//! # Architecture
//!
//! - **Dispatcher**: FIFO action queue pumped by one thread until an exit marker
//! - **DispatcherThread**: Dedicated thread running a dispatcher, with sync/async invoke
//! - **DispatchContext**: Post/send abstraction, plus a registry of context capabilities
//! - **InvalidationToken**: Generation counter that suppresses stale callbacks
//! - **Timer** / **Timeout**: Countdowns whose expiry is delivered through a context
//! - **AsyncTcpConnection** / **AsyncTcpListener**: Event-based sockets on a reactor
//! - **DispatcherThreadBuilder**: Fluent builder for dispatcher threads

mod builder;
pub mod dispatch;
mod error;
pub mod net;
pub mod reactor;
pub mod runtime;
pub mod time;
mod token;

pub use builder::DispatcherThreadBuilder;
pub use dispatch::{Capabilities, ContextIdentity, DispatchContext};
pub use error::{Error, Result};
pub use net::{AsyncTcpConnection, AsyncTcpListener, ConnectionConfig, WriteTag};
pub use runtime::{Dispatcher, DispatcherThread};
pub use time::{Timeout, Timer};
pub use token::InvalidationToken;
