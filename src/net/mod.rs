//! TCP networking on top of the dispatcher runtime.
//!
//! This module provides event-based TCP connections whose completions are delivered
//! through a dispatch context:
//! - [`connection`]: [`AsyncTcpConnection`] with reads, queued writes and shutdown
//! - [`listener`]: [`AsyncTcpListener`] keeping an accept outstanding
//! - [`state`]: The read/write transfer state machine
//! - [`request`]: Write payloads, ranges and tags
//! - [`transport`]: The host socket seam a connection is written against
//!
//! # Example
//!
//! ```ignore
//! use affinity::net::{AsyncTcpListener, ConnectionConfig};
//!
//! let listener = AsyncTcpListener::bind("127.0.0.1:0".parse()?, ConnectionConfig::new())?;
//! listener.listen(|accepted| {
//!     let connection = accepted.unwrap();
//!     connection.read().unwrap();
//! })?;
//! ```

pub mod connection;
pub mod listener;
pub mod request;
pub mod state;
pub mod transport;
pub(crate) mod utils;

pub use connection::{AsyncTcpConnection, ConnectionConfig, WriteCompletion};
pub use listener::AsyncTcpListener;
pub use request::{Payload, WriteRequest, WriteTag};
pub use state::{ConnectionState, TransferState, WriteStart};
pub use transport::{Completion, Transport};
