//! Readiness-driven socket I/O.
//!
//! This module drives non-blocking sockets from a single background thread:
//! - [`core`]: The reactor thread and its table of parked operations
//! - [`poller`]: poll(2) wrapper and the self-pipe used to wake it
//! - [`socket`]: [`ReactorSocket`](socket::ReactorSocket) and
//!   [`ReactorListener`](socket::ReactorListener), the real-socket transports

pub(crate) mod core;
pub(crate) mod poller;
pub mod socket;
