//! Host asynchronous socket primitive.
//!
//! A [`Transport`] issues an operation and later invokes its completion exactly once
//! with a result or an error, on any thread (including synchronously, before the
//! issuing call returns). [`AsyncTcpConnection`](super::AsyncTcpConnection) is written
//! against this trait; [`ReactorSocket`](crate::reactor::socket::ReactorSocket) is the
//! implementation backed by real sockets.

use crate::net::request::WriteRequest;

use std::io;
use std::net::SocketAddr;

/// Completion of one transport operation.
pub type Completion<T> = Box<dyn FnOnce(io::Result<T>) + Send + 'static>;

pub trait Transport: Send + Sync {
    /// Receives up to `capacity` bytes. An empty buffer means the peer closed its side.
    fn receive(&self, capacity: usize, done: Completion<Vec<u8>>);

    /// Sends some prefix of `request`'s bytes and reports how many went out.
    fn send(&self, request: WriteRequest, done: Completion<usize>);

    /// Gracefully shuts down the sending direction.
    fn disconnect(&self, done: Completion<()>);

    /// Releases the socket immediately. Pending operations never complete.
    ///
    /// With `abortive`, the socket is torn down with zero linger (a reset).
    fn close(&self, abortive: bool);

    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;
}
