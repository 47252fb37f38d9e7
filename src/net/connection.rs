//! Event-based asynchronous TCP connection bound to a dispatch context.
//!
//! Every completion the [`Transport`] produces, on whatever thread, is bound through
//! the connection's [`InvalidationToken`] and posted to the connection's dispatch
//! context. Consumer handlers therefore run on the owning thread, one at a time, and
//! never after [`close`](AsyncTcpConnection::close).
//!
//! Writes are serialized: while one is outstanding further writes are queued and
//! issued in order as earlier ones complete. A partial transfer is continued with the
//! remaining range from the owning thread, and the consumer sees a single completion
//! per write.
//!
//! Outstanding operations only hold a weak reference to the connection. Dropping the
//! last handle closes it, like [`close`](AsyncTcpConnection::close).

use crate::dispatch::registry::{current_verified, verify};
use crate::dispatch::{Capabilities, DispatchContext};
use crate::error::{Error, Result};
use crate::net::request::{Payload, WriteRequest, WriteTag};
use crate::net::state::{ConnectionState, TransferState, WriteStart};
use crate::net::transport::Transport;
use crate::reactor::socket::ReactorSocket;
use crate::token::InvalidationToken;

use std::io;
use std::mem;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

pub(crate) const REQUIRED: Capabilities = Capabilities::ASYNC_NON_REENTRANT
    .union(Capabilities::SERIALIZED_EXECUTION)
    .union(Capabilities::FIFO_EXECUTION);

const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Called with the bytes of each completed read. An empty buffer means the peer
/// closed its sending direction.
pub type ReadHandler = Arc<dyn Fn(io::Result<Vec<u8>>) + Send + Sync + 'static>;

/// Called once per consumer write.
pub type WriteHandler = Arc<dyn Fn(WriteCompletion) + Send + Sync + 'static>;

/// Called when a graceful shutdown finished.
pub type ShutdownHandler = Arc<dyn Fn(io::Result<()>) + Send + Sync + 'static>;

/// Outcome of one write, carrying the tag the consumer passed in.
#[derive(Debug)]
pub struct WriteCompletion {
    pub tag: WriteTag,
    pub result: io::Result<()>,
}

/// Tunables for a connection.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    read_buffer_size: usize,
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Upper bound on the bytes a single read delivers. Zero is raised to one.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn buffer_size(&self) -> usize {
        self.read_buffer_size
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

// Raw write outcome, classified before it hops to the owning thread.
enum WriteStep {
    Remainder(WriteRequest),
    Done(WriteRequest),
    Failed(WriteRequest, io::Error),
}

impl WriteStep {
    fn classify(request: WriteRequest, result: io::Result<usize>) -> Self {
        match result {
            Ok(0) if !request.is_empty() => Self::Failed(
                request,
                io::Error::new(io::ErrorKind::WriteZero, "transport sent no bytes"),
            ),
            Ok(sent) if sent < request.len() => Self::Remainder(request.advance(sent)),
            Ok(_) => Self::Done(request),
            Err(err) => Self::Failed(request, err),
        }
    }
}

struct Core {
    machine: ConnectionState,
    token: InvalidationToken,
    released: bool,
    on_read: Option<ReadHandler>,
    on_write: Option<WriteHandler>,
    on_shutdown: Option<ShutdownHandler>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    context: Arc<dyn DispatchContext>,
    config: ConnectionConfig,
    core: Mutex<Core>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn issue_read(self: &Arc<Self>) {
        let completion = {
            let core = self.lock();
            let inner = Arc::downgrade(self);
            core.token.bind_post_with(
                move |result: io::Result<Vec<u8>>| {
                    if let Some(inner) = inner.upgrade() {
                        inner.read_completed(result);
                    }
                },
                self.context.clone(),
            )
        };

        trace!(capacity = self.config.read_buffer_size, "issuing read");
        self.transport
            .receive(self.config.read_buffer_size, Box::new(completion));
    }

    fn read_completed(&self, result: io::Result<Vec<u8>>) {
        let handler = {
            let mut core = self.lock();
            if core.machine.read_complete().is_err() {
                return;
            }
            core.on_read.clone()
        };

        if let Some(handler) = handler {
            handler(result);
        }
    }

    fn issue_write(self: &Arc<Self>, request: WriteRequest) {
        let completion = {
            let core = self.lock();
            let inner = Arc::downgrade(self);
            let hop = core.token.bind_post_with(
                move |step: WriteStep| {
                    if let Some(inner) = inner.upgrade() {
                        inner.write_stepped(step);
                    }
                },
                self.context.clone(),
            );
            let pending = request.clone();
            move |result: io::Result<usize>| hop(WriteStep::classify(pending, result))
        };

        trace!(tag = request.tag().0, len = request.len(), "issuing write");
        self.transport.send(request, Box::new(completion));
    }

    fn write_stepped(self: &Arc<Self>, step: WriteStep) {
        match step {
            WriteStep::Remainder(rest) => {
                if self.lock().machine.state() == TransferState::Closing {
                    return;
                }
                trace!(tag = rest.tag().0, remaining = rest.len(), "continuing write");
                self.issue_write(rest);
            }
            WriteStep::Done(request) => {
                let (next, handler) = {
                    let mut core = self.lock();
                    if core.machine.state() == TransferState::Closing {
                        return;
                    }
                    match core.machine.write_complete() {
                        Ok(next) => (next, core.on_write.clone()),
                        Err(_) => return,
                    }
                };

                if let Some(next) = next {
                    self.issue_write(next);
                }
                if let Some(handler) = handler {
                    handler(WriteCompletion {
                        tag: request.tag(),
                        result: Ok(()),
                    });
                }
            }
            WriteStep::Failed(request, err) => {
                let (abandoned, handler) = {
                    let mut core = self.lock();
                    if core.machine.state() == TransferState::Closing {
                        return;
                    }
                    (core.machine.fail_writes(), core.on_write.clone())
                };

                debug!(
                    tag = request.tag().0,
                    abandoned = abandoned.len(),
                    error = %err,
                    "write failed"
                );

                let Some(handler) = handler else {
                    return;
                };
                let (kind, message) = (err.kind(), err.to_string());
                handler(WriteCompletion {
                    tag: request.tag(),
                    result: Err(err),
                });
                for queued in abandoned {
                    handler(WriteCompletion {
                        tag: queued.tag(),
                        result: Err(io::Error::new(kind, message.clone())),
                    });
                }
            }
        }
    }

    fn close_with(&self, abortive: bool) {
        let first = {
            let mut core = self.lock();
            core.on_read = None;
            core.on_write = None;
            core.on_shutdown = None;
            core.token.reset();
            core.machine.close();
            !mem::replace(&mut core.released, true)
        };

        // An abortive close after a graceful one still resets the socket.
        if first || abortive {
            debug!(abortive, "closing connection");
            self.transport.close(abortive);
        }
    }

    fn shutdown_completed(&self, result: io::Result<()>) {
        let handler = self.lock().on_shutdown.clone();
        if let Some(handler) = handler {
            handler(result);
        }
    }
}

/// An asynchronous TCP connection whose events are delivered through a dispatch
/// context.
///
/// Clones share the same connection; dropping the last clone closes it. Handlers
/// typically capture a clone, which keeps the connection open until
/// [`close`](Self::close) detaches them.
#[derive(Clone)]
pub struct AsyncTcpConnection {
    handle: Arc<Handle>,
}

struct Handle {
    inner: Arc<Inner>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.inner.close_with(false);
    }
}

impl AsyncTcpConnection {
    /// Wraps `transport`, delivering its events through `context`.
    ///
    /// # Errors
    /// [`Error::InsufficientCapabilities`] unless `context` is non-reentrant,
    /// serialized and FIFO.
    pub fn from_transport(
        transport: Arc<dyn Transport>,
        context: Arc<dyn DispatchContext>,
        config: ConnectionConfig,
    ) -> Result<Self> {
        verify(context.identity(), REQUIRED)?;
        Ok(Self::assemble(transport, context, config))
    }

    pub(crate) fn assemble(
        transport: Arc<dyn Transport>,
        context: Arc<dyn DispatchContext>,
        config: ConnectionConfig,
    ) -> Self {
        let inner = Arc::new(Inner {
            transport,
            context,
            config,
            core: Mutex::new(Core {
                machine: ConnectionState::new(),
                token: InvalidationToken::new(),
                released: false,
                on_read: None,
                on_write: None,
                on_shutdown: None,
            }),
        });

        Self {
            handle: Arc::new(Handle { inner }),
        }
    }

    fn inner(&self) -> &Arc<Inner> {
        &self.handle.inner
    }

    /// Connects to `address`; `on_connected` runs through the calling thread's current
    /// dispatch context.
    pub fn connect<F>(
        address: SocketAddr,
        config: ConnectionConfig,
        on_connected: F,
    ) -> Result<()>
    where
        F: FnOnce(io::Result<AsyncTcpConnection>) + Send + 'static,
    {
        let context = current_verified(REQUIRED)?;
        Self::connect_with_context(address, context, config, on_connected)
    }

    /// Connects to `address`; the connection and `on_connected` are bound to `context`.
    pub fn connect_with_context<F>(
        address: SocketAddr,
        context: Arc<dyn DispatchContext>,
        config: ConnectionConfig,
        on_connected: F,
    ) -> Result<()>
    where
        F: FnOnce(io::Result<AsyncTcpConnection>) + Send + 'static,
    {
        verify(context.identity(), REQUIRED)?;

        debug!(%address, "connecting");
        let target = context.clone();
        ReactorSocket::connect(
            address,
            Box::new(move |result| {
                let result =
                    result.map(|socket| Self::assemble(Arc::new(socket), context, config));
                target.post(Box::new(move || on_connected(result)));
            }),
        );

        Ok(())
    }

    pub fn on_read<F>(&self, handler: F)
    where
        F: Fn(io::Result<Vec<u8>>) + Send + Sync + 'static,
    {
        self.inner().lock().on_read = Some(Arc::new(handler));
    }

    pub fn on_write<F>(&self, handler: F)
    where
        F: Fn(WriteCompletion) + Send + Sync + 'static,
    {
        self.inner().lock().on_write = Some(Arc::new(handler));
    }

    pub fn on_shutdown<F>(&self, handler: F)
    where
        F: Fn(io::Result<()>) + Send + Sync + 'static,
    {
        self.inner().lock().on_shutdown = Some(Arc::new(handler));
    }

    /// Starts one read. Its result arrives at the read handler.
    ///
    /// # Errors
    /// [`Error::InvalidTransition`] if a read is already outstanding or the connection
    /// is closing.
    pub fn read(&self) -> Result<()> {
        self.inner().lock().machine.start_read()?;
        self.inner().issue_read();
        Ok(())
    }

    /// Writes all of `payload`, queueing behind any outstanding write.
    pub fn write(&self, payload: impl Into<Payload>, tag: WriteTag) -> Result<()> {
        self.write_request(WriteRequest::new(payload, tag))
    }

    /// Writes `length` bytes of `payload` starting at `offset`.
    pub fn write_range(
        &self,
        payload: impl Into<Payload>,
        offset: usize,
        length: usize,
        tag: WriteTag,
    ) -> Result<()> {
        self.write_request(WriteRequest::with_range(payload, offset, length, tag)?)
    }

    /// Writes several buffers as one request.
    pub fn write_buffers(&self, buffers: Vec<Vec<u8>>, tag: WriteTag) -> Result<()> {
        self.write(buffers, tag)
    }

    pub fn write_request(&self, request: WriteRequest) -> Result<()> {
        let start = self.inner().lock().machine.start_write(request)?;
        if let WriteStart::SendNow(request) = start {
            self.inner().issue_write(request);
        }
        Ok(())
    }

    /// Gracefully shuts down the sending direction.
    ///
    /// The read and write handlers are detached first, so outstanding reads and writes
    /// never report. The shutdown handler runs once the transport finished.
    pub fn shutdown(&self) -> Result<()> {
        let completion = {
            let mut core = self.inner().lock();
            if core.machine.state() == TransferState::Closing {
                return Err(Error::InvalidTransition {
                    operation: "shut down",
                    state: TransferState::Closing,
                });
            }

            core.on_read = None;
            core.on_write = None;
            core.machine.close();

            let inner = Arc::downgrade(self.inner());
            core.token.bind_post_with(
                move |result: io::Result<()>| {
                    if let Some(inner) = inner.upgrade() {
                        inner.shutdown_completed(result);
                    }
                },
                self.inner().context.clone(),
            )
        };

        debug!("shutting down connection");
        self.inner().transport.disconnect(Box::new(completion));
        Ok(())
    }

    /// Releases the socket. No handler is invoked afterwards.
    pub fn close(&self) {
        self.inner().close_with(false);
    }

    /// Releases the socket with a reset instead of a graceful close.
    pub fn abortive_close(&self) {
        self.inner().close_with(true);
    }

    pub fn state(&self) -> TransferState {
        self.inner().lock().machine.state()
    }

    /// Number of writes waiting behind the outstanding one.
    pub fn queued_writes(&self) -> usize {
        self.inner().lock().machine.queued_writes()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner().transport.local_addr()
    }

    pub fn remote_addr(&self) -> io::Result<SocketAddr> {
        self.inner().transport.peer_addr()
    }

    pub fn context(&self) -> Arc<dyn DispatchContext> {
        self.inner().context.clone()
    }
}
