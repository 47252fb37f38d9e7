//! Accept loop producing [`AsyncTcpConnection`]s.
//!
//! Once [`listen`](AsyncTcpListener::listen) is called, one accept is kept
//! outstanding. It is re-issued after every accepted connection and abandoned after
//! the first error, which is reported to the handler.
//!
//! The pending accept only holds a weak reference to the listener, so dropping the
//! last handle stops listening and releases the socket.

use crate::dispatch::DispatchContext;
use crate::dispatch::registry::{current_verified, verify};
use crate::error::{Error, Result};
use crate::net::connection::{AsyncTcpConnection, ConnectionConfig, REQUIRED};
use crate::reactor::socket::{ReactorListener, ReactorSocket};
use crate::token::InvalidationToken;

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Called with every accepted connection, or with the error that stopped the loop.
pub type AcceptHandler = Arc<dyn Fn(io::Result<AsyncTcpConnection>) + Send + Sync + 'static>;

struct Core {
    token: InvalidationToken,
    on_accept: Option<AcceptHandler>,
    closed: bool,
}

struct Inner {
    socket: ReactorListener,
    context: Arc<dyn DispatchContext>,
    config: ConnectionConfig,
    core: Mutex<Core>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn issue_accept(self: &Arc<Self>) {
        let completion = {
            let core = self.lock();
            let inner = Arc::downgrade(self);
            core.token.bind_post_with(
                move |result: io::Result<AsyncTcpConnection>| {
                    if let Some(inner) = inner.upgrade() {
                        inner.accepted(result);
                    }
                },
                self.context.clone(),
            )
        };

        let context = self.context.clone();
        let config = self.config.clone();
        self.socket.accept(Box::new(move |result| {
            let result = result.and_then(|(stream, peer)| {
                debug!(%peer, "accepted connection");
                let socket = ReactorSocket::from_stream(stream)?;
                Ok(AsyncTcpConnection::assemble(
                    Arc::new(socket),
                    context,
                    config,
                ))
            });
            completion(result);
        }));
    }

    fn accepted(self: &Arc<Self>, result: io::Result<AsyncTcpConnection>) {
        let handler = {
            let mut core = self.lock();
            let Some(handler) = core.on_accept.clone() else {
                return;
            };
            if result.is_err() {
                core.on_accept = None;
            }
            handler
        };

        match &result {
            Ok(_) => self.issue_accept(),
            Err(err) => warn!(error = %err, "accept failed, listener stopped"),
        }

        handler(result);
    }

    fn close(&self) {
        {
            let mut core = self.lock();
            core.closed = true;
            core.on_accept = None;
            core.token.reset();
        }

        debug!("closing listener");
        self.socket.close();
    }
}

/// A listening TCP socket whose accepted connections are bound to a dispatch context.
///
/// Clones share the same listener; dropping the last clone closes it.
#[derive(Clone)]
pub struct AsyncTcpListener {
    handle: Arc<Handle>,
}

struct Handle {
    inner: Arc<Inner>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl AsyncTcpListener {
    /// Binds to `address` on the calling thread's current dispatch context.
    pub fn bind(address: SocketAddr, config: ConnectionConfig) -> Result<Self> {
        let context = current_verified(REQUIRED)?;
        Self::bind_with_context(address, context, config)
    }

    /// Binds to `address`; accepted connections and handler calls use `context`.
    pub fn bind_with_context(
        address: SocketAddr,
        context: Arc<dyn DispatchContext>,
        config: ConnectionConfig,
    ) -> Result<Self> {
        verify(context.identity(), REQUIRED)?;

        let socket = ReactorListener::bind(address)?;
        debug!(address = ?socket.local_addr().ok(), "listening");

        let inner = Arc::new(Inner {
            socket,
            context,
            config,
            core: Mutex::new(Core {
                token: InvalidationToken::new(),
                on_accept: None,
                closed: false,
            }),
        });

        Ok(Self {
            handle: Arc::new(Handle { inner }),
        })
    }

    fn inner(&self) -> &Arc<Inner> {
        &self.handle.inner
    }

    /// Starts accepting connections.
    ///
    /// # Errors
    /// [`Error::Closed`] after [`close`](Self::close), [`Error::AlreadySet`] while a
    /// previous accept loop is still running.
    pub fn listen<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(io::Result<AsyncTcpConnection>) + Send + Sync + 'static,
    {
        {
            let mut core = self.inner().lock();
            if core.closed {
                return Err(Error::Closed);
            }
            if core.on_accept.is_some() {
                return Err(Error::AlreadySet("accept handler"));
            }
            core.on_accept = Some(Arc::new(handler));
        }

        self.inner().issue_accept();
        Ok(())
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner().socket.local_addr()
    }

    /// Stops listening. The handler is never invoked afterwards.
    pub fn close(&self) {
        self.inner().close();
    }
}
