//! Host stream sockets driven by the reactor.
//!
//! [`ReactorSocket`] implements [`Transport`] over a non-blocking [`TcpStream`]; its
//! completions run either synchronously on the issuing thread (when the syscall
//! succeeds straight away) or later on the reactor thread. [`ReactorListener`]
//! accepts incoming connections the same way.

use crate::net::request::WriteRequest;
use crate::net::transport::{Completion, Transport};
use crate::net::utils::to_sockaddr;
use crate::reactor::core::{Attempt, Interest, Reactor};
use crate::reactor::poller::{poll, set_nonblocking};

use libc::{POLLOUT, SOCK_STREAM, pollfd, sockaddr};
use std::io::{self, Read, Write};
use std::mem;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{trace, warn};

type Shared<T> = Arc<RwLock<Option<T>>>;

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket is closed")
}

/// Runs `operation` against the socket, or abandons it once the socket was closed.
fn with_open<T, F>(shared: &Shared<T>, operation: F) -> Attempt
where
    F: FnOnce(&T) -> Attempt,
{
    let guard = shared.read().unwrap_or_else(PoisonError::into_inner);
    match guard.as_ref() {
        Some(socket) => operation(socket),
        None => Attempt::abandoned(),
    }
}

fn finish<T>(done: &mut Option<Completion<T>>, result: io::Result<T>) -> Attempt
where
    T: Send + 'static,
{
    match done.take() {
        Some(done) => Attempt::Ready(Box::new(move || done(result))),
        None => Attempt::abandoned(),
    }
}

/// A connected stream socket.
pub struct ReactorSocket {
    stream: Shared<TcpStream>,
    file_descriptor: RawFd,
    reactor: &'static Reactor,
}

impl ReactorSocket {
    /// Wraps a connected stream, switching it to non-blocking mode.
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;

        Ok(Self {
            file_descriptor: stream.as_raw_fd(),
            stream: Arc::new(RwLock::new(Some(stream))),
            reactor: Reactor::global()?,
        })
    }

    /// Starts a non-blocking connect to `address`.
    ///
    /// `done` receives the connected socket or the connect error, on this thread if
    /// the outcome is known immediately, otherwise on the reactor thread.
    pub fn connect(address: SocketAddr, done: Completion<ReactorSocket>) {
        let (stream, in_progress) = match open_and_connect(&address) {
            Ok(started) => started,
            Err(err) => return done(Err(err)),
        };
        if !in_progress {
            return done(Self::from_stream(stream));
        }

        let reactor = match Reactor::global() {
            Ok(reactor) => reactor,
            Err(err) => return done(Err(err)),
        };

        trace!(%address, "connect in progress");
        let file_descriptor = stream.as_raw_fd();
        let mut pending = Some((stream, done));
        reactor.submit(
            file_descriptor,
            Interest::Write,
            Box::new(move || {
                let Some((stream, done)) = pending.take() else {
                    return Attempt::abandoned();
                };

                match is_writable(&stream) {
                    Ok(false) => {
                        pending = Some((stream, done));
                        return Attempt::Retry;
                    }
                    Ok(true) => {}
                    Err(err) => return Attempt::Ready(Box::new(move || done(Err(err)))),
                }

                let result = match stream.take_error() {
                    Ok(None) => Self::from_stream(stream),
                    Ok(Some(err)) | Err(err) => Err(err),
                };
                Attempt::Ready(Box::new(move || done(result)))
            }),
        );
    }

    fn shutdown_abortively(stream: &TcpStream) {
        let linger = libc::linger {
            l_onoff: 1,
            l_linger: 0,
        };
        let result = unsafe {
            libc::setsockopt(
                stream.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_LINGER,
                &linger as *const libc::linger as *const _,
                mem::size_of::<libc::linger>() as libc::socklen_t,
            )
        };

        if result < 0 {
            warn!(error = %io::Error::last_os_error(), "failed to set zero linger");
        }
    }
}

impl Transport for ReactorSocket {
    fn receive(&self, capacity: usize, done: Completion<Vec<u8>>) {
        let stream = self.stream.clone();
        let mut buffer = vec![0u8; capacity];
        let mut done = Some(done);

        self.reactor.submit(
            self.file_descriptor,
            Interest::Read,
            Box::new(move || {
                with_open(&stream, |mut stream| loop {
                    match stream.read(&mut buffer) {
                        Ok(n) => {
                            buffer.truncate(n);
                            return finish(&mut done, Ok(mem::take(&mut buffer)));
                        }
                        Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                            return Attempt::Retry;
                        }
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                        Err(err) => return finish(&mut done, Err(err)),
                    }
                })
            }),
        );
    }

    fn send(&self, request: WriteRequest, done: Completion<usize>) {
        let stream = self.stream.clone();
        let mut done = Some(done);

        self.reactor.submit(
            self.file_descriptor,
            Interest::Write,
            Box::new(move || {
                with_open(&stream, |mut stream| loop {
                    match stream.write_vectored(&request.io_slices()) {
                        Ok(n) => return finish(&mut done, Ok(n)),
                        Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                            return Attempt::Retry;
                        }
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                        Err(err) => return finish(&mut done, Err(err)),
                    }
                })
            }),
        );
    }

    fn disconnect(&self, done: Completion<()>) {
        let result = {
            let guard = self.stream.read().unwrap_or_else(PoisonError::into_inner);
            match guard.as_ref() {
                Some(stream) => stream.shutdown(Shutdown::Write),
                None => Err(not_connected()),
            }
        };

        done(result);
    }

    fn close(&self, abortive: bool) {
        // Parked operations hold a read lock while they run; drop them first.
        self.reactor.cancel(self.file_descriptor);

        let stream = self
            .stream
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(stream) = stream {
            if abortive {
                Self::shutdown_abortively(&stream);
            }
            trace!(fd = self.file_descriptor, abortive, "socket closed");
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        let guard = self.stream.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().ok_or_else(not_connected)?.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        let guard = self.stream.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().ok_or_else(not_connected)?.peer_addr()
    }
}

impl Drop for ReactorSocket {
    fn drop(&mut self) {
        self.close(false);
    }
}

/// A listening socket.
pub struct ReactorListener {
    listener: Shared<TcpListener>,
    file_descriptor: RawFd,
    reactor: &'static Reactor,
}

impl ReactorListener {
    /// Binds a non-blocking listener to `address`.
    pub fn bind(address: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(address)?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            file_descriptor: listener.as_raw_fd(),
            listener: Arc::new(RwLock::new(Some(listener))),
            reactor: Reactor::global()?,
        })
    }

    /// Accepts one connection.
    pub fn accept(&self, done: Completion<(TcpStream, SocketAddr)>) {
        let listener = self.listener.clone();
        let mut done = Some(done);

        self.reactor.submit(
            self.file_descriptor,
            Interest::Read,
            Box::new(move || {
                with_open(&listener, |listener| loop {
                    match listener.accept() {
                        Ok(accepted) => return finish(&mut done, Ok(accepted)),
                        Err(err)
                            if matches!(
                                err.kind(),
                                io::ErrorKind::WouldBlock | io::ErrorKind::ConnectionAborted
                            ) =>
                        {
                            return Attempt::Retry;
                        }
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                        Err(err) => return finish(&mut done, Err(err)),
                    }
                })
            }),
        );
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        let guard = self.listener.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().ok_or_else(not_connected)?.local_addr()
    }

    /// Stops listening; a pending accept is dropped without completing.
    pub fn close(&self) {
        self.reactor.cancel(self.file_descriptor);
        self.listener
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl Drop for ReactorListener {
    fn drop(&mut self) {
        self.close();
    }
}

/// Creates a non-blocking socket and starts connecting it.
///
/// Returns the socket and whether the connect is still in progress.
fn open_and_connect(address: &SocketAddr) -> io::Result<(TcpStream, bool)> {
    let domain = match address {
        SocketAddr::V4(_) => libc::AF_INET,
        SocketAddr::V6(_) => libc::AF_INET6,
    };

    let file_descriptor = unsafe { libc::socket(domain, SOCK_STREAM, 0) };
    if file_descriptor < 0 {
        return Err(io::Error::last_os_error());
    }
    let stream = unsafe { TcpStream::from_raw_fd(file_descriptor) };
    set_nonblocking(file_descriptor)?;

    let (raw, length) = to_sockaddr(address);
    let result = unsafe {
        libc::connect(
            file_descriptor,
            &raw as *const libc::sockaddr_storage as *const sockaddr,
            length,
        )
    };
    if result == 0 {
        return Ok((stream, false));
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EINPROGRESS) | Some(libc::EINTR) => Ok((stream, true)),
        _ => Err(err),
    }
}

fn is_writable(stream: &TcpStream) -> io::Result<bool> {
    let mut fds = [pollfd {
        fd: stream.as_raw_fd(),
        events: POLLOUT,
        revents: 0,
    }];

    Ok(poll(&mut fds, Some(Duration::ZERO))? > 0)
}
