//! I/O completion thread.
//!
//! Operations are non-blocking syscalls wrapped in closures. [`Reactor::submit`]
//! tries an operation once on the calling thread; if it would block, the operation
//! is parked until poll() reports its descriptor ready and is then retried on the
//! reactor thread. An operation finishes by handing back a completion thunk, which
//! runs outside the reactor's lock on whichever thread finished it.

use crate::reactor::poller::{WakePipe, poll};

use libc::{POLLIN, POLLOUT, pollfd};
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use tracing::{debug, warn};

static REACTOR: OnceLock<io::Result<Reactor>> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Interest {
    Read,
    Write,
}

/// Result of one attempt at an operation.
pub(crate) enum Attempt {
    /// Finished; the thunk delivers the result.
    Ready(Box<dyn FnOnce() + Send + 'static>),
    /// Would block; try again once the descriptor is ready.
    Retry,
}

impl Attempt {
    /// Finished without anything to deliver.
    pub(crate) fn abandoned() -> Self {
        Attempt::Ready(Box::new(|| {}))
    }
}

pub(crate) type Operation = Box<dyn FnMut() -> Attempt + Send + 'static>;

struct Entry {
    file_descriptor: RawFd,
    interest: Interest,
    operation: Operation,
}

struct Registry {
    entries: HashMap<u64, Entry>,
    next_id: u64,
}

pub(crate) struct Reactor {
    registry: Mutex<Registry>,
    waker: WakePipe,
    started: AtomicBool,
}

impl Reactor {
    /// Returns the process-wide reactor, starting its thread on first use.
    pub(crate) fn global() -> io::Result<&'static Reactor> {
        let reactor = REACTOR
            .get_or_init(|| {
                Ok(Reactor {
                    registry: Mutex::new(Registry {
                        entries: HashMap::new(),
                        next_id: 1,
                    }),
                    waker: WakePipe::new()?,
                    started: AtomicBool::new(false),
                })
            })
            .as_ref()
            .map_err(|err| io::Error::new(err.kind(), err.to_string()))?;

        reactor.ensure_thread()?;
        Ok(reactor)
    }

    fn ensure_thread(&'static self) -> io::Result<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let spawned = thread::Builder::new()
            .name("affinity-reactor".to_string())
            .spawn(move || self.run());

        match spawned {
            Ok(_) => {
                debug!("reactor thread started");
                Ok(())
            }
            Err(err) => {
                self.started.store(false, Ordering::Release);
                Err(err)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tries `operation` now and parks it until `file_descriptor` is ready if it would block.
    pub(crate) fn submit(
        &self,
        file_descriptor: RawFd,
        interest: Interest,
        mut operation: Operation,
    ) {
        match operation() {
            Attempt::Ready(complete) => complete(),
            Attempt::Retry => {
                let mut registry = self.lock();
                let id = registry.next_id;
                registry.next_id += 1;
                registry.entries.insert(
                    id,
                    Entry {
                        file_descriptor,
                        interest,
                        operation,
                    },
                );
                drop(registry);

                self.waker.wake();
            }
        }
    }

    /// Drops every parked operation on `file_descriptor` without completing it.
    ///
    /// Once this returns, no operation on the descriptor is parked or being retried
    /// by the reactor thread.
    pub(crate) fn cancel(&self, file_descriptor: RawFd) {
        let dropped: Vec<Entry> = {
            let mut registry = self.lock();
            let ids: Vec<u64> = registry
                .entries
                .iter()
                .filter(|(_, entry)| entry.file_descriptor == file_descriptor)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| registry.entries.remove(&id))
                .collect()
        };

        drop(dropped);
        self.waker.wake();
    }

    fn run(&self) {
        let mut fds: Vec<pollfd> = Vec::new();
        let mut ids: Vec<u64> = Vec::new();

        loop {
            fds.clear();
            ids.clear();
            fds.push(pollfd {
                fd: self.waker.fd(),
                events: POLLIN,
                revents: 0,
            });

            {
                let registry = self.lock();
                for (id, entry) in &registry.entries {
                    let events = match entry.interest {
                        Interest::Read => POLLIN,
                        Interest::Write => POLLOUT,
                    };
                    fds.push(pollfd {
                        fd: entry.file_descriptor,
                        events,
                        revents: 0,
                    });
                    ids.push(*id);
                }
            }

            match poll(&mut fds, None) {
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(%err, "reactor poll failed");
                    continue;
                }
            }

            if fds[0].revents != 0 {
                self.waker.drain();
            }

            let mut completions = Vec::new();
            {
                let mut registry = self.lock();
                for (pollfd, id) in fds[1..].iter().zip(&ids) {
                    if pollfd.revents == 0 {
                        continue;
                    }
                    // Cancelled while we were polling.
                    let Some(entry) = registry.entries.get_mut(id) else {
                        continue;
                    };

                    if let Attempt::Ready(complete) = (entry.operation)() {
                        registry.entries.remove(id);
                        completions.push(complete);
                    }
                }
            }

            for complete in completions {
                complete();
            }
        }
    }
}
