//! Transfer state of one connection.
//!
//! Reads and writes are independent directions and may be in flight at the same
//! time, but at most one of each. Writes issued while one is outstanding wait in a
//! FIFO queue so they reach the wire in submission order. Closing is terminal and
//! excludes everything else.

use crate::error::{Error, Result};
use crate::net::request::WriteRequest;

use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Reading,
    Writing,
    ReadingWriting,
    Closing,
}

impl TransferState {
    pub fn is_reading(self) -> bool {
        matches!(self, TransferState::Reading | TransferState::ReadingWriting)
    }

    pub fn is_writing(self) -> bool {
        matches!(self, TransferState::Writing | TransferState::ReadingWriting)
    }

    fn with(reading: bool, writing: bool) -> Self {
        match (reading, writing) {
            (false, false) => TransferState::Idle,
            (true, false) => TransferState::Reading,
            (false, true) => TransferState::Writing,
            (true, true) => TransferState::ReadingWriting,
        }
    }
}

/// Outcome of [`ConnectionState::start_write`].
#[derive(Debug)]
pub enum WriteStart {
    /// No write was outstanding: the request should be sent now.
    SendNow(WriteRequest),
    /// A write is outstanding: the request waits its turn.
    Queued,
}

/// State machine plus write queue for one connection.
#[derive(Debug)]
pub struct ConnectionState {
    state: TransferState,
    pending_writes: VecDeque<WriteRequest>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            state: TransferState::Idle,
            pending_writes: VecDeque::new(),
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Number of writes waiting behind the outstanding one.
    pub fn queued_writes(&self) -> usize {
        self.pending_writes.len()
    }

    fn invalid(&self, operation: &'static str) -> Error {
        Error::InvalidTransition {
            operation,
            state: self.state,
        }
    }

    pub fn start_read(&mut self) -> Result<()> {
        match self.state {
            TransferState::Idle | TransferState::Writing => {
                self.state = TransferState::with(true, self.state.is_writing());
                Ok(())
            }
            _ => Err(self.invalid("start a read")),
        }
    }

    pub fn read_complete(&mut self) -> Result<()> {
        match self.state {
            TransferState::Idle | TransferState::Closing => Err(self.invalid("complete a read")),
            state => {
                self.state = TransferState::with(false, state.is_writing());
                Ok(())
            }
        }
    }

    pub fn start_write(&mut self, request: WriteRequest) -> Result<WriteStart> {
        match self.state {
            TransferState::Closing => Err(self.invalid("start a write")),
            state if state.is_writing() => {
                self.pending_writes.push_back(request);
                Ok(WriteStart::Queued)
            }
            state => {
                self.state = TransferState::with(state.is_reading(), true);
                Ok(WriteStart::SendNow(request))
            }
        }
    }

    /// Finishes the outstanding write and returns the next queued one, if any.
    ///
    /// The connection stays Writing while a next request is returned. While Closing
    /// there is nothing to advance and `None` is returned.
    pub fn write_complete(&mut self) -> Result<Option<WriteRequest>> {
        match self.state {
            TransferState::Closing => Ok(None),
            state if state.is_writing() => {
                let next = self.pending_writes.pop_front();
                if next.is_none() {
                    self.state = TransferState::with(state.is_reading(), false);
                }
                Ok(next)
            }
            _ => Err(self.invalid("complete a write")),
        }
    }

    /// Abandons the outstanding write and returns every queued request.
    pub fn fail_writes(&mut self) -> Vec<WriteRequest> {
        if self.state.is_writing() {
            self.state = TransferState::with(self.state.is_reading(), false);
        }
        self.pending_writes.drain(..).collect()
    }

    /// Moves to Closing for good, dropping queued writes.
    pub fn close(&mut self) {
        self.state = TransferState::Closing;
        self.pending_writes.clear();
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}
