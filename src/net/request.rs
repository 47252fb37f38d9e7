//! Write request descriptors.
//!
//! A [`WriteRequest`] is an immutable window over a [`Payload`] plus the caller's
//! [`WriteTag`]. A partial send produces a new, shrunk request with
//! [`advance`](WriteRequest::advance); the original tag travels with it so the final
//! completion reports the tag the caller supplied.

use crate::error::{Error, Result};

use std::io::IoSlice;
use std::sync::Arc;

/// Caller-chosen value reported back with a write's completion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WriteTag(pub u64);

/// Bytes to send: a single buffer or a list of buffers sent back to back.
#[derive(Clone, Debug)]
pub enum Payload {
    Single(Arc<[u8]>),
    List(Arc<[Arc<[u8]>]>),
}

impl Payload {
    /// Total number of bytes across all buffers.
    pub fn len(&self) -> usize {
        match self {
            Payload::Single(buffer) => buffer.len(),
            Payload::List(buffers) => buffers.iter().map(|buffer| buffer.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn buffers(&self) -> &[Arc<[u8]>] {
        match self {
            Payload::Single(buffer) => std::slice::from_ref(buffer),
            Payload::List(buffers) => &buffers[..],
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(buffer: Vec<u8>) -> Self {
        Payload::Single(buffer.into())
    }
}

impl From<&[u8]> for Payload {
    fn from(buffer: &[u8]) -> Self {
        Payload::Single(buffer.into())
    }
}

impl From<Arc<[u8]>> for Payload {
    fn from(buffer: Arc<[u8]>) -> Self {
        Payload::Single(buffer)
    }
}

impl From<Vec<Vec<u8>>> for Payload {
    fn from(buffers: Vec<Vec<u8>>) -> Self {
        Payload::List(buffers.into_iter().map(Arc::<[u8]>::from).collect())
    }
}

/// Unsent bytes of one write, plus the tag of the write they belong to.
#[derive(Clone, Debug)]
pub struct WriteRequest {
    payload: Payload,
    offset: usize,
    length: usize,
    tag: WriteTag,
}

impl WriteRequest {
    /// Covers the whole payload.
    pub fn new(payload: impl Into<Payload>, tag: WriteTag) -> Self {
        let payload = payload.into();
        let length = payload.len();

        Self {
            payload,
            offset: 0,
            length,
            tag,
        }
    }

    /// Covers `length` bytes of the payload starting at `offset`.
    ///
    /// # Errors
    /// [`Error::InvalidRange`] if the window does not fit inside the payload.
    pub fn with_range(
        payload: impl Into<Payload>,
        offset: usize,
        length: usize,
        tag: WriteTag,
    ) -> Result<Self> {
        let payload = payload.into();
        let available = payload.len();
        if offset.checked_add(length).is_none_or(|end| end > available) {
            return Err(Error::InvalidRange {
                offset,
                length,
                available,
            });
        }

        Ok(Self {
            payload,
            offset,
            length,
            tag,
        })
    }

    pub fn tag(&self) -> WriteTag {
        self.tag
    }

    /// Offset of the first unsent byte within the payload.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of unsent bytes.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns a request for the bytes left after `transferred` were sent.
    pub fn advance(&self, transferred: usize) -> Self {
        let transferred = transferred.min(self.length);

        Self {
            payload: self.payload.clone(),
            offset: self.offset + transferred,
            length: self.length - transferred,
            tag: self.tag,
        }
    }

    /// Borrows the unsent bytes as vectored-I/O slices.
    pub fn io_slices(&self) -> Vec<IoSlice<'_>> {
        let mut slices = Vec::new();
        let mut skip = self.offset;
        let mut remaining = self.length;

        for buffer in self.payload.buffers() {
            if remaining == 0 {
                break;
            }
            if skip >= buffer.len() {
                skip -= buffer.len();
                continue;
            }

            let end = buffer.len().min(skip + remaining);
            slices.push(IoSlice::new(&buffer[skip..end]));
            remaining -= end - skip;
            skip = 0;
        }

        slices
    }

    /// Copies the unsent bytes into one buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        self.io_slices()
            .iter()
            .flat_map(|slice| slice.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_keeps_tag_and_payload() {
        let request = WriteRequest::new(b"hello world".to_vec(), WriteTag(7));
        let rest = request.advance(6);

        assert_eq!(rest.tag(), WriteTag(7));
        assert_eq!(rest.offset(), 6);
        assert_eq!(rest.len(), 5);
        assert_eq!(rest.to_vec(), b"world");
        assert_eq!(request.len(), 11);
    }

    #[test]
    fn io_slices_span_buffer_list() {
        let payload = Payload::from(vec![b"ab".to_vec(), b"cde".to_vec(), b"f".to_vec()]);
        let request = WriteRequest::with_range(payload, 1, 4, WriteTag(0)).unwrap();

        let io = request.io_slices();
        let slices: Vec<&[u8]> = io.iter().map(|slice| &**slice).collect();
        assert_eq!(slices, vec![&b"b"[..], &b"cde"[..]]);

        assert_eq!(request.advance(2).to_vec(), b"de");
    }

    #[test]
    fn range_outside_payload_is_rejected() {
        let result = WriteRequest::with_range(b"abc".to_vec(), 2, 2, WriteTag(0));
        assert!(matches!(result, Err(Error::InvalidRange { available: 3, .. })));
    }
}
