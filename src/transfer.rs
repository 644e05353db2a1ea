//! Response body streaming.
//!
//! A download body is a sequence of bounded `Bytes` slices cut from a payload
//! reader. Slicing never copies; hyper writes each slice and only asks for
//! the next one once the connection can take more, so a slow client holds
//! back the stream instead of buffering it.
//!
//! A peer that goes away mid-transfer is the normal end of a throughput
//! test: the connection drops the body, and the recorded [`Transfer`] shows
//! how far it got.

use crate::payload::Reader;
use axum::body::Body;
use bytes::Bytes;
use futures::stream;
use std::convert::Infallible;
use std::io;
use tracing::debug;

/// Largest slice handed to the connection in one piece
pub const TRANSFER_CHUNK: u64 = 256 * 1024;

/// Bytes requested versus bytes handed to the connection for one body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transfer {
    pub requested: u64,
    pub written: u64,
}

impl Transfer {
    pub fn is_complete(&self) -> bool {
        self.written == self.requested
    }
}

/// Bounded slices of exactly `requested` bytes from a reader.
#[derive(Debug)]
pub struct Chunks {
    reader: Reader,
    chunk_size: u64,
    transfer: Transfer,
}

impl Chunks {
    /// Plan a transfer of `len` bytes from the reader's current position.
    pub fn new(reader: Reader, len: u64, chunk_size: u64) -> io::Result<Self> {
        if len > reader.remaining() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "body of {} bytes exceeds {} readable bytes",
                    len,
                    reader.remaining()
                ),
            ));
        }
        Ok(Self {
            reader,
            chunk_size: chunk_size.max(1),
            transfer: Transfer {
                requested: len,
                written: 0,
            },
        })
    }

    pub fn transfer(&self) -> Transfer {
        self.transfer
    }

    /// Turn the remaining slices into a response body.
    pub fn into_body(self) -> Body {
        Body::from_stream(stream::iter(self.map(Ok::<_, Infallible>)))
    }
}

impl Iterator for Chunks {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        let left = self.transfer.requested - self.transfer.written;
        if left == 0 {
            return None;
        }
        let slice = self.reader.next_slice(left.min(self.chunk_size));
        if slice.is_empty() {
            return None;
        }
        self.transfer.written += slice.len() as u64;
        Some(slice)
    }
}

impl Drop for Chunks {
    fn drop(&mut self) {
        // Disconnected clients and HEAD requests both end here
        let transfer = self.transfer();
        if !transfer.is_complete() {
            debug!(
                requested = transfer.requested,
                written = transfer.written,
                "Body dropped before completion"
            );
        }
    }
}
