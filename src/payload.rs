//! Payload source for download tests.
//!
//! Generates one block of pseudo-random bytes per process and hands out
//! independent readers over it. The block is a reference-counted `Bytes`
//! value, so every reader slices the same allocation without copying.
//!
//! The content is never written again after initialization, so readers share
//! it without any locking.

use crate::config::PayloadConfig;
use bytes::Bytes;
use once_cell::sync::OnceCell;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

static PAYLOAD: OnceCell<Arc<PayloadSource>> = OnceCell::new();

/// Initialize the process-wide payload exactly once.
///
/// Concurrent callers block until the first one finishes; later calls return
/// the same handle and ignore `config`.
pub fn initialize(config: &PayloadConfig) -> Result<Arc<PayloadSource>, InitError> {
    PAYLOAD
        .get_or_try_init(|| PayloadSource::generate(config).map(Arc::new))
        .cloned()
}

/// The immutable block all download responses are sliced from.
#[derive(Debug)]
pub struct PayloadSource {
    block: Bytes,
    max_payload_bytes: u64,
}

impl PayloadSource {
    /// Generate a new payload block seeded from the current time.
    pub fn generate(config: &PayloadConfig) -> Result<Self, InitError> {
        let started = Instant::now();
        let len = config.read_buffer_size;
        let mut rng = fastrand::Rng::with_seed(time_seed());
        let block = fill_block(&mut rng, len)?;

        info!(
            bytes = len,
            max_payload_bytes = config.max_payload_bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Payload generated"
        );

        Ok(Self {
            block,
            max_payload_bytes: config.max_payload_bytes,
        })
    }

    /// Open a fresh reader positioned at the start of the payload.
    pub fn open(&self) -> Reader {
        Reader::new(self.block.clone())
    }

    /// Total length of the generated block.
    pub fn len(&self) -> u64 {
        self.block.len() as u64
    }

    /// Largest byte count a single download may request.
    pub fn max_payload_bytes(&self) -> u64 {
        self.max_payload_bytes
    }
}

fn time_seed() -> u64 {
    let now = chrono::Utc::now();
    now.timestamp_nanos_opt()
        .map(|nanos| nanos as u64)
        .unwrap_or_else(|| now.timestamp_micros() as u64)
}

fn fill_block(rng: &mut fastrand::Rng, len: u64) -> Result<Bytes, InitError> {
    let size = usize::try_from(len).map_err(|_| InitError::Allocation(len))?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| InitError::Allocation(len))?;
    buf.resize(size, 0);
    rng.fill(&mut buf);
    Ok(Bytes::from(buf))
}

/// Independently positioned reader over payload content.
///
/// Cloning is cheap: the content is reference counted, and every reader keeps
/// its own cursor.
#[derive(Debug, Clone)]
pub struct Reader {
    bytes: Bytes,
    position: u64,
}

impl Reader {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn remaining(&self) -> u64 {
        self.len() - self.position
    }

    /// Zero-copy slice of at most `max` bytes at the cursor, advancing it.
    pub fn next_slice(&mut self, max: u64) -> Bytes {
        let n = max.min(self.remaining()) as usize;
        let start = self.position as usize;
        self.position += n as u64;
        self.bytes.slice(start..start + n)
    }
}

impl Read for Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let slice = self.next_slice(buf.len() as u64);
        buf[..slice.len()].copy_from_slice(&slice);
        Ok(slice.len())
    }
}

impl Seek for Reader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        match target {
            Some(position) if position <= self.len() => {
                self.position = position;
                Ok(position)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek outside of payload",
            )),
        }
    }
}

/// Payload initialization errors. Fatal to the process.
#[derive(Debug)]
pub enum InitError {
    /// The block could not be allocated in memory
    Allocation(u64),
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitError::Allocation(len) => {
                write!(f, "Failed to allocate {} byte payload buffer", len)
            }
        }
    }
}

impl std::error::Error for InitError {}
