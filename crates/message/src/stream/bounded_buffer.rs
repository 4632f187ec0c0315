//! In-memory FIFO buffer with a high-water mark.

use std::io::SeekFrom;

use bytes::{Bytes, BytesMut};
use serde_json::Value;
use tracing::trace;

use crate::stream::{Metadata, Stream, StreamError};

/// High-water mark used by [`BoundedBuffer::new`].
pub const DEFAULT_HIGH_WATER_MARK: usize = 16384;

const HWM_KEY: &str = "hwm";

/// A readable and writable FIFO of bytes.
///
/// Bytes written are appended to the back and reads remove them from the
/// front, so the buffer has no absolute position: [`tell`] and [`seek`] fail.
///
/// The high-water mark is advisory. A write that leaves the buffer holding at
/// least `high_water_mark` bytes still stores every byte but returns `Ok(0)`,
/// telling a cooperative writer to pause until the reader has caught up.
///
/// [`tell`]: Stream::tell
/// [`seek`]: Stream::seek
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedBuffer {
    buffer: BytesMut,
    high_water_mark: usize,
}

impl BoundedBuffer {
    /// Creates an empty buffer using [`DEFAULT_HIGH_WATER_MARK`].
    pub fn new() -> Self {
        Self::with_high_water_mark(DEFAULT_HIGH_WATER_MARK)
    }

    pub fn with_high_water_mark(high_water_mark: usize) -> Self {
        Self { buffer: BytesMut::new(), high_water_mark }
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Returns the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Removes and returns every buffered byte.
    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }
}

impl Default for BoundedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream for BoundedBuffer {
    fn read(&mut self, len: usize) -> Result<Bytes, StreamError> {
        let len = len.min(self.buffer.len());
        Ok(self.buffer.split_to(len).freeze())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        self.buffer.extend_from_slice(data);

        if self.buffer.len() >= self.high_water_mark {
            trace!(buffered = self.buffer.len(), hwm = self.high_water_mark, "buffer reached high-water mark");
            return Ok(0);
        }
        Ok(data.len())
    }

    fn seek(&mut self, _pos: SeekFrom) -> Result<u64, StreamError> {
        Err(StreamError::unsupported("cannot seek a bounded buffer"))
    }

    fn tell(&mut self) -> Result<u64, StreamError> {
        Err(StreamError::unsupported("cannot determine the position of a bounded buffer"))
    }

    fn eof(&self) -> bool {
        self.buffer.is_empty()
    }

    fn size(&self) -> Option<u64> {
        Some(self.buffer.len() as u64)
    }

    fn is_readable(&self) -> bool {
        true
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn is_seekable(&self) -> bool {
        false
    }

    /// The buffer publishes no bulk metadata; the high-water mark is only
    /// reachable through [`Stream::metadata_value`].
    fn metadata(&self) -> Metadata {
        Metadata::new()
    }

    fn metadata_value(&self, key: &str) -> Option<Value> {
        (key == HWM_KEY).then(|| Value::from(self.high_water_mark))
    }

    fn close(&mut self) {
        self.buffer.clear();
    }

    fn detach(&mut self) {
        self.buffer.clear();
    }

    fn contents(&mut self) -> Result<Bytes, StreamError> {
        Ok(self.take())
    }
}
