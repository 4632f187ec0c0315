//! A read-only stream fed on demand by a producer.

use std::fmt;
use std::io::SeekFrom;

use bytes::{Bytes, BytesMut};
use serde_json::Value;
use tracing::{debug, error};

use crate::stream::{BoundedBuffer, BoxError, Metadata, Stream, StreamError, read_remaining};

/// Supplies the data of a [`PullStream`].
///
/// `produce` receives the number of bytes the stream still needs and returns
/// the next chunk, which may be shorter or longer than asked. An empty chunk
/// means the producer is exhausted and will not be called again.
pub trait Producer: Send {
    fn produce(&mut self, size_hint: usize) -> Result<Bytes, BoxError>;
}

impl<F> Producer for F
where
    F: FnMut(usize) -> Result<Bytes, BoxError> + Send,
{
    fn produce(&mut self, size_hint: usize) -> Result<Bytes, BoxError> {
        self(size_hint)
    }
}

/// Size and metadata reported by a [`PullStream`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullStreamOptions {
    size: Option<u64>,
    metadata: Metadata,
}

impl PullStreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the total size of the produced data.
    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn metadata<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Adapts a [`Producer`] into a readable stream.
///
/// A read of `n` bytes is served from the internal buffer first. When the
/// buffer holds fewer than `n` bytes the producer is called with the missing
/// byte count until enough data is buffered or it is exhausted. Surplus bytes
/// stay buffered for the next read, so a read never returns more than asked and
/// bytes are never dropped or reordered.
///
/// The stream is readable, but neither writable nor seekable.
pub struct PullStream {
    producer: Option<Box<dyn Producer>>,
    buffer: BoundedBuffer,
    position: u64,
    size: Option<u64>,
    metadata: Metadata,
    detached: bool,
}

impl PullStream {
    /// Creates a stream pulling from the given closure.
    pub fn new<F>(producer: F) -> Self
    where
        F: FnMut(usize) -> Result<Bytes, BoxError> + Send + 'static,
    {
        Self::from_producer(producer, PullStreamOptions::default())
    }

    pub fn with_options<F>(producer: F, options: PullStreamOptions) -> Self
    where
        F: FnMut(usize) -> Result<Bytes, BoxError> + Send + 'static,
    {
        Self::from_producer(producer, options)
    }

    pub fn from_producer<P>(producer: P, options: PullStreamOptions) -> Self
    where
        P: Producer + 'static,
    {
        Self {
            producer: Some(Box::new(producer)),
            buffer: BoundedBuffer::new(),
            position: 0,
            size: options.size,
            metadata: options.metadata,
            detached: false,
        }
    }

    /// Calls the producer until `len` more bytes are buffered or it is exhausted.
    fn pump(&mut self, mut len: usize) -> Result<(), StreamError> {
        let Some(producer) = self.producer.as_mut() else {
            return Ok(());
        };

        while len > 0 {
            let chunk = producer.produce(len).map_err(StreamError::producer)?;
            if chunk.is_empty() {
                debug!(position = self.position, "producer exhausted");
                self.producer = None;
                return Ok(());
            }

            len = len.saturating_sub(chunk.len());
            self.buffer.write(&chunk)?;
        }
        Ok(())
    }

    fn release(&mut self) {
        self.producer = None;
        self.buffer.detach();
        self.detached = true;
    }
}

impl fmt::Debug for PullStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PullStream")
            .field("exhausted", &self.producer.is_none())
            .field("buffered", &self.buffer.len())
            .field("position", &self.position)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl Stream for PullStream {
    fn read(&mut self, len: usize) -> Result<Bytes, StreamError> {
        if len == 0 {
            return Ok(Bytes::new());
        }

        let buffered = self.buffer.len();
        if buffered < len {
            self.pump(len - buffered)?;
        }

        let data = self.buffer.read(len)?;
        self.position += data.len() as u64;
        Ok(data)
    }

    fn write(&mut self, _data: &[u8]) -> Result<usize, StreamError> {
        Err(StreamError::unsupported("cannot write to a pull stream"))
    }

    fn seek(&mut self, _pos: SeekFrom) -> Result<u64, StreamError> {
        Err(StreamError::unsupported("cannot seek a pull stream"))
    }

    fn tell(&mut self) -> Result<u64, StreamError> {
        Ok(self.position)
    }

    fn eof(&self) -> bool {
        self.producer.is_none() && self.buffer.is_empty()
    }

    fn size(&self) -> Option<u64> {
        if self.detached { None } else { self.size }
    }

    fn is_readable(&self) -> bool {
        !self.detached
    }

    fn is_writable(&self) -> bool {
        false
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn metadata(&self) -> Metadata {
        self.metadata.clone()
    }

    fn metadata_value(&self, key: &str) -> Option<Value> {
        self.metadata.get(key).cloned()
    }

    fn close(&mut self) {
        self.release();
    }

    fn detach(&mut self) {
        self.release();
    }

    /// Reads until the producer is exhausted. When the producer fails, the
    /// bytes it delivered before failing are kept in the result.
    fn to_string_lossy(&mut self) -> String {
        let mut buf = BytesMut::new();

        if let Err(e) = read_remaining(self, &mut buf) {
            let pending = self.buffer.take();
            self.position += pending.len() as u64;
            buf.extend_from_slice(&pending);
            error!(stream = "PullStream", read = buf.len(), cause = %e, "failed to convert stream to string");
        }

        String::from_utf8_lossy(&buf).into_owned()
    }
}
