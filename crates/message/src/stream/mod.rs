//! Synchronous byte stream abstractions.
//!
//! Every stream in this crate implements the [`Stream`] trait: a cursor over a
//! byte sequence that can be read, written, sought and queried for its
//! capabilities and metadata. Three implementations carry real logic:
//!
//! - [`BoundedBuffer`]: an in-memory FIFO with a high-water mark used as a
//!   cooperative backpressure hint
//! - [`PullStream`]: a read-only stream fed on demand by a [`Producer`]
//! - [`StreamProxy`]: forwards every operation to an inner stream which may be
//!   created lazily by a [`StreamFactory`]
//!
//! [`ResourceStream`] adapts any `Read + Write + Seek` value (an in-memory
//! cursor or a file) so the rest of the crate has something concrete to wrap.
//!
//! # Ownership
//!
//! Streams are single-owner and not meant to be used by several callers at
//! once. When a stream must live inside an immutable value, such as a request
//! body, it is held as a [`SharedStream`] and locked for the duration of each
//! operation.
//!
//! # String conversion
//!
//! [`Stream::to_string_lossy`] never fails. A read error while assembling the
//! string is logged through `tracing` at `error` level and whatever was read so
//! far is returned.

use std::any::type_name;
use std::io::SeekFrom;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use serde_json::Value;
use tracing::error;

mod bounded_buffer;
mod error;
mod proxy;
mod pull_stream;
mod resource_stream;
mod shared;

pub use bounded_buffer::BoundedBuffer;
pub use bounded_buffer::DEFAULT_HIGH_WATER_MARK;
pub use error::BoxError;
pub use error::StreamError;
pub use proxy::StreamFactory;
pub use proxy::StreamProxy;
pub use pull_stream::Producer;
pub use pull_stream::PullStream;
pub use pull_stream::PullStreamOptions;
pub use resource_stream::FileStream;
pub use resource_stream::MemoryStream;
pub use resource_stream::Resource;
pub use resource_stream::ResourceStream;

/// Key/value metadata describing a stream.
pub type Metadata = serde_json::Map<String, Value>;

/// A stream owned by an immutable value and shared between its copies.
pub type SharedStream = Arc<Mutex<dyn Stream>>;

/// Chunk size used when a stream is read until exhaustion.
const READ_CHUNK_SIZE: usize = 8192;

/// A readable, writable and/or seekable sequence of bytes.
///
/// Implementations own their cursor and any internal buffer. Once a stream is
/// closed or detached all capability queries return `false` and [`size`]
/// returns `None`.
///
/// [`size`]: Stream::size
#[cfg_attr(test, mockall::automock)]
pub trait Stream: Send {
    /// Reads up to `len` bytes. An empty result means no data is available.
    fn read(&mut self, len: usize) -> Result<Bytes, StreamError>;

    /// Writes `data`, returning the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, StreamError>;

    /// Moves the cursor, returning the new absolute position.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, StreamError>;

    /// Moves the cursor back to the start of the stream.
    fn rewind(&mut self) -> Result<u64, StreamError> {
        self.seek(SeekFrom::Start(0))
    }

    /// Returns the current position of the cursor.
    fn tell(&mut self) -> Result<u64, StreamError>;

    fn eof(&self) -> bool;

    /// Returns the size of the stream in bytes when it is known.
    fn size(&self) -> Option<u64>;

    fn is_readable(&self) -> bool;

    fn is_writable(&self) -> bool;

    fn is_seekable(&self) -> bool;

    /// Returns every metadata entry of the stream.
    fn metadata(&self) -> Metadata;

    /// Returns a single metadata entry, `None` for unknown keys.
    fn metadata_value(&self, key: &str) -> Option<Value> {
        self.metadata().get(key).cloned()
    }

    /// Closes the stream and releases any underlying resource.
    fn close(&mut self);

    /// Separates the stream from its underlying resource.
    fn detach(&mut self);

    /// Reads the remainder of the stream from the current position.
    fn contents(&mut self) -> Result<Bytes, StreamError> {
        let mut buf = BytesMut::new();
        read_remaining(self, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Reads the whole stream into a string, starting from the beginning when
    /// the stream is seekable.
    ///
    /// Read failures do not escape: they are logged and the content read up to
    /// the failure is returned.
    fn to_string_lossy(&mut self) -> String {
        let mut buf = BytesMut::new();

        let result = if self.is_seekable() { self.rewind().map(|_| ()) } else { Ok(()) };
        if let Err(e) = result.and_then(|()| read_remaining(self, &mut buf)) {
            error!(stream = type_name::<Self>(), read = buf.len(), cause = %e, "failed to convert stream to string");
        }

        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Reads `stream` until it reports eof or returns an empty chunk, appending to `buf`.
///
/// On failure `buf` keeps everything read before the error.
pub fn read_remaining<S>(stream: &mut S, buf: &mut BytesMut) -> Result<(), StreamError>
where
    S: Stream + ?Sized,
{
    while !stream.eof() {
        let chunk = stream.read(READ_CHUNK_SIZE)?;
        if chunk.is_empty() {
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(())
}

/// Wraps a stream so it can be shared by immutable values.
pub fn shared<S>(stream: S) -> SharedStream
where
    S: Stream + 'static,
{
    Arc::new(Mutex::new(stream))
}

/// Locks a shared stream, recovering the guard if a previous holder panicked.
pub fn lock(stream: &SharedStream) -> MutexGuard<'_, dyn Stream + 'static> {
    stream.lock().unwrap_or_else(PoisonError::into_inner)
}
