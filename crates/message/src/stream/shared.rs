//! [`Stream`] support for shared streams.

use std::io::SeekFrom;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use serde_json::Value;

use crate::stream::{Metadata, Stream, StreamError};

/// A shared stream is itself a stream: each operation locks the inner stream
/// for its own duration only.
impl<S> Stream for Arc<Mutex<S>>
where
    S: Stream + ?Sized,
{
    fn read(&mut self, len: usize) -> Result<Bytes, StreamError> {
        guard(self).read(len)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        guard(self).write(data)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, StreamError> {
        guard(self).seek(pos)
    }

    fn tell(&mut self) -> Result<u64, StreamError> {
        guard(self).tell()
    }

    fn eof(&self) -> bool {
        guard(self).eof()
    }

    fn size(&self) -> Option<u64> {
        guard(self).size()
    }

    fn is_readable(&self) -> bool {
        guard(self).is_readable()
    }

    fn is_writable(&self) -> bool {
        guard(self).is_writable()
    }

    fn is_seekable(&self) -> bool {
        guard(self).is_seekable()
    }

    fn metadata(&self) -> Metadata {
        guard(self).metadata()
    }

    fn metadata_value(&self, key: &str) -> Option<Value> {
        guard(self).metadata_value(key)
    }

    fn close(&mut self) {
        guard(self).close();
    }

    fn detach(&mut self) {
        guard(self).detach();
    }

    fn contents(&mut self) -> Result<Bytes, StreamError> {
        guard(self).contents()
    }

    fn to_string_lossy(&mut self) -> String {
        guard(self).to_string_lossy()
    }
}

fn guard<S: ?Sized>(stream: &Mutex<S>) -> std::sync::MutexGuard<'_, S> {
    stream.lock().unwrap_or_else(PoisonError::into_inner)
}
