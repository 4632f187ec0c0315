//! Streams over in-memory cursors and files.

use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use bytes::Bytes;
use serde_json::Value;

use crate::ensure;
use crate::stream::{Metadata, Stream, StreamError};

/// A seekable byte resource that can report its length.
pub trait Resource: Read + Write + Seek + Send {
    fn len(&self) -> Option<u64>;
}

impl Resource for Cursor<Vec<u8>> {
    fn len(&self) -> Option<u64> {
        Some(self.get_ref().len() as u64)
    }
}

impl Resource for File {
    fn len(&self) -> Option<u64> {
        self.metadata().ok().map(|metadata| metadata.len())
    }
}

/// A stream over an in-memory buffer.
pub type MemoryStream = ResourceStream<Cursor<Vec<u8>>>;

/// A stream over a file handle.
pub type FileStream = ResourceStream<File>;

/// Adapts a [`Resource`] to the [`Stream`] trait.
///
/// Eof is reported once a read reaches the end of the resource and is reset by
/// seeking. After [`detach`](Stream::detach) the resource is released and every
/// operation fails with [`StreamError::Detached`].
#[derive(Debug)]
pub struct ResourceStream<R> {
    resource: Option<R>,
    readable: bool,
    writable: bool,
    mode: &'static str,
    uri: Option<String>,
    eof: bool,
}

impl<R: Resource> ResourceStream<R> {
    pub fn new(resource: R, readable: bool, writable: bool) -> Self {
        let mode = match (readable, writable) {
            (true, true) => "r+",
            (false, true) => "w",
            _ => "r",
        };
        Self { resource: Some(resource), readable, writable, mode, uri: None, eof: false }
    }

    /// Releases the underlying resource, leaving the stream detached.
    pub fn take_resource(&mut self) -> Option<R> {
        self.resource.take()
    }

    fn resource(&mut self) -> Result<&mut R, StreamError> {
        self.resource.as_mut().ok_or(StreamError::Detached)
    }
}

impl MemoryStream {
    /// Creates a readable and writable stream over `data`, positioned at the start.
    pub fn from_bytes<B: Into<Vec<u8>>>(data: B) -> Self {
        let mut stream = Self::new(Cursor::new(data.into()), true, true);
        stream.uri = Some("memory".to_string());
        stream
    }
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::from_bytes(Vec::new())
    }
}

impl FileStream {
    /// Opens an existing file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StreamError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut stream = Self::new(file, true, false);
        stream.uri = Some(path.display().to_string());
        Ok(stream)
    }

    /// Creates or truncates a file for reading and writing.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, StreamError> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)?;
        let mut stream = Self::new(file, true, true);
        stream.mode = "w+";
        stream.uri = Some(path.display().to_string());
        Ok(stream)
    }
}

impl<R: Resource> Stream for ResourceStream<R> {
    fn read(&mut self, len: usize) -> Result<Bytes, StreamError> {
        ensure!(self.resource.is_none() || self.readable, StreamError::unsupported("cannot read from non-readable stream"));
        let resource = self.resource.as_mut().ok_or(StreamError::Detached)?;

        // the buffer grows with what is actually read, not with `len`
        let mut buf = Vec::new();
        let limit = u64::try_from(len).unwrap_or(u64::MAX);
        Read::take(resource, limit).read_to_end(&mut buf)?;
        if buf.len() < len {
            self.eof = true;
        }

        Ok(Bytes::from(buf))
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        ensure!(self.resource.is_none() || self.writable, StreamError::unsupported("cannot write to a non-writable stream"));
        self.resource()?.write_all(data)?;
        Ok(data.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, StreamError> {
        let position = self.resource()?.seek(pos)?;
        self.eof = false;
        Ok(position)
    }

    fn tell(&mut self) -> Result<u64, StreamError> {
        Ok(self.resource()?.stream_position()?)
    }

    fn eof(&self) -> bool {
        self.resource.is_none() || self.eof
    }

    fn size(&self) -> Option<u64> {
        self.resource.as_ref().and_then(Resource::len)
    }

    fn is_readable(&self) -> bool {
        self.resource.is_some() && self.readable
    }

    fn is_writable(&self) -> bool {
        self.resource.is_some() && self.writable
    }

    fn is_seekable(&self) -> bool {
        self.resource.is_some()
    }

    fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        if self.resource.is_none() {
            return metadata;
        }

        metadata.insert("mode".to_string(), Value::from(self.mode));
        metadata.insert("seekable".to_string(), Value::from(true));
        if let Some(uri) = &self.uri {
            metadata.insert("uri".to_string(), Value::from(uri.as_str()));
        }
        metadata
    }

    fn close(&mut self) {
        self.resource = None;
    }

    fn detach(&mut self) {
        self.resource = None;
    }
}
