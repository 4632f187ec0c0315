//! A stream that forwards every operation to an inner stream.

use std::cell::{RefCell, RefMut};
use std::fmt;
use std::io::SeekFrom;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::stream::{Metadata, Stream, StreamError};

/// The only extension point exposed by [`StreamProxy::extension`].
const STREAM_EXTENSION: &str = "stream";

/// Creates the inner stream of a [`StreamProxy`] on first access.
pub trait StreamFactory: Send {
    fn create_stream(&mut self) -> Result<Box<dyn Stream>, StreamError>;
}

impl<F> StreamFactory for F
where
    F: FnMut() -> Result<Box<dyn Stream>, StreamError> + Send,
{
    fn create_stream(&mut self) -> Result<Box<dyn Stream>, StreamError> {
        self()
    }
}

enum Inner {
    Unbound,
    Deferred(Box<dyn StreamFactory>),
    Bound(Box<dyn Stream>),
    Detached,
}

/// Lets any value act as a [`Stream`] by delegating to an inner stream.
///
/// The inner stream is either supplied up front ([`StreamProxy::new`]) or
/// created by a [`StreamFactory`] the first time it is needed
/// ([`StreamProxy::deferred`]). A proxy built with [`StreamProxy::unbound`]
/// has neither and fails with [`StreamError::Misconfiguration`] as soon as an
/// operation is forwarded.
///
/// After [`detach`](Stream::detach) the proxy drops its inner reference: reads
/// return empty, eof is `true` and every capability query returns `false`.
pub struct StreamProxy {
    inner: RefCell<Inner>,
}

impl StreamProxy {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream + 'static,
    {
        Self::from_boxed(Box::new(stream))
    }

    pub fn from_boxed(stream: Box<dyn Stream>) -> Self {
        Self { inner: RefCell::new(Inner::Bound(stream)) }
    }

    /// Defers creation of the inner stream to `factory`.
    pub fn deferred<F>(factory: F) -> Self
    where
        F: FnMut() -> Result<Box<dyn Stream>, StreamError> + Send + 'static,
    {
        Self::from_factory(factory)
    }

    pub fn from_factory<T>(factory: T) -> Self
    where
        T: StreamFactory + 'static,
    {
        Self { inner: RefCell::new(Inner::Deferred(Box::new(factory))) }
    }

    /// Creates a proxy without an inner stream.
    pub fn unbound() -> Self {
        Self { inner: RefCell::new(Inner::Unbound) }
    }

    /// Returns the inner stream, creating it first when it is deferred.
    pub fn inner(&self) -> Result<RefMut<'_, dyn Stream + 'static>, StreamError> {
        let mut inner = self.inner.borrow_mut();
        if let Inner::Deferred(factory) = &mut *inner {
            let stream = factory.create_stream()?;
            debug!("stream proxy created its inner stream");
            *inner = Inner::Bound(stream);
        }

        RefMut::filter_map(inner, |inner| match inner {
            Inner::Bound(stream) => Some(&mut **stream),
            _ => None,
        })
        .map_err(|inner| match &*inner {
            Inner::Detached => StreamError::Detached,
            _ => StreamError::misconfiguration("no inner stream was supplied"),
        })
    }

    /// Looks up an extension point by name.
    ///
    /// `"stream"` resolves to the inner stream; any other name fails with
    /// [`StreamError::InvalidAccess`].
    pub fn extension(&self, name: &str) -> Result<RefMut<'_, dyn Stream + 'static>, StreamError> {
        if name != STREAM_EXTENSION {
            return Err(StreamError::invalid_access(name));
        }
        self.inner()
    }

    pub fn is_detached(&self) -> bool {
        matches!(*self.inner.borrow(), Inner::Detached)
    }

    fn forward<T>(&self, op: impl FnOnce(&mut dyn Stream) -> Result<T, StreamError>) -> Result<T, StreamError> {
        let mut stream = self.inner()?;
        op(&mut *stream)
    }

    /// Forwards an infallible query, answering `fallback` when there is no
    /// usable inner stream.
    fn query<T>(&self, fallback: T, op: impl FnOnce(&dyn Stream) -> T) -> T {
        match self.inner() {
            Ok(stream) => op(&*stream),
            Err(StreamError::Detached) => fallback,
            Err(e) => {
                warn!(cause = %e, "stream proxy query answered without inner stream");
                fallback
            }
        }
    }
}

impl fmt::Debug for StreamProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.try_borrow().as_deref() {
            Ok(Inner::Unbound) => "unbound",
            Ok(Inner::Deferred(_)) => "deferred",
            Ok(Inner::Bound(_)) => "bound",
            Ok(Inner::Detached) => "detached",
            Err(_) => "in use",
        };
        f.debug_struct("StreamProxy").field("state", &state).finish()
    }
}

impl Stream for StreamProxy {
    fn read(&mut self, len: usize) -> Result<Bytes, StreamError> {
        if self.is_detached() {
            return Ok(Bytes::new());
        }
        self.forward(|stream| stream.read(len))
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        self.forward(|stream| stream.write(data))
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, StreamError> {
        self.forward(|stream| stream.seek(pos))
    }

    fn tell(&mut self) -> Result<u64, StreamError> {
        self.forward(|stream| stream.tell())
    }

    fn eof(&self) -> bool {
        self.query(true, |stream| stream.eof())
    }

    fn size(&self) -> Option<u64> {
        self.query(None, |stream| stream.size())
    }

    fn is_readable(&self) -> bool {
        self.query(false, |stream| stream.is_readable())
    }

    fn is_writable(&self) -> bool {
        self.query(false, |stream| stream.is_writable())
    }

    fn is_seekable(&self) -> bool {
        self.query(false, |stream| stream.is_seekable())
    }

    fn metadata(&self) -> Metadata {
        self.query(Metadata::new(), |stream| stream.metadata())
    }

    fn metadata_value(&self, key: &str) -> Option<Value> {
        self.query(None, |stream| stream.metadata_value(key))
    }

    fn close(&mut self) {
        if self.is_detached() {
            return;
        }
        match self.inner() {
            Ok(mut stream) => stream.close(),
            Err(e) => warn!(cause = %e, "stream proxy closed without inner stream"),
        }
    }

    fn detach(&mut self) {
        let inner = self.inner.get_mut();
        if let Inner::Bound(stream) = &mut *inner {
            stream.detach();
        }
        *inner = Inner::Detached;
    }

    fn contents(&mut self) -> Result<Bytes, StreamError> {
        if self.is_detached() {
            return Ok(Bytes::new());
        }
        self.forward(|stream| stream.contents())
    }

    fn to_string_lossy(&mut self) -> String {
        if self.is_detached() {
            return String::new();
        }
        match self.inner() {
            Ok(mut stream) => stream.to_string_lossy(),
            Err(e) => {
                error!(stream = "StreamProxy", cause = %e, "failed to convert stream to string");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use super::*;
    use crate::stream::{BoundedBuffer, MemoryStream, MockStream, PullStream, SharedStream, lock, shared};
    use crate::test_support::capture_logs;

    fn fixture() -> (SharedStream, StreamProxy) {
        let inner = shared(MemoryStream::from_bytes("foo"));
        let proxy = StreamProxy::new(Arc::clone(&inner));
        (inner, proxy)
    }

    #[test]
    fn catches_read_errors_when_converting_to_string() {
        let mut calls = 0;
        let mut proxy = StreamProxy::new(PullStream::new(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(Bytes::from_static(b"partial"))
            } else {
                Err(io::Error::other("foo").into())
            }
        }));

        let (text, logs) = capture_logs(|| proxy.to_string_lossy());

        assert_eq!(text, "partial");
        assert!(logs.contains("failed to convert stream to string"));
        assert!(logs.contains("foo"));
    }

    #[test]
    fn string_conversion_is_left_to_inner_stream() {
        let mut mock = MockStream::new();
        mock.expect_to_string_lossy().times(1).returning(|| "from inner".to_string());
        let mut proxy = StreamProxy::new(mock);

        assert_eq!(proxy.to_string_lossy(), "from inner");
    }

    #[test]
    fn unbound_proxy_converts_to_empty_string() {
        let mut proxy = StreamProxy::unbound();

        let (text, logs) = capture_logs(|| proxy.to_string_lossy());

        assert_eq!(text, "");
        assert!(logs.contains("failed to convert stream to string"));
        assert!(logs.contains("no inner stream was supplied"));
    }

    #[test]
    fn converts_to_string() {
        let (_, mut proxy) = fixture();
        assert_eq!(proxy.to_string_lossy(), "foo");
    }

    #[test]
    fn has_size() {
        let (_, proxy) = fixture();
        assert_eq!(proxy.size(), Some(3));
    }

    #[test]
    fn reads() {
        let (_, mut proxy) = fixture();
        assert_eq!(&proxy.read(10).unwrap()[..], b"foo");
    }

    #[test]
    fn forwards_capabilities() {
        let (inner, proxy) = fixture();
        let expected = {
            let inner = lock(&inner);
            (inner.is_readable(), inner.is_writable(), inner.is_seekable())
        };

        assert_eq!((proxy.is_readable(), proxy.is_writable(), proxy.is_seekable()), expected);
    }

    #[test]
    fn seeks_and_tells() {
        let (inner, mut proxy) = fixture();

        proxy.seek(SeekFrom::Start(1)).unwrap();
        assert_eq!(lock(&inner).tell().unwrap(), 1);
        assert_eq!(proxy.tell().unwrap(), 1);

        proxy.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(lock(&inner).tell().unwrap(), 0);
        assert_eq!(proxy.tell().unwrap(), 0);

        proxy.seek(SeekFrom::End(0)).unwrap();
        assert_eq!(lock(&inner).tell().unwrap(), 3);
        assert_eq!(proxy.tell().unwrap(), 3);
    }

    #[test]
    fn gets_contents() {
        let (_, mut proxy) = fixture();

        assert_eq!(&proxy.contents().unwrap()[..], b"foo");
        assert!(proxy.contents().unwrap().is_empty());
        proxy.seek(SeekFrom::Start(1)).unwrap();
        assert_eq!(&proxy.contents().unwrap()[..], b"oo");
    }

    #[test]
    fn closes_inner_stream() {
        let (inner, mut proxy) = fixture();
        proxy.close();

        assert!(!lock(&inner).is_readable());
    }

    #[test]
    fn closing_deferred_proxy_closes_created_stream() {
        let mut proxy = StreamProxy::deferred(|| Ok(Box::new(MemoryStream::from_bytes("x"))));
        proxy.close();

        assert!(!proxy.is_readable());
        assert!(!proxy.is_writable());
        assert!(!proxy.is_seekable());
        assert_eq!(proxy.size(), None);
        assert_eq!(proxy.to_string_lossy(), "");
    }

    #[test]
    fn closing_unbound_proxy_is_logged() {
        let mut proxy = StreamProxy::unbound();

        let ((), logs) = capture_logs(|| proxy.close());

        assert!(logs.contains("stream proxy closed without inner stream"));
    }

    #[test]
    fn detach_clears_inner_reference() {
        let (_, mut proxy) = fixture();
        proxy.detach();

        assert!(proxy.is_detached());
        assert!(!proxy.is_readable());
        assert!(!proxy.is_writable());
        assert!(!proxy.is_seekable());
        assert!(proxy.eof());
        assert_eq!(proxy.size(), None);
        assert!(proxy.read(10).unwrap().is_empty());
    }

    #[test]
    fn wraps_metadata() {
        let (inner, proxy) = fixture();

        assert_eq!(proxy.metadata(), lock(&inner).metadata());
        assert_eq!(proxy.metadata_value("uri"), lock(&inner).metadata_value("uri"));
    }

    #[test]
    fn wraps_writes() {
        let (inner, mut proxy) = fixture();

        proxy.seek(SeekFrom::End(0)).unwrap();
        proxy.write(b"foo").unwrap();

        assert_eq!(lock(&inner).to_string_lossy(), "foofoo");
    }

    #[test]
    fn rejects_unknown_extension() {
        let (_, proxy) = fixture();

        assert!(matches!(proxy.extension("foo"), Err(StreamError::InvalidAccess { .. })));
        assert!(proxy.extension("stream").is_ok());
    }

    #[test]
    fn unbound_proxy_is_misconfigured() {
        let mut proxy = StreamProxy::unbound();

        assert!(matches!(proxy.extension("stream"), Err(StreamError::Misconfiguration { .. })));
        assert!(matches!(proxy.read(1), Err(StreamError::Misconfiguration { .. })));
        assert!(!proxy.is_readable());
    }

    #[test]
    fn deferred_stream_is_created_once_on_first_access() {
        let mut created = 0;
        let mut proxy = StreamProxy::deferred(move || {
            created += 1;
            assert_eq!(created, 1, "factory called twice");
            let mut buffer = BoundedBuffer::new();
            buffer.write(b"lazy")?;
            Ok(Box::new(buffer))
        });

        assert!(proxy.is_readable());
        assert!(!proxy.is_seekable());
        assert_eq!(&proxy.read(2).unwrap()[..], b"la");
        assert_eq!(proxy.to_string_lossy(), "zy");
    }

    #[derive(Debug)]
    struct Greeting(&'static str);

    impl StreamFactory for Greeting {
        fn create_stream(&mut self) -> Result<Box<dyn Stream>, StreamError> {
            Ok(Box::new(MemoryStream::from_bytes(format!("hello {}", self.0))))
        }
    }

    #[test]
    fn factory_types_supply_the_inner_stream() {
        let mut proxy = StreamProxy::from_factory(Greeting("proxy"));

        assert_eq!(proxy.size(), Some(11));
        assert_eq!(proxy.to_string_lossy(), "hello proxy");
    }
}
