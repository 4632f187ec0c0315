//! A single uploaded file.

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::ensure;
use crate::stream::{FileStream, SharedStream, Stream, lock, shared};
use crate::upload::{UploadError, UploadErrorCode};

const COPY_CHUNK_SIZE: usize = 8192;

/// Where the bytes of an uploaded file live.
#[derive(Clone)]
pub enum UploadSource {
    /// Bytes held by a stream.
    Stream(SharedStream),
    /// Bytes stored in a file, typically a temporary file written by the server.
    Path(PathBuf),
}

impl UploadSource {
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream + 'static,
    {
        Self::Stream(shared(stream))
    }

    pub fn path<P: Into<PathBuf>>(path: P) -> Self {
        Self::Path(path.into())
    }
}

impl From<SharedStream> for UploadSource {
    fn from(stream: SharedStream) -> Self {
        Self::Stream(stream)
    }
}

impl From<PathBuf> for UploadSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for UploadSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<&str> for UploadSource {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl From<String> for UploadSource {
    fn from(path: String) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl PartialEq for UploadSource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Stream(a), Self::Stream(b)) => Arc::ptr_eq(a, b),
            (Self::Path(a), Self::Path(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct UploadState {
    source: Option<UploadSource>,
    moved: bool,
}

/// An uploaded file: a byte source plus the metadata the client sent with it.
///
/// The byte source can be moved to its final destination exactly once. After a
/// successful [`move_to`](UploadedFile::move_to) the source is released and any
/// further access fails with [`UploadError::AlreadyMoved`]. Files carrying a
/// non-OK [`UploadErrorCode`] never expose a source and fail with
/// [`UploadError::Upload`] instead.
///
/// The state lives behind a mutex so files held by an immutable request can
/// still be moved.
pub struct UploadedFile {
    state: Mutex<UploadState>,
    opened: Mutex<Option<SharedStream>>,
    size: Option<u64>,
    error: UploadErrorCode,
    client_filename: Option<String>,
    client_media_type: Option<String>,
}

impl UploadedFile {
    /// Creates an uploaded file.
    ///
    /// When `error` is OK the source must be usable: a path source may not be
    /// empty. With any other code the source is ignored.
    pub fn new<S: Into<UploadSource>>(source: S, size: Option<u64>, error: UploadErrorCode) -> Result<Self, UploadError> {
        let source = if error.is_ok() {
            let source = source.into();
            if let UploadSource::Path(path) = &source {
                ensure!(
                    !path.as_os_str().is_empty(),
                    UploadError::invalid_argument("invalid stream or file provided for uploaded file")
                );
            }
            Some(source)
        } else {
            None
        };

        Ok(Self {
            state: Mutex::new(UploadState { source, moved: false }),
            opened: Mutex::new(None),
            size,
            error,
            client_filename: None,
            client_media_type: None,
        })
    }

    pub fn with_client_filename<S: Into<String>>(mut self, filename: S) -> Self {
        self.client_filename = Some(filename.into());
        self
    }

    pub fn with_client_media_type<S: Into<String>>(mut self, media_type: S) -> Self {
        self.client_media_type = Some(media_type.into());
        self
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn error(&self) -> UploadErrorCode {
        self.error
    }

    /// The file name sent by the client. Never trust it for filesystem paths.
    pub fn client_filename(&self) -> Option<&str> {
        self.client_filename.as_deref()
    }

    pub fn client_media_type(&self) -> Option<&str> {
        self.client_media_type.as_deref()
    }

    pub fn is_moved(&self) -> bool {
        self.state().moved
    }

    /// Returns the stream holding the uploaded bytes.
    ///
    /// A path source is opened read-only on first access and the same stream is
    /// returned afterwards.
    pub fn stream(&self) -> Result<SharedStream, UploadError> {
        let state = self.state();
        self.validate_active(&state)?;

        match &state.source {
            Some(UploadSource::Stream(stream)) => Ok(Arc::clone(stream)),
            Some(UploadSource::Path(path)) => {
                let mut opened = self.opened.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(stream) = &*opened {
                    return Ok(Arc::clone(stream));
                }

                debug!(path = %path.display(), "opening uploaded file");
                let stream = shared(FileStream::open(path)?);
                *opened = Some(Arc::clone(&stream));
                Ok(stream)
            }
            None => Err(UploadError::AlreadyMoved),
        }
    }

    /// Moves the uploaded bytes to `target`.
    ///
    /// Path sources are renamed, falling back to copy and remove when the
    /// destination is on another filesystem. Stream sources are rewound when
    /// possible and copied into a newly created file. The source is released
    /// once the move succeeds.
    pub fn move_to<P: AsRef<Path>>(&self, target: P) -> Result<(), UploadError> {
        let target = target.as_ref();
        let mut state = self.state();
        self.validate_active(&state)?;
        ensure!(
            !target.as_os_str().is_empty(),
            UploadError::invalid_argument("invalid path provided for move operation; must be a non-empty path")
        );

        match &state.source {
            Some(UploadSource::Path(from)) => {
                self.release_opened();
                move_file(from, target)?;
            }
            Some(UploadSource::Stream(stream)) => copy_stream(stream, target)?,
            None => return Err(UploadError::AlreadyMoved),
        }

        if let Some(UploadSource::Stream(stream)) = state.source.take() {
            lock(&stream).close();
        }
        state.moved = true;

        info!(destination = %target.display(), size = ?self.size, "uploaded file moved");
        Ok(())
    }

    fn validate_active(&self, state: &UploadState) -> Result<(), UploadError> {
        ensure!(self.error.is_ok(), UploadError::Upload { code: self.error });
        ensure!(!state.moved, UploadError::AlreadyMoved);
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, UploadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release_opened(&self) {
        let opened = self.opened.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(stream) = opened {
            lock(&stream).close();
        }
    }

    fn snapshot(&self) -> UploadState {
        self.state().clone()
    }
}

fn move_file(from: &Path, target: &Path) -> Result<(), UploadError> {
    if let Err(e) = fs::rename(from, target) {
        debug!(cause = %e, from = %from.display(), "rename failed, copying uploaded file instead");
        fs::copy(from, target).map_err(|e| UploadError::moving(target, e))?;
        fs::remove_file(from).map_err(|e| UploadError::moving(target, e))?;
    }
    Ok(())
}

fn copy_stream(stream: &SharedStream, target: &Path) -> Result<(), UploadError> {
    let mut stream = lock(stream);
    if stream.is_seekable() {
        stream.rewind()?;
    }

    let mut file = File::create(target).map_err(|e| UploadError::moving(target, e))?;
    loop {
        let chunk = stream.read(COPY_CHUNK_SIZE)?;
        if chunk.is_empty() {
            break;
        }
        file.write_all(&chunk).map_err(|e| UploadError::moving(target, e))?;
    }
    file.flush().map_err(|e| UploadError::moving(target, e))
}

impl PartialEq for UploadedFile {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }

        self.size == other.size
            && self.error == other.error
            && self.client_filename == other.client_filename
            && self.client_media_type == other.client_media_type
            && self.snapshot() == other.snapshot()
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.snapshot();
        f.debug_struct("UploadedFile")
            .field("source", &state.source)
            .field("moved", &state.moved)
            .field("size", &self.size)
            .field("error", &self.error)
            .field("client_filename", &self.client_filename)
            .field("client_media_type", &self.client_media_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::stream::MemoryStream;

    fn memory_upload(content: &str) -> UploadedFile {
        UploadedFile::new(UploadSource::stream(MemoryStream::from_bytes(content)), Some(content.len() as u64), UploadErrorCode::Ok)
            .unwrap()
    }

    #[test]
    fn rejects_empty_path_source() {
        let result = UploadedFile::new("", Some(0), UploadErrorCode::Ok);
        assert!(matches!(result, Err(UploadError::InvalidArgument { .. })));
    }

    #[test]
    fn returns_original_stream() {
        let stream = shared(MemoryStream::from_bytes("Foo bar!"));
        let upload = UploadedFile::new(Arc::clone(&stream), Some(8), UploadErrorCode::Ok).unwrap();

        assert!(Arc::ptr_eq(&upload.stream().unwrap(), &stream));
    }

    #[test]
    fn opens_path_source_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.tmp");
        fs::write(&path, "from disk").unwrap();

        let upload = UploadedFile::new(path.as_path(), None, UploadErrorCode::Ok).unwrap();
        let stream = upload.stream().unwrap();

        assert_eq!(lock(&stream).to_string_lossy(), "from disk");
        assert!(Arc::ptr_eq(&stream, &upload.stream().unwrap()));
        assert_eq!(
            lock(&stream).metadata_value("uri"),
            Some(serde_json::Value::from(path.display().to_string()))
        );
    }

    #[test]
    fn moves_stream_source() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("moved.txt");
        let upload = memory_upload("Foo bar!")
            .with_client_filename("filename.txt")
            .with_client_media_type("text/plain");

        assert_eq!(upload.size(), Some(8));
        assert_eq!(upload.client_filename(), Some("filename.txt"));
        assert_eq!(upload.client_media_type(), Some("text/plain"));

        upload.move_to(&target).unwrap();

        assert!(upload.is_moved());
        assert_eq!(fs::read_to_string(&target).unwrap(), "Foo bar!");
    }

    #[test]
    fn moves_path_source() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("copy_from");
        let target = dir.path().join("copy_to");
        fs::write(&from, "uploaded bytes").unwrap();

        let upload = UploadedFile::new(from.clone(), Some(14), UploadErrorCode::Ok)
            .unwrap()
            .with_client_media_type("text/plain");
        upload.move_to(&target).unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "uploaded bytes");
        assert!(!from.exists());
    }

    #[test]
    fn rejects_empty_target_path() {
        let upload = memory_upload("Foo bar!");

        let err = upload.move_to("").unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument { .. }));
        assert!(err.to_string().contains("path"));
        assert!(!upload.is_moved());
    }

    #[test]
    fn cannot_move_twice() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("once");
        let upload = memory_upload("Foo bar!");
        upload.move_to(&target).unwrap();

        let err = upload.move_to(&target).unwrap_err();
        assert!(matches!(err, UploadError::AlreadyMoved));
        assert!(err.to_string().contains("moved"));
    }

    #[test]
    fn cannot_retrieve_stream_after_move() {
        let dir = tempfile::tempdir().unwrap();
        let upload = memory_upload("Foo bar!");
        let stream = upload.stream().unwrap();
        upload.move_to(dir.path().join("gone")).unwrap();

        assert!(matches!(upload.stream(), Err(UploadError::AlreadyMoved)));
        assert!(!lock(&stream).is_readable());
    }

    #[rstest]
    #[case(UploadErrorCode::IniSize)]
    #[case(UploadErrorCode::FormSize)]
    #[case(UploadErrorCode::Partial)]
    #[case(UploadErrorCode::NoFile)]
    #[case(UploadErrorCode::NoTmpDir)]
    #[case(UploadErrorCode::CantWrite)]
    #[case(UploadErrorCode::Extension)]
    fn error_status_blocks_access(#[case] code: UploadErrorCode) {
        let dir = tempfile::tempdir().unwrap();
        let upload = UploadedFile::new("not ok", Some(0), code).unwrap();

        assert_eq!(upload.error(), code);

        let err = upload.move_to(dir.path().join("target")).unwrap_err();
        assert!(matches!(err, UploadError::Upload { code: c } if c == code));
        assert!(err.to_string().contains("upload error"));

        let Err(err) = upload.stream() else { panic!("expected upload error") };
        assert!(matches!(err, UploadError::Upload { .. }));
    }

    #[test]
    fn error_status_wins_over_valid_stream() {
        let upload = UploadedFile::new(UploadSource::stream(MemoryStream::from_bytes("data")), Some(4), UploadErrorCode::Partial)
            .unwrap();

        assert!(matches!(upload.stream(), Err(UploadError::Upload { .. })));
    }

    #[test]
    fn equality_compares_metadata_and_source() {
        let a = UploadedFile::new("/tmp/upload/up1h4j1o", Some(123), UploadErrorCode::Ok).unwrap().with_client_filename("MyFile.txt");
        let b = UploadedFile::new("/tmp/upload/up1h4j1o", Some(123), UploadErrorCode::Ok).unwrap().with_client_filename("MyFile.txt");
        let c = UploadedFile::new("/tmp/upload/other", Some(123), UploadErrorCode::Ok).unwrap().with_client_filename("MyFile.txt");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
