use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::stream::StreamError;
use crate::upload::UploadErrorCode;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("uploaded file has already been moved")]
    AlreadyMoved,

    #[error("cannot access uploaded file due to upload error: {code}")]
    Upload { code: UploadErrorCode },

    #[error("uploaded file could not be moved to {}: {source}", target.display())]
    Move { target: PathBuf, source: io::Error },

    #[error("stream error: {source}")]
    Stream {
        #[from]
        source: StreamError,
    },
}

impl UploadError {
    pub fn invalid_argument<S: ToString>(str: S) -> Self {
        Self::InvalidArgument { reason: str.to_string() }
    }

    pub fn moving<P: Into<PathBuf>>(target: P, source: io::Error) -> Self {
        Self::Move { target: target.into(), source }
    }
}
