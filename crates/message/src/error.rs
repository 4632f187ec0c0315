use thiserror::Error;

use crate::request::RequestError;
use crate::stream::StreamError;
use crate::upload::UploadError;

/// Top-level error covering every fallible operation of the crate.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("stream error: {source}")]
    StreamError {
        #[from]
        source: StreamError,
    },

    #[error("upload error: {source}")]
    UploadError {
        #[from]
        source: UploadError,
    },

    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: RequestError,
    },
}
