use thiserror::Error;

use crate::stream::StreamError;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid value in files specification: {reason}")]
    InvalidFileSpec { reason: String },

    #[error("invalid request uri: {reason}")]
    InvalidUri { reason: String },

    #[error("invalid request body: {source}")]
    Body {
        #[from]
        source: StreamError,
    },
}

impl RequestError {
    pub fn invalid_file_spec<S: ToString>(str: S) -> Self {
        Self::InvalidFileSpec { reason: str.to_string() }
    }

    pub fn invalid_uri<S: ToString>(str: S) -> Self {
        Self::InvalidUri { reason: str.to_string() }
    }
}
