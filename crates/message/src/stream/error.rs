use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// Boxed error returned by user supplied producers and factories.
pub type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("unsupported operation: {reason}")]
    UnsupportedOperation { reason: String },

    #[error("invalid access to `{name}`: only `stream` is available")]
    InvalidAccess { name: String },

    #[error("stream proxy is misconfigured: {reason}")]
    Misconfiguration { reason: String },

    #[error("stream is detached")]
    Detached,

    #[error("producer failed: {source}")]
    Producer { source: BoxError },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl StreamError {
    pub fn unsupported<S: ToString>(str: S) -> Self {
        Self::UnsupportedOperation { reason: str.to_string() }
    }

    pub fn invalid_access<S: ToString>(name: S) -> Self {
        Self::InvalidAccess { name: name.to_string() }
    }

    pub fn misconfiguration<S: ToString>(str: S) -> Self {
        Self::Misconfiguration { reason: str.to_string() }
    }

    pub fn producer<E: Into<BoxError>>(e: E) -> Self {
        Self::Producer { source: e.into() }
    }
}
