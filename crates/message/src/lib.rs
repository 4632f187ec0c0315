//! Server-side HTTP message primitives
//!
//! This crate provides the building blocks a server uses to hand an incoming
//! request to an application: synchronous byte streams with explicit
//! capabilities, uploaded files that can be moved exactly once, and the
//! materialization of a complete request from CGI style transport variables.
//!
//! # Example
//!
//! ```no_run
//! use micro_message::request::{Environment, ServerRequestBuilder};
//! use micro_message::stream::{FileStream, lock};
//! use tracing::{error, info, Level};
//! use tracing_subscriber::FmtSubscriber;
//!
//! let subscriber = FmtSubscriber::builder()
//!     .with_max_level(Level::INFO)
//!     .finish();
//! tracing::subscriber::set_global_default(subscriber)
//!     .expect("setting default subscriber failed");
//!
//! let body = match FileStream::open("/dev/stdin") {
//!     Ok(body) => body,
//!     Err(e) => {
//!         error!(cause = %e, "failed to open request body");
//!         return;
//!     }
//! };
//!
//! let request = match ServerRequestBuilder::new(Environment::from_process())
//!     .body_stream(body)
//!     .cookies_from_header()
//!     .query_from_uri()
//!     .parsed_body_from_form()
//!     .build()
//! {
//!     Ok(request) => request,
//!     Err(e) => {
//!         error!(cause = %e, "failed to materialize request");
//!         return;
//!     }
//! };
//!
//! info!(method = %request.method(), uri = %request.uri(), "received request");
//! info!(body = %lock(request.body()).to_string_lossy(), "request body");
//! ```
//!
//! # Architecture
//!
//! - [`stream`]: the [`Stream`](stream::Stream) capability and its
//!   implementations: a bounded FIFO buffer, a pull stream fed by a producer
//!   and a transparent proxy
//! - [`upload`]: uploaded files, their error codes and the normalization of raw
//!   upload descriptions into trees of files
//! - [`request`]: transport variables, URI resolution and the immutable
//!   [`ServerRequest`](request::ServerRequest)
//!
//! # Error Handling
//!
//! Each module has its own error type built with `thiserror`:
//!
//! - [`stream::StreamError`]: unsupported operations, misconfigured proxies and
//!   I/O or producer failures
//! - [`upload::UploadError`]: invalid arguments, upload error codes and repeated
//!   moves
//! - [`request::RequestError`]: malformed upload specifications and invalid
//!   request lines
//!
//! [`MessageError`] aggregates all three for callers that do not care which
//! layer failed.
//!
//! Converting a stream to a string is the one operation that does not fail:
//! read errors are logged through `tracing` and the partial content is
//! returned.
//!
//! # Limitations
//!
//! - Everything is synchronous; streams are meant for a single reader at a time
//! - Multipart bodies are not decoded, uploads are described by the caller
//! - Query and form decoding produce flat string maps

pub mod request;
pub mod stream;
pub mod upload;

mod error;
pub use error::MessageError;

mod utils;
pub(crate) use utils::ensure;

#[cfg(test)]
mod test_support;
