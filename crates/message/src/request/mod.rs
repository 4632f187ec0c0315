//! Server-side requests materialized from CGI style transport variables.
//!
//! An [`Environment`] holds the variables a server passes along with a
//! request. [`UriResolver`] rebuilds the absolute request URI from them and
//! [`ServerRequestBuilder`] assembles the complete [`ServerRequest`]: method,
//! URI, headers, body, cookies, query, parsed body and uploaded files.
//!
//! ```
//! use micro_message::request::{Environment, ServerRequestBuilder};
//!
//! let env = Environment::from([
//!     ("REQUEST_METHOD", "GET"),
//!     ("HTTP_HOST", "example.org"),
//!     ("REQUEST_URI", "/search?q=rust"),
//! ]);
//!
//! let request = ServerRequestBuilder::new(env).query_from_uri().build().unwrap();
//!
//! assert_eq!(request.uri().host(), Some("example.org"));
//! assert_eq!(request.uri().path(), "/search");
//! assert_eq!(request.query_params()["q"], "rust");
//! ```

mod builder;
mod environment;
mod error;
mod server_request;
mod uri_resolver;

pub use builder::ServerRequestBuilder;
pub use environment::Environment;
pub use error::RequestError;
pub use server_request::Attributes;
pub use server_request::Params;
pub use server_request::ServerRequest;
pub use uri_resolver::DEFAULT_HOST;
pub use uri_resolver::UriResolver;
pub use uri_resolver::uri_from_environment;
