//! Materializes a [`ServerRequest`] from transport variables.

use std::fmt;

use http::header::{CONTENT_TYPE, COOKIE};
use http::{HeaderMap, Method, Uri, Version};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::request::{Environment, Params, RequestError, ServerRequest, UriResolver};
use crate::stream::{MemoryStream, SharedStream, Stream, lock, shared};
use crate::upload::{UploadKey, UploadSpec, normalize_files};

/// Where a derivable request part comes from.
#[derive(Debug, Default)]
enum Source<T> {
    #[default]
    Empty,
    Given(T),
    Derived,
}

/// Builds a [`ServerRequest`] from an [`Environment`] and the raw sources a
/// server hands over alongside it.
///
/// Only the environment is required. Every other source is optional:
///
/// - headers default to the `HTTP_*` and `CONTENT_*` variables
/// - the body defaults to an empty in-memory stream
/// - cookies, query and parsed body default to empty, or can be derived from
///   the request itself with [`cookies_from_header`], [`query_from_uri`] and
///   [`parsed_body_from_form`]
/// - uploads default to none and are normalized on [`build`]
///
/// [`cookies_from_header`]: ServerRequestBuilder::cookies_from_header
/// [`query_from_uri`]: ServerRequestBuilder::query_from_uri
/// [`parsed_body_from_form`]: ServerRequestBuilder::parsed_body_from_form
/// [`build`]: ServerRequestBuilder::build
#[derive(Default)]
pub struct ServerRequestBuilder {
    environment: Environment,
    resolver: UriResolver,
    headers: Option<HeaderMap>,
    body: Option<SharedStream>,
    cookies: Source<Params>,
    query: Source<Params>,
    parsed_body: Source<Value>,
    files: IndexMap<UploadKey, UploadSpec>,
}

impl ServerRequestBuilder {
    pub fn new(environment: Environment) -> Self {
        Self { environment, ..Self::default() }
    }

    /// Uses `resolver` instead of the default [`UriResolver`].
    pub fn uri_resolver(mut self, resolver: UriResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn body(mut self, body: SharedStream) -> Self {
        self.body = Some(body);
        self
    }

    pub fn body_stream<S: Stream + 'static>(self, body: S) -> Self {
        self.body(shared(body))
    }

    pub fn cookies(mut self, cookies: Params) -> Self {
        self.cookies = Source::Given(cookies);
        self
    }

    /// Decodes the cookies from the `Cookie` header(s) on [`build`](Self::build).
    pub fn cookies_from_header(mut self) -> Self {
        self.cookies = Source::Derived;
        self
    }

    pub fn query(mut self, query: Params) -> Self {
        self.query = Source::Given(query);
        self
    }

    /// Decodes the query parameters from the resolved URI on [`build`](Self::build).
    pub fn query_from_uri(mut self) -> Self {
        self.query = Source::Derived;
        self
    }

    pub fn parsed_body(mut self, body: Value) -> Self {
        self.parsed_body = Source::Given(body);
        self
    }

    /// Decodes an `application/x-www-form-urlencoded` body into the parsed
    /// body on [`build`](Self::build).
    ///
    /// The body is read in full and rewound afterwards when it is seekable.
    /// Any other content type leaves the parsed body empty.
    pub fn parsed_body_from_form(mut self) -> Self {
        self.parsed_body = Source::Derived;
        self
    }

    /// Raw upload descriptions, normalized on [`build`](Self::build).
    pub fn files(mut self, files: IndexMap<UploadKey, UploadSpec>) -> Self {
        self.files = files;
        self
    }

    /// Assembles the request.
    ///
    /// # Errors
    ///
    /// - [`RequestError::InvalidFileSpec`] when the uploads are malformed
    /// - [`RequestError::InvalidUri`] when the resolved host and target still
    ///   do not form a URI
    /// - [`RequestError::Body`] when a form body cannot be read
    pub fn build(self) -> Result<ServerRequest, RequestError> {
        let Self { environment, resolver, headers, body, cookies, query, parsed_body, files } = self;

        let method = environment.non_empty("REQUEST_METHOD").map_or(Method::GET, request_method);
        let version = environment.non_empty("SERVER_PROTOCOL").map_or(Version::HTTP_11, protocol_version);
        let uri = resolver.resolve(&environment)?;
        let uploaded_files = normalize_files(files)?;

        let headers = headers.unwrap_or_else(|| environment.headers());
        let body = body.unwrap_or_else(|| shared(MemoryStream::default()));

        let cookies = match cookies {
            Source::Empty => Params::new(),
            Source::Given(cookies) => cookies,
            Source::Derived => cookies_from(&headers),
        };

        let query = match query {
            Source::Empty => Params::new(),
            Source::Given(query) => query,
            Source::Derived => query_from(&uri),
        };

        let parsed_body = match parsed_body {
            Source::Empty => None,
            Source::Given(parsed_body) => Some(parsed_body),
            Source::Derived => form_from(&headers, &body)?,
        };

        debug!(%method, %uri, uploads = uploaded_files.len(), "materialized server request");

        Ok(ServerRequest::new(method, uri)
            .with_version(version)
            .with_headers(headers)
            .with_body(body)
            .with_server_params(environment)
            .with_cookie_params(cookies)
            .with_query_params(query)
            .with_parsed_body(parsed_body)
            .with_uploaded_files(uploaded_files))
    }
}

impl fmt::Debug for ServerRequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerRequestBuilder")
            .field("environment", &self.environment)
            .field("resolver", &self.resolver)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("query", &self.query)
            .field("parsed_body", &self.parsed_body)
            .field("files", &self.files)
            .finish_non_exhaustive()
    }
}

fn protocol_version(protocol: &str) -> Version {
    match protocol {
        "HTTP/0.9" => Version::HTTP_09,
        "HTTP/1.0" => Version::HTTP_10,
        "HTTP/1.1" => Version::HTTP_11,
        "HTTP/2" | "HTTP/2.0" => Version::HTTP_2,
        "HTTP/3" | "HTTP/3.0" => Version::HTTP_3,
        other => {
            warn!(protocol = other, "unknown server protocol, assuming HTTP/1.1");
            Version::HTTP_11
        }
    }
}

fn decode_pairs(input: &str) -> Params {
    serde_urlencoded::from_str::<Vec<(String, String)>>(input)
        .map(|pairs| pairs.into_iter().filter(|(name, _)| !name.is_empty()).collect())
        .unwrap_or_else(|e| {
            warn!(cause = %e, "skipping undecodable parameters");
            Params::new()
        })
}

fn cookies_from(headers: &HeaderMap) -> Params {
    let pairs = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| match value.to_str() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(cause = %e, "skipping non visible ascii cookie header");
                None
            }
        })
        .flat_map(|value| value.split(';'))
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect::<Vec<_>>()
        .join("&");

    decode_pairs(&pairs)
}

fn request_method(method: &str) -> Method {
    Method::from_bytes(method.as_bytes()).unwrap_or_else(|e| {
        warn!(method, cause = %e, "invalid request method, assuming GET");
        Method::GET
    })
}

fn query_from(uri: &Uri) -> Params {
    uri.query().map(decode_pairs).unwrap_or_default()
}

fn form_from(headers: &HeaderMap, body: &SharedStream) -> Result<Option<Value>, RequestError> {
    let Some(content_type) = headers.get(CONTENT_TYPE) else {
        return Ok(None);
    };

    let is_form = content_type
        .to_str()
        .ok()
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .is_some_and(|media_type| media_type.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str());
    if !is_form {
        debug!(content_type = ?content_type, "body is not a form, leaving parsed body empty");
        return Ok(None);
    }

    let mut body = lock(body);
    if body.is_seekable() {
        body.rewind()?;
    }
    let contents = body.contents()?;
    if body.is_seekable() {
        body.rewind()?;
    }

    let form = decode_pairs(&String::from_utf8_lossy(&contents));
    Ok(Some(Value::Object(form.into_iter().map(|(name, value)| (name, Value::String(value))).collect())))
}
