//! Immutable description of an incoming request.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, Version};
use serde_json::Value;

use crate::request::Environment;
use crate::stream::{MemoryStream, SharedStream, shared};
use crate::upload::UploadedFiles;

/// Decoded cookie or query parameters.
pub type Params = BTreeMap<String, String>;

/// Request attributes attached by the application.
pub type Attributes = BTreeMap<String, Value>;

/// A request as seen by the application: the HTTP message plus everything the
/// server derived from it.
///
/// `ServerRequest` is a value. Every `with_*` method returns a new request and
/// leaves `self` untouched; unchanged parts are shared between both copies, so
/// cloning is cheap. The body stream is shared too, reading it through one
/// copy moves the cursor seen by all of them.
#[derive(Clone)]
pub struct ServerRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: Arc<HeaderMap>,
    body: SharedStream,
    server_params: Arc<Environment>,
    cookie_params: Arc<Params>,
    query_params: Arc<Params>,
    parsed_body: Option<Arc<Value>>,
    attributes: Arc<Attributes>,
    uploaded_files: Arc<UploadedFiles>,
}

impl ServerRequest {
    /// Creates an HTTP/1.1 request with no headers, an empty body and no
    /// server derived data.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: Arc::default(),
            body: shared(MemoryStream::default()),
            server_params: Arc::default(),
            cookie_params: Arc::default(),
            query_params: Arc::default(),
            parsed_body: None,
            attributes: Arc::default(),
            uploaded_files: Arc::default(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &SharedStream {
        &self.body
    }

    /// The transport variables the request was built from.
    pub fn server_params(&self) -> &Environment {
        &self.server_params
    }

    pub fn cookie_params(&self) -> &Params {
        &self.cookie_params
    }

    pub fn query_params(&self) -> &Params {
        &self.query_params
    }

    /// The decoded body, if any decoder ran.
    pub fn parsed_body(&self) -> Option<&Value> {
        self.parsed_body.as_deref()
    }

    pub fn uploaded_files(&self) -> &UploadedFiles {
        &self.uploaded_files
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Returns the attribute `name`. An attribute explicitly set to
    /// [`Value::Null`] is returned as such.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Returns the attribute `name`, or `default` when it was never set.
    pub fn attribute_or<'a>(&'a self, name: &str, default: &'a Value) -> &'a Value {
        self.attribute(name).unwrap_or(default)
    }

    pub fn with_method(&self, method: Method) -> Self {
        self.derive(|request| request.method = method)
    }

    pub fn with_uri(&self, uri: Uri) -> Self {
        self.derive(|request| request.uri = uri)
    }

    pub fn with_version(&self, version: Version) -> Self {
        self.derive(|request| request.version = version)
    }

    pub fn with_headers(&self, headers: HeaderMap) -> Self {
        self.derive(|request| request.headers = Arc::new(headers))
    }

    /// Replaces every value of header `name` with `value`.
    pub fn with_header(&self, name: HeaderName, value: HeaderValue) -> Self {
        self.derive(|request| {
            Arc::make_mut(&mut request.headers).insert(name, value);
        })
    }

    pub fn with_body(&self, body: SharedStream) -> Self {
        self.derive(|request| request.body = body)
    }

    pub fn with_server_params(&self, params: Environment) -> Self {
        self.derive(|request| request.server_params = Arc::new(params))
    }

    pub fn with_cookie_params(&self, params: Params) -> Self {
        self.derive(|request| request.cookie_params = Arc::new(params))
    }

    pub fn with_query_params(&self, params: Params) -> Self {
        self.derive(|request| request.query_params = Arc::new(params))
    }

    /// Replaces the decoded body; `None` clears it.
    pub fn with_parsed_body(&self, body: Option<Value>) -> Self {
        self.derive(|request| request.parsed_body = body.map(Arc::new))
    }

    pub fn with_uploaded_files(&self, files: UploadedFiles) -> Self {
        self.derive(|request| request.uploaded_files = Arc::new(files))
    }

    pub fn with_attribute<K: Into<String>, V: Into<Value>>(&self, name: K, value: V) -> Self {
        self.derive(|request| {
            Arc::make_mut(&mut request.attributes).insert(name.into(), value.into());
        })
    }

    pub fn without_attribute(&self, name: &str) -> Self {
        if !self.attributes.contains_key(name) {
            return self.clone();
        }
        self.derive(|request| {
            Arc::make_mut(&mut request.attributes).remove(name);
        })
    }

    fn derive<F: FnOnce(&mut Self)>(&self, change: F) -> Self {
        let mut request = self.clone();
        change(&mut request);
        request
    }
}

impl fmt::Debug for ServerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerRequest")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .field("body", &format_args!(".."))
            .field("cookie_params", &self.cookie_params)
            .field("query_params", &self.query_params)
            .field("parsed_body", &self.parsed_body)
            .field("attributes", &self.attributes)
            .field("uploaded_files", &self.uploaded_files)
            .finish_non_exhaustive()
    }
}
