//! Reconstruction of the absolute request URI from transport variables.

use std::borrow::Cow;

use http::Uri;
use http::uri::{Authority, Scheme};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use tracing::{debug, trace};

use crate::request::{Environment, RequestError};

/// Host used when the environment names none, or names an unusable one.
pub const DEFAULT_HOST: &str = "localhost";

/// Bytes a raw request target may carry that a URI must not. `%` is kept so
/// that existing escapes pass through untouched.
const TARGET_ENCODE_SET: &AsciiSet =
    &CONTROLS.add(b' ').add(b'"').add(b'#').add(b'<').add(b'>').add(b'\\').add(b'^').add(b'`').add(b'{').add(b'|').add(b'}');

/// Rebuilds the URI a client requested from a CGI style [`Environment`].
///
/// Resolution rules:
///
/// 1. The scheme is `https` when `HTTPS` is set to anything but an empty string
///    or `off`.
/// 2. The host comes from `HTTP_HOST`, then `SERVER_NAME`, then `SERVER_ADDR`.
///    A `Host` value that is not a valid `host[:port]` is not an error: the
///    [default host](UriResolver::default_host) is used instead.
/// 3. `SERVER_PORT` overrides the port of the `Host` value unless it is the
///    default port of the scheme.
/// 4. The path and query come from `REQUEST_URI`, split on the first `?`. A
///    non-empty `QUERY_STRING` takes precedence over the split query.
///    Characters a URI cannot hold, such as spaces or quotes, are
///    percent-encoded rather than rejected.
///
/// An empty environment resolves to `http://localhost`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriResolver {
    default_host: String,
}

impl Default for UriResolver {
    fn default() -> Self {
        Self { default_host: DEFAULT_HOST.to_string() }
    }
}

impl UriResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_host<S: Into<String>>(mut self, host: S) -> Self {
        self.default_host = host.into();
        self
    }

    pub fn default_host(&self) -> &str {
        &self.default_host
    }

    pub fn resolve(&self, env: &Environment) -> Result<Uri, RequestError> {
        let scheme = if env.non_empty("HTTPS").is_some_and(|https| https != "off") { Scheme::HTTPS } else { Scheme::HTTP };
        let default_port = if scheme == Scheme::HTTPS { 443 } else { 80 };

        let (host, mut port) = self.host_and_port(env);

        if let Some(server_port) = env.non_empty("SERVER_PORT") {
            match server_port.trim().parse::<u16>() {
                Ok(server_port) if server_port != default_port => port = Some(server_port),
                Ok(_) => {}
                Err(e) => debug!(server_port, cause = %e, "ignoring invalid server port"),
            }
        }

        let (path, query) = match env.get("REQUEST_URI") {
            Some(target) => match target.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (target, None),
            },
            None => ("", None),
        };
        let query = env.non_empty("QUERY_STRING").or(query).filter(|query| !query.is_empty());

        let mut uri = format!("{scheme}://{host}");
        if let Some(port) = port.filter(|port| *port != default_port) {
            uri.push(':');
            uri.push_str(&port.to_string());
        }
        if !path.is_empty() && !path.starts_with('/') {
            uri.push('/');
        }
        uri.extend(utf8_percent_encode(path, TARGET_ENCODE_SET));
        if let Some(query) = query {
            uri.push('?');
            uri.extend(utf8_percent_encode(query, TARGET_ENCODE_SET));
        }

        trace!(uri = %uri, "resolved request uri");
        uri.parse::<Uri>().map_err(|e| RequestError::invalid_uri(format!("{uri}: {e}")))
    }

    fn host_and_port<'a>(&'a self, env: &'a Environment) -> (Cow<'a, str>, Option<u16>) {
        if let Some(host) = env.non_empty("HTTP_HOST") {
            return match split_authority(host) {
                Some((host, port)) => (Cow::Borrowed(host), port),
                None => {
                    debug!(host, default_host = %self.default_host, "invalid host header, using default host");
                    (Cow::Borrowed(&self.default_host), None)
                }
            };
        }

        let fallback = env.non_empty("SERVER_NAME").or_else(|| env.non_empty("SERVER_ADDR"));
        match fallback {
            // bare IPv6 server address
            Some(host) if host.contains(':') && !host.starts_with('[') => (Cow::Owned(format!("[{host}]")), None),
            Some(host) if Authority::try_from(host).is_ok() => (Cow::Borrowed(host), None),
            Some(host) => {
                debug!(host, default_host = %self.default_host, "invalid server name, using default host");
                (Cow::Borrowed(&self.default_host), None)
            }
            None => (Cow::Borrowed(&self.default_host), None),
        }
    }
}

/// Splits a `Host` value into host and optional port.
///
/// Accepts `host`, `host:port`, `[ipv6]` and `[ipv6]:port`, splitting on the
/// last colon. Anything else, including a non-numeric port, yields `None`.
fn split_authority(authority: &str) -> Option<(&str, Option<u16>)> {
    let (host, port) = if authority.starts_with('[') {
        let end = authority.find(']')? + 1;
        match &authority[end..] {
            "" => (&authority[..end], None),
            tail => (&authority[..end], Some(tail.strip_prefix(':')?)),
        }
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    let unbracketed_colon = !host.starts_with('[') && host.contains(':');
    if host.is_empty() || host == "[]" || unbracketed_colon || Authority::try_from(host).is_err() {
        return None;
    }

    let port = match port {
        None => None,
        Some(port) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => Some(port.parse().ok()?),
        Some(_) => return None,
    };

    Some((host, port))
}

/// Resolves the request URI of `env` with the default [`UriResolver`].
pub fn uri_from_environment(env: &Environment) -> Result<Uri, RequestError> {
    UriResolver::default().resolve(env)
}
