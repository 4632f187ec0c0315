//! Transport variables a request is materialized from.

use std::collections::BTreeMap;
use std::collections::btree_map;

use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Variables without the `HTTP_` prefix that still describe request headers.
const CONTENT_HEADERS: [(&str, &str); 3] = [
    ("CONTENT_TYPE", "content-type"),
    ("CONTENT_LENGTH", "content-length"),
    ("CONTENT_MD5", "content-md5"),
];

/// A flat map of transport variables, as handed over by a CGI style server.
///
/// Typical keys are `REQUEST_METHOD`, `REQUEST_URI`, `QUERY_STRING`, `HTTPS`,
/// `SERVER_NAME`, `SERVER_PORT` and one `HTTP_*` entry per request header.
/// The environment is an input only: materializing a request never alters it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the variables of the current process.
    ///
    /// Variables whose name or value is not valid unicode are skipped.
    pub fn from_process() -> Self {
        std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Returns the value of `key` unless it is missing or empty.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) -> Option<String> {
        self.vars.insert(key.into(), value.into())
    }

    pub fn with<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.vars.iter()
    }

    /// Derives request headers from the `HTTP_*` and `CONTENT_*` variables.
    ///
    /// `HTTP_ACCEPT_LANGUAGE` becomes `accept-language`. Entries that do not
    /// form a valid header name or value are skipped with a warning.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (key, value) in &self.vars {
            let name = match key.strip_prefix("HTTP_") {
                Some(name) => name.replace('_', "-").to_ascii_lowercase(),
                None => match CONTENT_HEADERS.iter().find(|(var, _)| var == key) {
                    Some((_, name)) => (*name).to_string(),
                    None => continue,
                },
            };

            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                (Err(e), _) => warn!(variable = %key, cause = %e, "skipping invalid header name"),
                (_, Err(e)) => warn!(variable = %key, cause = %e, "skipping invalid header value"),
            }
        }

        headers
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { vars: iter.into_iter().map(|(key, value)| (key.into(), value.into())).collect() }
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Environment {
    fn from(vars: [(K, V); N]) -> Self {
        vars.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a Environment {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.vars.iter()
    }
}
