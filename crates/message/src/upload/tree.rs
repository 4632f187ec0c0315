//! Raw and normalized upload trees.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

use crate::upload::UploadedFile;

/// Key of an entry in an upload tree.
///
/// Form field names such as `files[0]` or `files[avatar]` produce integer and
/// string keys respectively. Strings holding a canonical non-negative integer
/// are stored as [`UploadKey::Index`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UploadKey {
    Index(u64),
    Name(String),
}

impl UploadKey {
    pub fn as_index(&self) -> Option<u64> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Name(_) => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Index(_) => None,
            Self::Name(name) => Some(name),
        }
    }
}

fn canonical_index(key: &str) -> Option<u64> {
    let canonical = key == "0" || (!key.starts_with('0') && !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()));
    if canonical { key.parse().ok() } else { None }
}

impl From<u64> for UploadKey {
    fn from(index: u64) -> Self {
        Self::Index(index)
    }
}

impl From<usize> for UploadKey {
    fn from(index: usize) -> Self {
        Self::Index(index as u64)
    }
}

impl From<&str> for UploadKey {
    fn from(key: &str) -> Self {
        canonical_index(key).map_or_else(|| Self::Name(key.to_string()), Self::Index)
    }
}

impl From<String> for UploadKey {
    fn from(key: String) -> Self {
        canonical_index(&key).map_or(Self::Name(key), Self::Index)
    }
}

impl fmt::Display for UploadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Upload data as delivered by the server, before normalization.
///
/// Leaves are either scalar field values (`name`, `type`, `tmp_name`, `error`,
/// `size`) or already built [`UploadedFile`]s; nested nodes mirror the form
/// field structure.
#[derive(Debug, PartialEq)]
pub enum UploadSpec {
    Scalar(String),
    File(UploadedFile),
    Nested(IndexMap<UploadKey, UploadSpec>),
}

impl UploadSpec {
    /// An empty nested node.
    pub fn empty() -> Self {
        Self::Nested(IndexMap::new())
    }

    pub fn nested<K, V, I>(entries: I) -> Self
    where
        K: Into<UploadKey>,
        V: Into<UploadSpec>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Nested(entries.into_iter().map(|(key, value)| (key.into(), value.into())).collect())
    }
}

impl Default for UploadSpec {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<&str> for UploadSpec {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for UploadSpec {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<UploadedFile> for UploadSpec {
    fn from(file: UploadedFile) -> Self {
        Self::File(file)
    }
}

impl From<IndexMap<UploadKey, UploadSpec>> for UploadSpec {
    fn from(entries: IndexMap<UploadKey, UploadSpec>) -> Self {
        Self::Nested(entries)
    }
}

impl From<UploadTree> for UploadSpec {
    fn from(tree: UploadTree) -> Self {
        match tree {
            UploadTree::File(file) => Self::File(file),
            UploadTree::Nested(entries) => entries.into(),
        }
    }
}

impl From<UploadedFiles> for UploadSpec {
    fn from(files: UploadedFiles) -> Self {
        Self::Nested(files.into_iter().map(|(key, tree)| (key, tree.into())).collect())
    }
}

/// Builds a raw spec from JSON, e.g. a decoded multipart summary.
///
/// Arrays produce integer keys, objects keep their key order and scalars are
/// converted to their string form (`null` becomes an empty string).
impl From<Value> for UploadSpec {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Scalar(String::new()),
            Value::Bool(b) => Self::Scalar(b.to_string()),
            Value::Number(n) => Self::Scalar(n.to_string()),
            Value::String(s) => Self::Scalar(s),
            Value::Array(items) => Self::nested(items.into_iter().enumerate()),
            Value::Object(entries) => Self::nested(entries),
        }
    }
}

/// Normalized upload tree: the shape of the form fields with one
/// [`UploadedFile`] per leaf.
#[derive(Debug, PartialEq)]
pub enum UploadTree {
    File(UploadedFile),
    Nested(UploadedFiles),
}

/// Top-level collection of normalized uploads, keyed by form field.
pub type UploadedFiles = IndexMap<UploadKey, UploadTree>;

impl UploadTree {
    pub fn as_file(&self) -> Option<&UploadedFile> {
        match self {
            Self::File(file) => Some(file),
            Self::Nested(_) => None,
        }
    }

    pub fn as_nested(&self) -> Option<&UploadedFiles> {
        match self {
            Self::File(_) => None,
            Self::Nested(entries) => Some(entries),
        }
    }

    /// Returns the child stored under `key` when this is a nested node.
    pub fn get<K: Into<UploadKey>>(&self, key: K) -> Option<&UploadTree> {
        self.as_nested().and_then(|entries| entries.get(&key.into()))
    }

    /// Iterates over every file of the tree, depth first.
    pub fn files(&self) -> Box<dyn Iterator<Item = &UploadedFile> + '_> {
        match self {
            Self::File(file) => Box::new(std::iter::once(file)),
            Self::Nested(entries) => Box::new(entries.values().flat_map(UploadTree::files)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn numeric_strings_become_index_keys() {
        assert_eq!(UploadKey::from("0"), UploadKey::Index(0));
        assert_eq!(UploadKey::from("42"), UploadKey::Index(42));
        assert_eq!(UploadKey::from("042"), UploadKey::Name("042".to_string()));
        assert_eq!(UploadKey::from("-1"), UploadKey::Name("-1".to_string()));
        assert_eq!(UploadKey::from(""), UploadKey::Name(String::new()));
        assert_eq!(UploadKey::from("avatar"), UploadKey::Name("avatar".to_string()));
    }

    #[test]
    fn json_keeps_shape_and_order() {
        let spec = UploadSpec::from(json!({
            "zeta": ["a", 2],
            "alpha": { "1": null },
        }));

        let UploadSpec::Nested(entries) = spec else { panic!("expected nested spec") };
        let keys: Vec<_> = entries.keys().cloned().collect();
        assert_eq!(keys, vec![UploadKey::from("zeta"), UploadKey::from("alpha")]);

        assert_eq!(
            entries[&UploadKey::from("zeta")],
            UploadSpec::nested([(0_usize, "a"), (1, "2")])
        );
        assert_eq!(entries[&UploadKey::from("alpha")], UploadSpec::nested([(1_u64, "")]));
    }

    #[test]
    fn walks_files_depth_first() {
        let file = |path: &str| UploadedFile::new(path, None, crate::upload::UploadErrorCode::Ok).unwrap();
        let tree = UploadTree::Nested(UploadedFiles::from([
            (UploadKey::from("avatar"), UploadTree::File(file("/tmp/a"))),
            (
                UploadKey::from("docs"),
                UploadTree::Nested(UploadedFiles::from([
                    (UploadKey::from(0_u64), UploadTree::File(file("/tmp/b"))),
                    (UploadKey::from(1_u64), UploadTree::File(file("/tmp/c"))),
                ])),
            ),
        ]));

        assert_eq!(tree.files().count(), 3);
        assert_eq!(tree.get("docs").and_then(|docs| docs.get(1_u64)), Some(&UploadTree::File(file("/tmp/c"))));
        assert!(tree.get("missing").is_none());
        assert!(tree.as_file().is_none());
    }
}
