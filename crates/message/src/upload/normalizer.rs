//! Turns raw upload field groups into [`UploadedFile`] trees.
//!
//! Servers describe uploads with five parallel fields per form field: `name`,
//! `type`, `tmp_name`, `error` and `size`. A field that accepts several files
//! (`files[]`, `files[avatar][]`, ...) nests each of the five fields instead of
//! nesting the groups, so the groups have to be rotated back into shape.

use indexmap::IndexMap;
use tracing::trace;

use crate::request::RequestError;
use crate::upload::{UploadErrorCode, UploadKey, UploadSpec, UploadTree, UploadedFile, UploadedFiles};

const NAME: &str = "name";
const TYPE: &str = "type";
const TMP_NAME: &str = "tmp_name";
const ERROR: &str = "error";
const SIZE: &str = "size";

/// Normalizes the top-level upload collection of a request.
///
/// Every entry must either be an [`UploadedFile`] already, a field group, or a
/// nested collection of those. The output keeps the keys and order of the
/// input.
pub fn normalize_files(files: IndexMap<UploadKey, UploadSpec>) -> Result<UploadedFiles, RequestError> {
    files
        .into_iter()
        .map(|(key, spec)| normalize(spec).map(|tree| (key, tree)))
        .collect()
}

/// Normalizes a single node of an upload tree.
pub fn normalize(spec: UploadSpec) -> Result<UploadTree, RequestError> {
    match classify(spec) {
        NodeKind::Descriptor(file) => Ok(UploadTree::File(file)),
        NodeKind::FlatGroup(group) => group.into_file().map(UploadTree::File),
        NodeKind::GroupedFields(group) => {
            trace!(entries = group.tmp_name.len(), "rotating grouped upload fields");
            group
                .rotate()?
                .into_iter()
                .map(|(key, spec)| normalize(spec).map(|tree| (key, tree)))
                .collect::<Result<UploadedFiles, _>>()
                .map(UploadTree::Nested)
        }
        NodeKind::Collection(entries) => normalize_files(entries).map(UploadTree::Nested),
        NodeKind::Invalid(reason) => Err(RequestError::invalid_file_spec(reason)),
    }
}

enum NodeKind {
    Descriptor(UploadedFile),
    FlatGroup(FlatGroup),
    GroupedFields(GroupedFields),
    Collection(IndexMap<UploadKey, UploadSpec>),
    Invalid(String),
}

fn classify(spec: UploadSpec) -> NodeKind {
    let mut entries = match spec {
        UploadSpec::File(file) => return NodeKind::Descriptor(file),
        UploadSpec::Scalar(value) => return NodeKind::Invalid(format!("unexpected scalar `{value}`")),
        UploadSpec::Nested(entries) => entries,
    };

    let tmp_name = match entries.shift_remove(&UploadKey::from(TMP_NAME)) {
        None => return NodeKind::Collection(entries),
        Some(tmp_name) => tmp_name,
    };

    let mut field = |name: &str| entries.shift_remove(&UploadKey::from(name));
    let (name, media_type, error, size) = (field(NAME), field(TYPE), field(ERROR), field(SIZE));
    let Some(error) = error else {
        return NodeKind::Invalid("upload field group without `error`".to_string());
    };

    match tmp_name {
        UploadSpec::Scalar(tmp_name) => {
            let fields = (scalar(name), scalar(media_type), scalar(Some(error)), scalar(size));
            match fields {
                (Ok(name), Ok(media_type), Ok(Some(error)), Ok(size)) => NodeKind::FlatGroup(FlatGroup {
                    name,
                    media_type,
                    tmp_name,
                    error,
                    size,
                }),
                _ => NodeKind::Invalid(format!("upload `{tmp_name}` mixes nested and scalar fields")),
            }
        }
        UploadSpec::Nested(tmp_name) => NodeKind::GroupedFields(GroupedFields {
            name,
            media_type,
            tmp_name,
            error,
            size,
        }),
        UploadSpec::File(_) => NodeKind::Invalid("`tmp_name` holds an uploaded file".to_string()),
    }
}

fn scalar(spec: Option<UploadSpec>) -> Result<Option<String>, ()> {
    match spec {
        None => Ok(None),
        Some(UploadSpec::Scalar(value)) => Ok(Some(value)),
        Some(_) => Err(()),
    }
}

/// The fields describing one upload.
struct FlatGroup {
    name: Option<String>,
    media_type: Option<String>,
    tmp_name: String,
    error: String,
    size: Option<String>,
}

impl FlatGroup {
    fn into_file(self) -> Result<UploadedFile, RequestError> {
        let error = self
            .error
            .parse::<UploadErrorCode>()
            .map_err(RequestError::invalid_file_spec)?;

        // an unparseable size is reported as unknown
        let size = self.size.and_then(|size| size.trim().parse::<u64>().ok());

        let mut file = UploadedFile::new(self.tmp_name, size, error).map_err(RequestError::invalid_file_spec)?;
        if let Some(name) = self.name {
            file = file.with_client_filename(name);
        }
        if let Some(media_type) = self.media_type {
            file = file.with_client_media_type(media_type);
        }
        Ok(file)
    }
}

/// Five parallel collections describing several uploads.
struct GroupedFields {
    name: Option<UploadSpec>,
    media_type: Option<UploadSpec>,
    tmp_name: IndexMap<UploadKey, UploadSpec>,
    error: UploadSpec,
    size: Option<UploadSpec>,
}

impl GroupedFields {
    /// Splits the parallel collections into one field group per `tmp_name` key.
    ///
    /// Each produced group may itself still be grouped when the input is nested
    /// more than one level deep.
    fn rotate(self) -> Result<IndexMap<UploadKey, UploadSpec>, RequestError> {
        let Self { name, media_type, tmp_name, error, size } = self;

        let mut name = into_entries(name, NAME)?;
        let mut media_type = into_entries(media_type, TYPE)?;
        let mut error = into_entries(Some(error), ERROR)?;
        let mut size = into_entries(size, SIZE)?;

        tmp_name
            .into_iter()
            .map(|(key, tmp_name)| {
                let error = error
                    .shift_remove(&key)
                    .ok_or_else(|| RequestError::invalid_file_spec(format!("missing `error` for upload `{key}`")))?;

                let mut group = IndexMap::with_capacity(5);
                if let Some(name) = name.shift_remove(&key) {
                    group.insert(UploadKey::from(NAME), name);
                }
                if let Some(media_type) = media_type.shift_remove(&key) {
                    group.insert(UploadKey::from(TYPE), media_type);
                }
                group.insert(UploadKey::from(TMP_NAME), tmp_name);
                group.insert(UploadKey::from(ERROR), error);
                if let Some(size) = size.shift_remove(&key) {
                    group.insert(UploadKey::from(SIZE), size);
                }

                Ok((key, UploadSpec::Nested(group)))
            })
            .collect()
    }
}

fn into_entries(spec: Option<UploadSpec>, field: &str) -> Result<IndexMap<UploadKey, UploadSpec>, RequestError> {
    match spec {
        None => Ok(IndexMap::new()),
        Some(UploadSpec::Nested(entries)) => Ok(entries),
        Some(_) => Err(RequestError::invalid_file_spec(format!(
            "`{field}` must be nested like `tmp_name`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;

    fn spec(value: Value) -> IndexMap<UploadKey, UploadSpec> {
        match UploadSpec::from(value) {
            UploadSpec::Nested(entries) => entries,
            other => panic!("expected nested spec, got {other:?}"),
        }
    }

    fn file(path: &str, size: u64, error: UploadErrorCode, name: &str, media_type: &str) -> UploadedFile {
        UploadedFile::new(path, Some(size), error)
            .unwrap()
            .with_client_filename(name)
            .with_client_media_type(media_type)
    }

    fn text_file() -> UploadedFile {
        file("/tmp/upload/up1h4j1o", 123, UploadErrorCode::Ok, "MyFile.txt", "text/plain")
    }

    fn missing_file() -> UploadedFile {
        file("", 0, UploadErrorCode::NoFile, "", "")
    }

    fn tree<K: Into<UploadKey>, I: IntoIterator<Item = (K, UploadTree)>>(entries: I) -> UploadTree {
        UploadTree::Nested(entries.into_iter().map(|(key, tree)| (key.into(), tree)).collect())
    }

    fn files<K: Into<UploadKey>, I: IntoIterator<Item = (K, UploadTree)>>(entries: I) -> UploadedFiles {
        entries.into_iter().map(|(key, tree)| (key.into(), tree)).collect()
    }

    #[rstest]
    #[case::single_file(
        spec(json!({
            "file": {
                "name": "MyFile.txt",
                "type": "text/plain",
                "tmp_name": "/tmp/upload/up1h4j1o",
                "error": "0",
                "size": "123"
            }
        })),
        files([("file", UploadTree::File(text_file()))])
    )]
    #[case::empty_file(
        spec(json!({
            "image_file": { "name": "", "type": "", "tmp_name": "", "error": "4", "size": "0" }
        })),
        files([("image_file", UploadTree::File(missing_file()))])
    )]
    #[case::already_converted(
        IndexMap::from([(UploadKey::from("file"), UploadSpec::File(text_file()))]),
        files([("file", UploadTree::File(text_file()))])
    )]
    #[case::already_converted_collection(
        IndexMap::from([(
            UploadKey::from("file"),
            UploadSpec::nested([(0_u64, text_file()), (1, missing_file())]),
        )]),
        files([("file", tree([(0_u64, UploadTree::File(text_file())), (1, UploadTree::File(missing_file()))]))])
    )]
    #[case::multiple_files(
        spec(json!({
            "text_file": {
                "name": "MyFile.txt",
                "type": "text/plain",
                "tmp_name": "/tmp/upload/up1h4j1o",
                "error": "0",
                "size": "123"
            },
            "image_file": { "name": "", "type": "", "tmp_name": "", "error": "4", "size": "0" }
        })),
        files([
            ("text_file", UploadTree::File(text_file())),
            ("image_file", UploadTree::File(missing_file())),
        ])
    )]
    #[case::nested_files(
        spec(json!({
            "file": {
                "name": ["MyFile.txt", "Image.png"],
                "type": ["text/plain", "image/png"],
                "tmp_name": ["/tmp/upload/hp9hskjhf", "/tmp/upload/up1h4j1o"],
                "error": ["0", "0"],
                "size": ["123", "7349"]
            },
            "nested": {
                "name": { "other": "Flag.txt", "test": ["Stuff.txt", ""] },
                "type": { "other": "text/plain", "test": ["text/plain", ""] },
                "tmp_name": { "other": "/tmp/upload/hp9hskjhf", "test": ["/tmp/upload/asifu2gp3", ""] },
                "error": { "other": "0", "test": ["0", "4"] },
                "size": { "other": "421", "test": ["32", "0"] }
            }
        })),
        files([
            (
                "file",
                tree([
                    (0_u64, UploadTree::File(file("/tmp/upload/hp9hskjhf", 123, UploadErrorCode::Ok, "MyFile.txt", "text/plain"))),
                    (1, UploadTree::File(file("/tmp/upload/up1h4j1o", 7349, UploadErrorCode::Ok, "Image.png", "image/png"))),
                ]),
            ),
            (
                "nested",
                tree([
                    ("other", UploadTree::File(file("/tmp/upload/hp9hskjhf", 421, UploadErrorCode::Ok, "Flag.txt", "text/plain"))),
                    (
                        "test",
                        tree([
                            (0_u64, UploadTree::File(file("/tmp/upload/asifu2gp3", 32, UploadErrorCode::Ok, "Stuff.txt", "text/plain"))),
                            (1, UploadTree::File(missing_file())),
                        ]),
                    ),
                ]),
            ),
        ])
    )]
    fn normalizes_upload_specs(#[case] input: IndexMap<UploadKey, UploadSpec>, #[case] expected: UploadedFiles) {
        let actual = normalize_files(input).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn preserves_nested_key_order() {
        let actual = normalize_files(spec(json!({
            "nested": {
                "name": { "test": ["Stuff.txt"], "other": "Flag.txt" },
                "tmp_name": { "test": ["/tmp/a"], "other": "/tmp/b" },
                "error": { "test": ["0"], "other": "0" }
            }
        })))
        .unwrap();

        let nested = actual[&UploadKey::from("nested")].as_nested().unwrap();
        let keys: Vec<_> = nested.keys().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["test", "other"]);

        let stuff = actual[&UploadKey::from("nested")].get("test").and_then(|t| t.get(0_u64)).unwrap();
        assert_eq!(stuff.as_file().unwrap().client_filename(), Some("Stuff.txt"));
    }

    #[test]
    fn normalizing_twice_is_idempotent() {
        let input = json!({
            "file": {
                "name": ["a.txt", "b.txt"],
                "tmp_name": ["/tmp/a", "/tmp/b"],
                "error": [0, 0],
                "size": [1, 2]
            }
        });

        let once = normalize_files(spec(input.clone())).unwrap();
        let UploadSpec::Nested(again) = UploadSpec::from(normalize_files(spec(input)).unwrap()) else {
            panic!("expected nested spec");
        };
        let twice = normalize_files(again).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn optional_fields_may_be_missing() {
        let actual = normalize_files(spec(json!({
            "file": { "tmp_name": "/tmp/a", "error": 0, "size": "n/a", "full_path": "a.txt" }
        })))
        .unwrap();

        let file = actual[&UploadKey::from("file")].as_file().unwrap();
        assert_eq!(file.size(), None);
        assert_eq!(file.client_filename(), None);
        assert_eq!(file.client_media_type(), None);
        assert_eq!(file.error(), UploadErrorCode::Ok);
    }

    #[rstest]
    #[case::scalar_entry(json!({ "test": "something" }))]
    #[case::missing_error(json!({ "file": { "tmp_name": "/tmp/a" } }))]
    #[case::unknown_error_code(json!({ "file": { "tmp_name": "/tmp/a", "error": "5" } }))]
    #[case::empty_path(json!({ "file": { "tmp_name": "", "error": "0" } }))]
    #[case::scalar_error_for_grouped(json!({ "file": { "tmp_name": ["/tmp/a"], "error": "0" } }))]
    #[case::missing_grouped_error(json!({ "file": { "tmp_name": ["/tmp/a", "/tmp/b"], "error": ["0"] } }))]
    #[case::nested_error_for_single(json!({ "file": { "tmp_name": "/tmp/a", "error": ["0"] } }))]
    fn rejects_invalid_specs(#[case] input: Value) {
        let err = normalize_files(spec(input)).unwrap_err();
        assert!(matches!(err, RequestError::InvalidFileSpec { .. }));
        assert!(err.to_string().starts_with("invalid value in files specification"));
    }
}
