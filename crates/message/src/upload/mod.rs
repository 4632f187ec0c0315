//! Uploaded files and the normalization of raw upload descriptions.
//!
//! An [`UploadedFile`] wraps the bytes of one upload together with what the
//! client reported about it. Raw upload data arrives as an [`UploadSpec`] tree
//! and is turned into [`UploadedFiles`] by [`normalize_files`].

mod error;
mod error_code;
mod normalizer;
mod tree;
mod uploaded_file;

pub use error::UploadError;
pub use error_code::UploadErrorCode;
pub use normalizer::normalize;
pub use normalizer::normalize_files;
pub use tree::UploadKey;
pub use tree::UploadSpec;
pub use tree::UploadTree;
pub use tree::UploadedFiles;
pub use uploaded_file::UploadSource;
pub use uploaded_file::UploadedFile;
