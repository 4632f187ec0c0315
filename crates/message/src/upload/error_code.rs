use std::fmt;
use std::str::FromStr;

use crate::upload::UploadError;

/// Outcome reported by the server for one uploaded file.
///
/// The numeric values follow the codes used by form-upload front ends; `5` is
/// unassigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum UploadErrorCode {
    #[default]
    Ok,
    /// The file exceeds the server-wide upload size limit.
    IniSize,
    /// The file exceeds the size limit declared by the form.
    FormSize,
    Partial,
    NoFile,
    NoTmpDir,
    CantWrite,
    /// A server extension stopped the upload.
    Extension,
}

impl UploadErrorCode {
    pub const ALL: [UploadErrorCode; 8] = [
        Self::Ok,
        Self::IniSize,
        Self::FormSize,
        Self::Partial,
        Self::NoFile,
        Self::NoTmpDir,
        Self::CantWrite,
        Self::Extension,
    ];

    pub fn code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::IniSize => 1,
            Self::FormSize => 2,
            Self::Partial => 3,
            Self::NoFile => 4,
            Self::NoTmpDir => 6,
            Self::CantWrite => 7,
            Self::Extension => 8,
        }
    }

    #[inline]
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    fn description(self) -> &'static str {
        match self {
            Self::Ok => "no error",
            Self::IniSize => "file exceeds the server upload size limit",
            Self::FormSize => "file exceeds the form upload size limit",
            Self::Partial => "file was only partially uploaded",
            Self::NoFile => "no file was uploaded",
            Self::NoTmpDir => "missing temporary upload directory",
            Self::CantWrite => "failed to write file to disk",
            Self::Extension => "upload stopped by an extension",
        }
    }
}

impl fmt::Display for UploadErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.description())
    }
}

impl TryFrom<i64> for UploadErrorCode {
    type Error = UploadError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|code| i64::from(code.code()) == value)
            .ok_or_else(|| UploadError::invalid_argument(format!("invalid upload error code {value}")))
    }
}

impl FromStr for UploadErrorCode {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<i64>()
            .map_err(|e| UploadError::invalid_argument(format!("invalid upload error code `{s}`: {e}")))?;
        Self::try_from(value)
    }
}
