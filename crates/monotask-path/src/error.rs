use std::path::StripPrefixError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("path is not absolute: {0}")]
    NotAbsolute(String),
    #[error("path is not relative: {0}")]
    NotRelative(String),
    #[error("path is malformed: {0}")]
    Malformed(String),
    #[error("path {0} is not a parent of {1}")]
    NotParent(String, String),
    #[error("path {0} escapes anchor {1}")]
    EscapesAnchor(String, String),
    #[error(transparent)]
    StripPrefix(#[from] StripPrefixError),
    #[error("file name is not Windows-safe: {0}")]
    WindowsUnsafeName(String),
    #[error("invalid unicode in path: {0}")]
    InvalidUnicode(String),
}
