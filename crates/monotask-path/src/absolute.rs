use std::{
    borrow::Borrow,
    ffi::OsStr,
    fmt,
    ops::Deref,
    path::{Path, PathBuf},
};

use delegate::delegate;
use path_clean::PathClean;

use crate::{anchored::AnchoredSystemPathBuf, error::PathError, AnchoredSystemPath};

/// An absolute, host-syntax path. Constructing one validates `is_absolute()`.
#[repr(transparent)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbsoluteSystemPath(Path);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbsoluteSystemPathBuf(PathBuf);

impl AbsoluteSystemPath {
    /// # Safety
    /// `path` must already be known absolute.
    unsafe fn coerce(path: &Path) -> &Self {
        &*(path as *const Path as *const Self)
    }

    pub fn from_path(path: &Path) -> Result<&Self, PathError> {
        if !path.is_absolute() {
            return Err(PathError::NotAbsolute(path.to_string_lossy().into_owned()));
        }
        Ok(unsafe { Self::coerce(path) })
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.to_str().expect("non-utf8 path")
    }

    delegate! {
        to self.0 {
            pub fn is_dir(&self) -> bool;
            pub fn is_file(&self) -> bool;
            pub fn exists(&self) -> bool;
            pub fn file_name(&self) -> Option<&OsStr>;
            pub fn extension(&self) -> Option<&OsStr>;
            pub fn symlink_metadata(&self) -> std::io::Result<std::fs::Metadata>;
            pub fn metadata(&self) -> std::io::Result<std::fs::Metadata>;
            pub fn read_link(&self) -> std::io::Result<PathBuf>;
        }
    }

    pub fn parent(&self) -> Option<&AbsoluteSystemPath> {
        self.0.parent().map(|p| unsafe { Self::coerce(p) })
    }

    /// Joins `path` onto `self`, rejecting segments that would escape `self`.
    pub fn join(&self, path: &str) -> Result<AbsoluteSystemPathBuf, PathError> {
        if path.contains('\\') {
            return Err(PathError::Malformed(path.to_string()));
        }
        let joined = self.0.join(path).clean();
        if !joined.starts_with(&self.0) {
            return Err(PathError::EscapesAnchor(
                path.to_string(),
                self.0.to_string_lossy().into_owned(),
            ));
        }
        Ok(AbsoluteSystemPathBuf(joined))
    }

    /// Joins unvalidated path components (trusted callers: globwalk results,
    /// package manager node_modules lookups).
    pub fn join_components(&self, components: &[&str]) -> AbsoluteSystemPathBuf {
        let mut buf = self.0.to_path_buf();
        for component in components {
            buf.push(component);
        }
        AbsoluteSystemPathBuf(buf)
    }

    /// Strips `self` as a known prefix of `full`, producing an anchored path.
    pub fn anchor(&self, full: &AbsoluteSystemPath) -> Result<AnchoredSystemPathBuf, PathError> {
        let stripped = full.0.strip_prefix(&self.0)?;
        AnchoredSystemPathBuf::new(stripped)
    }

    pub fn to_owned(&self) -> AbsoluteSystemPathBuf {
        AbsoluteSystemPathBuf(self.0.to_path_buf())
    }
}

impl fmt::Display for AbsoluteSystemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for AbsoluteSystemPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl AbsoluteSystemPathBuf {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, PathError> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(PathError::NotAbsolute(path.to_string_lossy().into_owned()));
        }
        Ok(Self(path))
    }

    /// Constructs from an already-absolute path without re-validating,
    /// cleaning `.`/`..` components first. Used for paths synthesized from
    /// trusted sources (e.g. `std::env::current_dir`).
    pub fn from_cwd() -> std::io::Result<Self> {
        Ok(Self(std::env::current_dir()?))
    }

    pub fn as_absolute_path(&self) -> &AbsoluteSystemPath {
        unsafe { AbsoluteSystemPath::coerce(&self.0) }
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    pub fn join(&self, path: &str) -> Result<AbsoluteSystemPathBuf, PathError> {
        self.as_absolute_path().join(path)
    }

    pub fn join_unix_path(
        &self,
        unix: &crate::anchored_unix::AnchoredUnixPath,
    ) -> Result<AbsoluteSystemPathBuf, PathError> {
        self.as_absolute_path().join(unix.as_str())
    }

    pub fn resolve(&self, relative: &AnchoredSystemPath) -> AbsoluteSystemPathBuf {
        AbsoluteSystemPathBuf(self.0.join(relative.as_path()))
    }

    pub fn as_std_path(&self) -> &Path {
        &self.0
    }
}

impl Deref for AbsoluteSystemPathBuf {
    type Target = AbsoluteSystemPath;

    fn deref(&self) -> &Self::Target {
        self.as_absolute_path()
    }
}

impl Borrow<AbsoluteSystemPath> for AbsoluteSystemPathBuf {
    fn borrow(&self) -> &AbsoluteSystemPath {
        self.as_absolute_path()
    }
}

impl fmt::Display for AbsoluteSystemPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for AbsoluteSystemPathBuf {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}
