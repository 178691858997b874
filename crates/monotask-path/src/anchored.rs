use std::{
    borrow::Borrow,
    fmt,
    ops::Deref,
    path::{Path, PathBuf},
};

use delegate::delegate;
use path_slash::PathExt as _;

use crate::{absolute::AbsoluteSystemPathBuf, anchored_unix::AnchoredUnixPathBuf, error::PathError};

/// A relative path anchored at some directory the caller tracks separately
/// (a package root, a repo root). Never starts with a separator and never
/// contains a `..` component that would escape the anchor.
#[repr(transparent)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnchoredSystemPath(Path);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnchoredSystemPathBuf(PathBuf);

fn validate(path: &Path) -> Result<(), PathError> {
    if path.is_absolute() {
        return Err(PathError::NotRelative(path.to_string_lossy().into_owned()));
    }
    let mut depth: i32 = 0;
    for component in path.components() {
        use std::path::Component::*;
        match component {
            CurDir => {}
            ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(PathError::EscapesAnchor(
                        path.to_string_lossy().into_owned(),
                        ".".to_string(),
                    ));
                }
            }
            Normal(_) => depth += 1,
            RootDir | Prefix(_) => {
                return Err(PathError::NotRelative(path.to_string_lossy().into_owned()))
            }
        }
    }
    Ok(())
}

impl AnchoredSystemPath {
    unsafe fn coerce(path: &Path) -> &Self {
        &*(path as *const Path as *const Self)
    }

    pub fn from_path(path: &Path) -> Result<&Self, PathError> {
        validate(path)?;
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
            pub fn file_name(&self) -> Option<&std::ffi::OsStr>;
        }
    }

    pub fn parent(&self) -> Option<&AnchoredSystemPath> {
        self.0.parent().map(|p| unsafe { Self::coerce(p) })
    }

    pub fn join(&self, path: &str) -> Result<AnchoredSystemPathBuf, PathError> {
        AnchoredSystemPathBuf::new(self.0.join(path))
    }

    /// Re-prefixes with an absolute anchor, yielding a filesystem-ready path.
    pub fn restore(&self, anchor: &AbsoluteSystemPathBuf) -> AbsoluteSystemPathBuf {
        anchor.resolve(self)
    }

    /// Canonical `/`-separated form for archives, hash keys, and JSON.
    pub fn to_unix(&self) -> AnchoredUnixPathBuf {
        let slashed = self.0.to_slash_lossy().into_owned();
        AnchoredUnixPathBuf::new(slashed).expect("validated anchored path converts cleanly")
    }

    pub fn to_owned(&self) -> AnchoredSystemPathBuf {
        AnchoredSystemPathBuf(self.0.to_path_buf())
    }
}

impl fmt::Display for AnchoredSystemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AnchoredSystemPathBuf {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, PathError> {
        let path = path.into();
        validate(&path)?;
        Ok(Self(path))
    }

    pub fn as_anchored_path(&self) -> &AnchoredSystemPath {
        unsafe { AnchoredSystemPath::coerce(&self.0) }
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn to_unix(&self) -> AnchoredUnixPathBuf {
        self.as_anchored_path().to_unix()
    }
}

impl Deref for AnchoredSystemPathBuf {
    type Target = AnchoredSystemPath;

    fn deref(&self) -> &Self::Target {
        self.as_anchored_path()
    }
}

impl Borrow<AnchoredSystemPath> for AnchoredSystemPathBuf {
    fn borrow(&self) -> &AnchoredSystemPath {
        self.as_anchored_path()
    }
}

impl fmt::Display for AnchoredSystemPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}
