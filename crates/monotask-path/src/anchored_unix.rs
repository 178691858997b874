use std::{borrow::Borrow, fmt, ops::Deref};

use crate::{anchored::AnchoredSystemPathBuf, error::PathError};

/// Same semantics as [`crate::AnchoredSystemPath`] but canonicalized to `/`
/// separators. This is the representation used on archive entry names, hash
/// keys, and JSON — the only place it differs from the system path is on
/// Windows.
#[repr(transparent)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnchoredUnixPath(str);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnchoredUnixPathBuf(String);

fn validate(s: &str) -> Result<(), PathError> {
    if s.starts_with('/') {
        return Err(PathError::NotRelative(s.to_string()));
    }
    if s.contains('\\') {
        return Err(PathError::WindowsUnsafeName(s.to_string()));
    }
    let mut depth: i32 = 0;
    for segment in s.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                depth -= 1;
                if depth < 0 {
                    return Err(PathError::EscapesAnchor(s.to_string(), ".".to_string()));
                }
            }
            _ => depth += 1,
        }
    }
    Ok(())
}

impl AnchoredUnixPath {
    unsafe fn coerce(s: &str) -> &Self {
        &*(s as *const str as *const Self)
    }

    pub fn from_str(s: &str) -> Result<&Self, PathError> {
        validate(s)?;
        Ok(unsafe { Self::coerce(s) })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_owned(&self) -> AnchoredUnixPathBuf {
        AnchoredUnixPathBuf(self.0.to_string())
    }

    /// Converts to a system path; on unix this is a no-op, on windows `/` is
    /// replaced with `\`.
    pub fn to_system(&self) -> Result<AnchoredSystemPathBuf, PathError> {
        let system = if cfg!(windows) {
            self.0.replace('/', "\\")
        } else {
            self.0.clone()
        };
        AnchoredSystemPathBuf::new(system)
    }
}

impl fmt::Display for AnchoredUnixPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AnchoredUnixPathBuf {
    pub fn new(s: impl Into<String>) -> Result<Self, PathError> {
        let s = s.into();
        validate(&s)?;
        Ok(Self(s))
    }

    pub fn as_anchored_unix_path(&self) -> &AnchoredUnixPath {
        unsafe { AnchoredUnixPath::coerce(&self.0) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Deref for AnchoredUnixPathBuf {
    type Target = AnchoredUnixPath;

    fn deref(&self) -> &Self::Target {
        self.as_anchored_unix_path()
    }
}

impl Borrow<AnchoredUnixPath> for AnchoredUnixPathBuf {
    fn borrow(&self) -> &AnchoredUnixPath {
        self.as_anchored_unix_path()
    }
}

impl fmt::Display for AnchoredUnixPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for AnchoredUnixPathBuf {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for AnchoredUnixPathBuf {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}
