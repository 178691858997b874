//! Typed path model (C1).
//!
//! Three nominal kinds replace convention-based string paths:
//! [`AbsoluteSystemPath`] (rooted, host syntax), [`AnchoredSystemPath`]
//! (relative to a caller-tracked anchor, host syntax) and
//! [`AnchoredUnixPath`] (same as anchored but `/`-separated — the canonical
//! form for archive entries, hash keys, and JSON). Conversions between
//! system and unix form only happen at these boundaries; everything else
//! passes typed paths through unchanged.

mod absolute;
mod anchored;
mod anchored_unix;
mod error;

pub use absolute::{AbsoluteSystemPath, AbsoluteSystemPathBuf};
pub use anchored::{AnchoredSystemPath, AnchoredSystemPathBuf};
pub use anchored_unix::{AnchoredUnixPath, AnchoredUnixPathBuf};
pub use error::PathError;

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use test_case::test_case;

    use super::*;

    #[test]
    fn absolute_rejects_relative() {
        assert!(AbsoluteSystemPathBuf::new(PathBuf::from("relative/path")).is_err());
    }

    #[test]
    fn anchored_rejects_absolute() {
        let abs = if cfg!(windows) { "C:\\foo" } else { "/foo" };
        assert!(AnchoredSystemPathBuf::new(PathBuf::from(abs)).is_err());
    }

    #[test_case("a/../../b" ; "escapes via double dotdot")]
    #[test_case("../b" ; "escapes via leading dotdot")]
    fn anchored_rejects_escaping_dotdot(path: &str) {
        assert!(AnchoredSystemPathBuf::new(PathBuf::from(path)).is_err());
    }

    #[test_case("a/../b" ; "dotdot that stays inside")]
    #[test_case("./a/b" ; "leading curdir")]
    fn anchored_allows_internal_dotdot(path: &str) {
        assert!(AnchoredSystemPathBuf::new(PathBuf::from(path)).is_ok());
    }

    #[test]
    fn unix_path_rejects_backslash() {
        assert!(AnchoredUnixPathBuf::new("foo\\bar").is_err());
    }

    #[test]
    fn unix_path_rejects_leading_slash() {
        assert!(AnchoredUnixPathBuf::new("/foo").is_err());
    }

    #[test]
    fn anchored_to_unix_round_trips() {
        let anchored = AnchoredSystemPathBuf::new(PathBuf::from("pkg/dist/out.txt")).unwrap();
        let unix = anchored.to_unix();
        assert_eq!(unix.as_str(), "pkg/dist/out.txt");
    }

    #[test]
    fn absolute_join_rejects_escape() {
        let root = if cfg!(windows) {
            AbsoluteSystemPathBuf::new(PathBuf::from("C:\\repo")).unwrap()
        } else {
            AbsoluteSystemPathBuf::new(PathBuf::from("/repo")).unwrap()
        };
        assert!(root.join("../escape").is_err());
        assert!(root.join("pkg/dist").is_ok());
    }

    #[test]
    fn anchor_then_restore_round_trips() {
        let root = if cfg!(windows) {
            AbsoluteSystemPathBuf::new(PathBuf::from("C:\\repo")).unwrap()
        } else {
            AbsoluteSystemPathBuf::new(PathBuf::from("/repo")).unwrap()
        };
        let child = root.join("pkg/dist/out.txt").unwrap();
        let anchored = root.anchor(&child).unwrap();
        assert_eq!(anchored.as_str(), "pkg/dist/out.txt");
        let restored = anchored.restore(&root);
        assert_eq!(restored, child);
    }
}
