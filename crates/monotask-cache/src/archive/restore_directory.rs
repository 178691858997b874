use std::collections::HashSet;

use monotask_path::{AbsoluteSystemPath, AbsoluteSystemPathBuf, AnchoredSystemPath};

use crate::CacheError;

/// Caches directories already created during a restore so repeated entries
/// under the same parent don't re-stat the filesystem. Grounded on
/// `turborepo-cache/src/cache_archive/restore_directory.rs`'s `CachedDirTree`.
pub struct CachedDirTree {
    anchor: AbsoluteSystemPathBuf,
    made: HashSet<AbsoluteSystemPathBuf>,
}

impl CachedDirTree {
    pub fn new(anchor: AbsoluteSystemPathBuf) -> Self {
        Self {
            anchor,
            made: HashSet::new(),
        }
    }

    pub fn make_dir(&mut self, path: &AnchoredSystemPath) -> Result<(), CacheError> {
        let full = path.restore(&self.anchor);
        self.safe_mkdir_all(&full)
    }

    pub fn ensure_parent(&mut self, path: &AnchoredSystemPath) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            self.make_dir(parent)?;
        }
        Ok(())
    }

    fn safe_mkdir_all(&mut self, target: &AbsoluteSystemPathBuf) -> Result<(), CacheError> {
        if self.made.contains(target) {
            return Ok(());
        }
        check_path(&self.anchor, target)?;
        std::fs::create_dir_all(target.as_path())?;
        self.made.insert(target.clone());
        Ok(())
    }
}

/// Walks from `anchor` down to `target` component by component, rejecting
/// any existing component that is a symlink escaping the anchor.
fn check_path(anchor: &AbsoluteSystemPath, target: &AbsoluteSystemPathBuf) -> Result<(), CacheError> {
    let relative = target
        .as_path()
        .strip_prefix(anchor.as_path())
        .map_err(|_| {
            CacheError::LinkOutsideOfDirectory(target.as_path().display().to_string())
        })?;

    let mut current = anchor.to_owned();
    for component in relative.components() {
        let next = current.as_path().join(component);
        if let Ok(metadata) = std::fs::symlink_metadata(&next) {
            if metadata.file_type().is_symlink() {
                let resolved = std::fs::canonicalize(&next)?;
                if !resolved.starts_with(anchor.as_path()) {
                    return Err(CacheError::LinkOutsideOfDirectory(
                        next.display().to_string(),
                    ));
                }
            }
        }
        current = AbsoluteSystemPathBuf::new(next)
            .expect("joining an absolute path with a component stays absolute");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn make_dir_creates_nested_directories() {
        let dir = tempdir().unwrap();
        let anchor = AbsoluteSystemPathBuf::new(dir.path().to_path_buf()).unwrap();
        let mut tree = CachedDirTree::new(anchor.clone());
        let rel = monotask_path::AnchoredSystemPathBuf::new("a/b/c").unwrap();
        tree.make_dir(&rel).unwrap();
        assert!(dir.path().join("a/b/c").is_dir());
    }
}
