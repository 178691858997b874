use std::{
    collections::HashMap,
    io::Read,
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;
use monotask_path::{AbsoluteSystemPath, AnchoredSystemPathBuf, AnchoredUnixPathBuf};
use petgraph::graph::{DiGraph, NodeIndex};

use super::{
    restore_directory::CachedDirTree, restore_regular::restore_regular,
    restore_symlink::restore_symlink,
};
use crate::CacheError;

/// Reads a gzip-compressed cache archive and restores its `cache/` entries
/// into an anchor directory. Grounded on
/// `turborepo-cache/src/cache_archive/restore.rs`.
pub struct CacheReader {
    reader: Box<dyn Read>,
}

struct DeferredSymlink {
    entry_path: String,
    link_path: PathBuf,
    entry_parent: PathBuf,
    linkname: String,
}

impl CacheReader {
    pub fn open(path: &AbsoluteSystemPath) -> Result<Self, CacheError> {
        let file = std::fs::File::open(path.as_path())?;
        Ok(Self {
            reader: Box::new(GzDecoder::new(file)),
        })
    }

    /// Restores all `cache/`-prefixed entries into `anchor`, returning the
    /// anchored-unix paths that were written. `metadata/`-prefixed entries
    /// (log files) are restored alongside but not included in the returned
    /// list, matching spec.md §4.4's split between user outputs and
    /// metadata.
    pub fn restore(
        mut self,
        anchor: &AbsoluteSystemPath,
    ) -> Result<Vec<AnchoredUnixPathBuf>, CacheError> {
        let anchor_buf = anchor.to_owned();
        let mut archive = tar::Archive::new(&mut self.reader);
        let mut dir_tree = CachedDirTree::new(anchor_buf.clone());
        let mut restored = Vec::new();
        let mut deferred: Vec<DeferredSymlink> = Vec::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            let raw_name = entry.path()?.to_string_lossy().into_owned();
            let (prefix, relative) = split_prefix(&raw_name)?;
            validate_entry_name(&relative)?;

            let anchored = AnchoredSystemPathBuf::new(PathBuf::from(relative.replace('/', std::path::MAIN_SEPARATOR_STR)))?;
            let dest = anchored.restore(&anchor_buf);

            match entry.header().entry_type() {
                tar::EntryType::Directory => {
                    dir_tree.make_dir(&anchored)?;
                }
                tar::EntryType::Regular => {
                    dir_tree.ensure_parent(&anchored)?;
                    restore_regular(entry, dest.as_path())?;
                    if prefix == "cache" {
                        restored.push(anchored.to_unix());
                    }
                }
                tar::EntryType::Symlink => {
                    dir_tree.ensure_parent(&anchored)?;
                    let linkname = entry
                        .link_name()?
                        .ok_or(CacheError::LinkTargetDoesNotExist(raw_name.clone()))?
                        .to_string_lossy()
                        .into_owned();
                    let entry_parent = dest
                        .as_path()
                        .parent()
                        .expect("restored path always has a parent")
                        .to_path_buf();
                    match restore_symlink(anchor, &entry_parent, dest.as_path(), &linkname, false) {
                        Ok(()) => {
                            if prefix == "cache" {
                                restored.push(anchored.to_unix());
                            }
                        }
                        Err(CacheError::LinkTargetDoesNotExist(_)) => {
                            deferred.push(DeferredSymlink {
                                entry_path: raw_name,
                                link_path: dest.into_path_buf(),
                                entry_parent,
                                linkname,
                            });
                        }
                        Err(other) => return Err(other),
                    }
                }
                other => return Err(CacheError::RestoreUnsupportedFileType(other)),
            }
        }

        let mut symlink_paths = topologically_restore_symlinks(anchor, deferred)?;
        restored.append(&mut symlink_paths);
        restored.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(restored)
    }
}

fn split_prefix(raw: &str) -> Result<(&str, String), CacheError> {
    if let Some(rest) = raw.strip_prefix("cache/") {
        Ok(("cache", rest.to_string()))
    } else if let Some(rest) = raw.strip_prefix("metadata/") {
        Ok(("metadata", rest.to_string()))
    } else {
        Err(CacheError::Path(monotask_path::PathError::Malformed(
            raw.to_string(),
        )))
    }
}

/// Rejects entry names that would escape the anchor or that aren't
/// Windows-safe, per spec.md §4.4's Fetch rules.
fn validate_entry_name(name: &str) -> Result<(), CacheError> {
    if name.is_empty() || name.starts_with('/') || name.starts_with("./") || name.starts_with("../")
    {
        return Err(CacheError::Path(monotask_path::PathError::Malformed(
            name.to_string(),
        )));
    }
    for segment in name.split('/') {
        if segment == "." || segment == ".." {
            return Err(CacheError::Path(monotask_path::PathError::Malformed(
                name.to_string(),
            )));
        }
    }
    if name.contains("//") {
        return Err(CacheError::Path(monotask_path::PathError::Malformed(
            name.to_string(),
        )));
    }
    if cfg!(windows) && name.contains('\\') {
        return Err(CacheError::WindowsUnsafeName(name.to_string()));
    }
    Ok(())
}

/// Orders deferred symlinks so that a link whose target is itself a
/// deferred link is restored after its target, detecting cycles via
/// `petgraph::algo::toposort`.
fn topologically_restore_symlinks(
    anchor: &AbsoluteSystemPath,
    deferred: Vec<DeferredSymlink>,
) -> Result<Vec<AnchoredUnixPathBuf>, CacheError> {
    if deferred.is_empty() {
        return Ok(vec![]);
    }

    let mut graph = DiGraph::<PathBuf, ()>::new();
    let mut node_of: HashMap<PathBuf, NodeIndex> = HashMap::new();
    let mut node_for = |graph: &mut DiGraph<PathBuf, ()>, path: &Path| -> NodeIndex {
        let path = path.to_path_buf();
        *node_of
            .entry(path.clone())
            .or_insert_with(|| graph.add_node(path))
    };

    for link in &deferred {
        let source = node_for(&mut graph, &link.link_path);
        let target =
            super::restore_symlink::canonicalize_linkname(anchor, &link.entry_parent, &link.linkname);
        let target = node_for(&mut graph, &target);
        graph.add_edge(target, source, ());
    }

    let order = petgraph::algo::toposort(&graph, None).map_err(|_| CacheError::CycleDetected)?;

    let by_path: HashMap<&Path, &DeferredSymlink> =
        deferred.iter().map(|d| (d.link_path.as_path(), d)).collect();

    let mut restored = Vec::new();
    for node in order {
        let path = &graph[node];
        let Some(link) = by_path.get(path.as_path()) else {
            continue;
        };
        restore_symlink(anchor, &link.entry_parent, &link.link_path, &link.linkname, true)?;
        let (prefix, relative) = split_prefix(&link.entry_path)?;
        if prefix == "cache" {
            let anchored = AnchoredSystemPathBuf::new(PathBuf::from(
                relative.replace('/', std::path::MAIN_SEPARATOR_STR),
            ))?;
            restored.push(anchored.to_unix());
        }
    }
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::archive::CacheWriter;

    #[test]
    fn round_trips_regular_file() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("out.txt"), b"payload").unwrap();
        let anchor = monotask_path::AbsoluteSystemPathBuf::new(src.path().to_path_buf()).unwrap();
        let archive_path = anchor.join("a.tar.gz").unwrap();

        let mut writer = CacheWriter::create(&archive_path).unwrap();
        let rel = AnchoredSystemPathBuf::new("out.txt").unwrap();
        writer.add_file(&anchor, &rel).unwrap();
        writer.finish().unwrap();

        let dest = tempdir().unwrap();
        let dest_anchor =
            monotask_path::AbsoluteSystemPathBuf::new(dest.path().to_path_buf()).unwrap();
        let reader = CacheReader::open(&archive_path).unwrap();
        let restored = reader.restore(&dest_anchor).unwrap();

        assert_eq!(restored.len(), 1);
        assert_eq!(
            std::fs::read(dest.path().join("out.txt")).unwrap(),
            b"payload"
        );
    }

    #[test]
    fn rejects_traversal_entry_names() {
        assert!(validate_entry_name("../evil").is_err());
        assert!(validate_entry_name("a/../../evil").is_err());
        assert!(validate_entry_name("").is_err());
    }
}
