use monotask_path::{AbsoluteSystemPath, AbsoluteSystemPathBuf, AnchoredSystemPath, AnchoredUnixPathBuf};
use serde::{Deserialize, Serialize};

use crate::{
    archive::{CacheReader, CacheWriter},
    CacheError,
};

#[derive(Debug, Serialize, Deserialize)]
struct CacheMetadata {
    hash: String,
    duration: u32,
    /// Rolling content digest computed while the archive was written
    /// (spec.md §4.4). `#[serde(default)]` so sidecars written before this
    /// field existed still deserialize.
    #[serde(default)]
    content_hash: String,
}

/// The local filesystem tier of the cache. Grounded on
/// `turborepo-cache/src/fs.rs`; archive extension is `.tar.gz` (gzip) per
/// spec.md rather than the teacher's `.tar.zst`.
pub struct FsCache {
    cache_directory: AbsoluteSystemPathBuf,
}

impl FsCache {
    pub fn new(cache_directory: AbsoluteSystemPathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(cache_directory.as_path())?;
        Ok(Self { cache_directory })
    }

    fn archive_path(&self, hash: &str) -> Result<AbsoluteSystemPathBuf, CacheError> {
        Ok(self.cache_directory.join(&format!("{hash}.tar.gz"))?)
    }

    fn metadata_path(&self, hash: &str) -> Result<AbsoluteSystemPathBuf, CacheError> {
        Ok(self.cache_directory.join(&format!("{hash}-meta.json"))?)
    }

    /// Cheap existence check with no archive payload transfer.
    pub fn exists(&self, hash: &str) -> Result<bool, CacheError> {
        Ok(self.archive_path(hash)?.exists())
    }

    /// The task duration recorded alongside a hit, or `0` if the entry or
    /// its metadata sidecar is missing. Used to estimate time saved on an
    /// existence check, without restoring the archive.
    pub fn duration(&self, hash: &str) -> Result<u32, CacheError> {
        match std::fs::read(self.metadata_path(hash)?.as_path()) {
            Ok(bytes) => {
                let metadata: CacheMetadata =
                    serde_json::from_slice(&bytes).map_err(CacheError::InvalidMetadata)?;
                Ok(metadata.duration)
            }
            Err(_) => Ok(0),
        }
    }

    pub fn fetch(
        &self,
        anchor: &AbsoluteSystemPath,
        hash: &str,
    ) -> Result<Option<(Vec<AnchoredUnixPathBuf>, u32)>, CacheError> {
        let archive_path = self.archive_path(hash)?;
        if !archive_path.exists() {
            return Ok(None);
        }

        let reader = CacheReader::open(&archive_path)?;
        let restored = reader.restore(anchor)?;

        let duration = match std::fs::read(self.metadata_path(hash)?.as_path()) {
            Ok(bytes) => {
                let metadata: CacheMetadata =
                    serde_json::from_slice(&bytes).map_err(CacheError::InvalidMetadata)?;
                metadata.duration
            }
            Err(_) => 0,
        };

        Ok(Some((restored, duration)))
    }

    pub fn put(
        &self,
        anchor: &AbsoluteSystemPath,
        hash: &str,
        files: &[monotask_path::AnchoredSystemPathBuf],
        duration: u32,
    ) -> Result<(), CacheError> {
        let archive_path = self.archive_path(hash)?;
        let mut writer = CacheWriter::create(&archive_path)?;
        for file in files {
            writer.add_file(anchor, file)?;
        }
        let content_hash = writer.finish()?;

        let metadata = CacheMetadata {
            hash: hash.to_string(),
            duration,
            content_hash,
        };
        let bytes =
            serde_json::to_vec(&metadata).map_err(CacheError::MetadataWriteFailure)?;
        atomic_write(&self.metadata_path(hash)?, &bytes)?;

        Ok(())
    }
}

fn atomic_write(path: &AbsoluteSystemPathBuf, contents: &[u8]) -> Result<(), CacheError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("meta");
    let temp_path = path
        .parent()
        .expect("cache metadata path has a parent")
        .join(&format!(".{file_name}.{}.tmp", std::process::id()))?;
    std::fs::write(temp_path.as_path(), contents)?;
    std::fs::rename(temp_path.as_path(), path.as_path())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn put_then_fetch_round_trips() {
        let repo = tempdir().unwrap();
        std::fs::write(repo.path().join("out.txt"), b"result").unwrap();
        let anchor = AbsoluteSystemPathBuf::new(repo.path().to_path_buf()).unwrap();

        let cache_dir = tempdir().unwrap();
        let cache = FsCache::new(AbsoluteSystemPathBuf::new(cache_dir.path().to_path_buf()).unwrap())
            .unwrap();

        let files = vec![monotask_path::AnchoredSystemPathBuf::new("out.txt").unwrap()];
        cache.put(&anchor, "deadbeef", &files, 42).unwrap();

        assert!(cache.exists("deadbeef").unwrap());

        let dest = tempdir().unwrap();
        let dest_anchor = AbsoluteSystemPathBuf::new(dest.path().to_path_buf()).unwrap();
        let (restored, duration) = cache.fetch(&dest_anchor, "deadbeef").unwrap().unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(duration, 42);
        assert_eq!(std::fs::read(dest.path().join("out.txt")).unwrap(), b"result");
    }

    #[test]
    fn fetch_missing_returns_none() {
        let cache_dir = tempdir().unwrap();
        let cache = FsCache::new(AbsoluteSystemPathBuf::new(cache_dir.path().to_path_buf()).unwrap())
            .unwrap();
        let anchor = AbsoluteSystemPathBuf::new(cache_dir.path().to_path_buf()).unwrap();
        assert!(cache.fetch(&anchor, "missing").unwrap().is_none());
    }
}
