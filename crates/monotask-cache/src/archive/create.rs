use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    sync::atomic::{AtomicU32, Ordering},
};

use flate2::{write::GzEncoder, Compression};
use monotask_path::{AbsoluteSystemPath, AbsoluteSystemPathBuf, AnchoredSystemPath};
use sha2::{Digest, Sha256};

use crate::CacheError;

/// Reads through to `inner` while feeding every byte read into `hasher`, so
/// a file's body can be streamed into the tar archive and a running content
/// digest in one pass instead of two (spec.md §4.4).
struct DigestTee<'a, R> {
    inner: R,
    hasher: &'a mut Sha256,
}

impl<'a, R: Read> Read for DigestTee<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

static TEMP_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Writes a content-addressed cache artifact: a gzip-compressed tar with
/// fixed headers (uid=0, gid=0, all timestamps at the epoch) so that two
/// runs over identical inputs produce byte-identical archives. Writes go to
/// a temp file first and are atomically renamed into place on
/// [`CacheWriter::finish`]; the `Drop` impl cleans up an orphaned temp file
/// if the writer is dropped without finishing (error unwind, panic).
pub struct CacheWriter {
    builder: tar::Builder<Box<dyn Write + Send>>,
    temp_path: Option<AbsoluteSystemPathBuf>,
    final_path: Option<AbsoluteSystemPathBuf>,
    digest: Sha256,
}

impl Drop for CacheWriter {
    fn drop(&mut self) {
        if let Some(temp_path) = self.temp_path.take() {
            let _ = std::fs::remove_file(temp_path.as_path());
        }
    }
}

fn generate_temp_path(final_path: &AbsoluteSystemPath) -> AbsoluteSystemPathBuf {
    let pid = std::process::id();
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
    let file_name = final_path
        .as_path()
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("artifact");
    let temp_name = format!(".{file_name}.{pid}.{counter}.tmp");
    final_path
        .parent()
        .expect("cache artifact path has a parent directory")
        .join(&temp_name)
        .expect("temp file name contains no path separators")
}

impl CacheWriter {
    /// Opens a new archive at a temp path alongside `final_path`. Callers
    /// must call [`Self::finish`] to materialize it at `final_path`;
    /// otherwise the temp file is removed on drop.
    pub fn create(final_path: &AbsoluteSystemPath) -> Result<Self, CacheError> {
        let temp_path = generate_temp_path(final_path);
        let file = File::create(temp_path.as_path())?;
        let writer: Box<dyn Write + Send> = Box::new(BufWriter::with_capacity(
            1024 * 1024,
            GzEncoder::new(file, Compression::default()),
        ));
        Ok(Self {
            builder: tar::Builder::new(writer),
            temp_path: Some(temp_path),
            final_path: Some(final_path.to_owned()),
            digest: Sha256::new(),
        })
    }

    /// Adds one file, directory, or symlink entry, rooted at `anchor`.
    pub fn add_file(
        &mut self,
        anchor: &AbsoluteSystemPath,
        file_path: &AnchoredSystemPath,
    ) -> Result<(), CacheError> {
        let source = anchor.resolve(file_path);
        let metadata = std::fs::symlink_metadata(source.as_path())?;
        let unix_path = file_path.to_unix();

        let mut header = tar::Header::new_gnu();
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(0);
        header.set_size(0);

        if metadata.is_dir() {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(0o755);
            self.builder
                .append_data(&mut header, format!("cache/{}", unix_path.as_str()), std::io::empty())?;
        } else if metadata.file_type().is_symlink() {
            let target = std::fs::read_link(source.as_path())?;
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_mode(0o777);
            let target_str = target.to_string_lossy();
            self.builder.append_link(
                &mut header,
                format!("cache/{}", unix_path.as_str()),
                target_str.as_ref(),
            )?;
        } else if metadata.is_file() {
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(metadata.len());
            let file = File::open(source.as_path())?;
            let mut tee = DigestTee { inner: file, hasher: &mut self.digest };
            self.builder
                .append_data(&mut header, format!("cache/{}", unix_path.as_str()), &mut tee)?;
        } else {
            return Err(CacheError::CreateUnsupportedFileType);
        }

        Ok(())
    }

    /// Adds a metadata-only entry (the per-task log file) under `metadata/`.
    pub fn add_metadata_file(
        &mut self,
        unix_path: &str,
        contents: &[u8],
    ) -> Result<(), CacheError> {
        let mut header = tar::Header::new_gnu();
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(0);
        header.set_mode(0o644);
        header.set_size(contents.len() as u64);
        header.set_entry_type(tar::EntryType::Regular);
        self.builder
            .append_data(&mut header, format!("metadata/{unix_path}"), contents)?;
        Ok(())
    }

    /// Flushes the archive footer, atomically renames the temp file to its
    /// final path, and returns the hex-encoded rolling content digest
    /// accumulated across every regular file's body — used to tag the
    /// artifact (spec.md §4.4).
    pub fn finish(mut self) -> Result<String, CacheError> {
        self.builder.finish()?;
        let temp_path = self.temp_path.take().expect("create() always sets temp_path");
        let final_path = self.final_path.take().expect("create() always sets final_path");
        std::fs::rename(temp_path.as_path(), final_path.as_path())?;
        Ok(hex::encode(self.digest.finalize_reset()))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn create_and_finish_renames_into_place() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("out.txt"), b"hello").unwrap();
        let anchor = AbsoluteSystemPathBuf::new(dir.path().to_path_buf()).unwrap();
        let final_path = anchor.join("artifact.tar.gz").unwrap();

        let mut writer = CacheWriter::create(&final_path).unwrap();
        let rel = monotask_path::AnchoredSystemPathBuf::new("out.txt").unwrap();
        writer.add_file(&anchor, &rel).unwrap();
        writer.finish().unwrap();

        assert!(final_path.exists());
    }

    #[test]
    fn digest_reflects_file_contents_and_is_deterministic() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("out.txt"), b"hello").unwrap();
        let anchor = AbsoluteSystemPathBuf::new(dir.path().to_path_buf()).unwrap();
        let rel = monotask_path::AnchoredSystemPathBuf::new("out.txt").unwrap();

        let first_path = anchor.join("first.tar.gz").unwrap();
        let mut first = CacheWriter::create(&first_path).unwrap();
        first.add_file(&anchor, &rel).unwrap();
        let first_digest = first.finish().unwrap();

        let second_path = anchor.join("second.tar.gz").unwrap();
        let mut second = CacheWriter::create(&second_path).unwrap();
        second.add_file(&anchor, &rel).unwrap();
        let second_digest = second.finish().unwrap();

        assert_eq!(first_digest, second_digest);
        assert_eq!(first_digest.len(), 64);

        std::fs::write(dir.path().join("out.txt"), b"goodbye").unwrap();
        let third_path = anchor.join("third.tar.gz").unwrap();
        let mut third = CacheWriter::create(&third_path).unwrap();
        third.add_file(&anchor, &rel).unwrap();
        let third_digest = third.finish().unwrap();

        assert_ne!(first_digest, third_digest);
    }

    #[test]
    fn drop_without_finish_cleans_up_temp_file() {
        let dir = tempdir().unwrap();
        let anchor = AbsoluteSystemPathBuf::new(dir.path().to_path_buf()).unwrap();
        let final_path = anchor.join("artifact.tar.gz").unwrap();

        let writer = CacheWriter::create(&final_path).unwrap();
        let temp_path = writer.temp_path.clone().unwrap();
        drop(writer);

        assert!(!temp_path.exists());
        assert!(!final_path.exists());
    }
}
