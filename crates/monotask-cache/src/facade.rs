use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use monotask_path::{AbsoluteSystemPath, AnchoredSystemPathBuf, AnchoredUnixPathBuf};
use tracing::warn;

use crate::{fs::FsCache, single_flight::SingleFlight, CacheError, CacheHitMetadata, CacheSource};

/// Bounded retry policy for a backgrounded remote upload, per spec.md
/// §4.9: three attempts, exponential backoff capped at ten seconds.
const PUT_MAX_ATTEMPTS: u32 = 3;
const PUT_BACKOFF_CAP: Duration = Duration::from_secs(10);

/// A remote cache tier. Grounded on `turborepo-cache/src/http.rs`'s role in
/// `CacheMultiplexer`; no concrete HTTP client is wired up here (spec.md's
/// cache façade names the contract, not a specific remote backend), so
/// callers that want one implement this trait themselves.
#[async_trait]
pub trait RemoteCache: Send + Sync {
    async fn exists(&self, hash: &str) -> Result<bool, CacheError>;

    async fn fetch(
        &self,
        anchor: &AbsoluteSystemPath,
        hash: &str,
    ) -> Result<Option<(Vec<AnchoredUnixPathBuf>, u32)>, CacheError>;

    async fn put(
        &self,
        hash: &str,
        files: &[AnchoredSystemPathBuf],
        duration: u32,
    ) -> Result<(), CacheError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistsResult {
    pub local: bool,
    pub remote: bool,
    /// Milliseconds the hit's original run took, if known — cheap to
    /// report for a local hit (read from the metadata sidecar); `0` for a
    /// remote-only hit, since getting it would require a fetch.
    pub time_saved_ms: u64,
}

impl ExistsResult {
    pub fn hit(&self) -> bool {
        self.local || self.remote
    }
}

/// Composes the required local tier with an optional remote tier. Grounded
/// on `turborepo-cache/src/multiplexer.rs`'s `CacheMultiplexer`: puts go to
/// both tiers (local first), fetches prefer local and fall back to remote,
/// and identical concurrent operations for the same hash are collapsed via
/// [`SingleFlight`] per spec.md §4.9.
pub struct CacheFacade {
    local: FsCache,
    remote: Option<Arc<dyn RemoteCache>>,
    remote_read_only: bool,
    fetch_flight: Arc<SingleFlight<Arc<Result<Option<(Vec<AnchoredUnixPathBuf>, u32)>, String>>>>,
    put_flight: Arc<SingleFlight<Arc<Result<(), String>>>>,
}

impl CacheFacade {
    pub fn new(local: FsCache, remote: Option<Arc<dyn RemoteCache>>, remote_read_only: bool) -> Self {
        Self {
            local,
            remote,
            remote_read_only,
            fetch_flight: Arc::new(SingleFlight::new()),
            put_flight: Arc::new(SingleFlight::new()),
        }
    }

    pub async fn exists(&self, hash: &str) -> Result<ExistsResult, CacheError> {
        let local = self.local.exists(hash)?;
        let remote = match &self.remote {
            Some(remote) => remote.exists(hash).await.unwrap_or_else(|err| {
                warn!(%hash, error = %err, "remote cache existence check failed");
                false
            }),
            None => false,
        };
        let time_saved_ms = if local { u64::from(self.local.duration(hash)?) } else { 0 };
        Ok(ExistsResult { local, remote, time_saved_ms })
    }

    /// Fetches by hash, preferring the local tier and falling back to
    /// remote. A successful remote fetch is not re-written to local; C9's
    /// contract only requires `fetch` to materialize outputs at `anchor`.
    pub async fn fetch(
        &self,
        anchor: &AbsoluteSystemPath,
        hash: &str,
    ) -> Result<Option<(Vec<AnchoredUnixPathBuf>, u32, CacheHitMetadata)>, CacheError> {
        if let Some((files, duration)) = self.local.fetch(anchor, hash)? {
            return Ok(Some((
                files,
                duration,
                CacheHitMetadata {
                    source: CacheSource::Local,
                    time_saved_ms: u64::from(duration),
                },
            )));
        }

        let Some(remote) = self.remote.clone() else {
            return Ok(None);
        };

        let key = hash.to_string();
        let flight = self.fetch_flight.clone();
        let outcome = flight
            .run(&key, || {
                let remote = remote.clone();
                let hash = hash.to_string();
                let anchor = anchor.to_owned();
                async move {
                    Arc::new(
                        remote
                            .fetch(&anchor, &hash)
                            .await
                            .map_err(|err| err.to_string()),
                    )
                }
            })
            .await;

        match outcome.as_ref() {
            Ok(Some((files, duration))) => Ok(Some((
                files.clone(),
                *duration,
                CacheHitMetadata {
                    source: CacheSource::Remote,
                    time_saved_ms: u64::from(*duration),
                },
            ))),
            Ok(None) => Ok(None),
            Err(message) => Err(CacheError::Remote(message.clone(), None)),
        }
    }

    /// Writes to the local tier synchronously, then backgrounds the remote
    /// upload (unless remote is disabled or read-only) via [`tokio::spawn`]
    /// so a slow or flaky remote never holds up the task that produced the
    /// output. Grounded on `turborepo-cache/src/async_cache.rs`'s
    /// `AsyncCache::put` backgrounding the same way. Concurrent puts for the
    /// same hash are single-flighted, and a failed upload is retried with
    /// exponential backoff before being logged and swallowed — a cache
    /// write failure never fails the task that produced the output.
    pub async fn put(
        &self,
        anchor: &AbsoluteSystemPath,
        hash: &str,
        files: &[AnchoredSystemPathBuf],
        duration: u32,
    ) -> Result<(), CacheError> {
        self.local.put(anchor, hash, files, duration)?;

        if self.remote_read_only {
            return Ok(());
        }
        let Some(remote) = self.remote.clone() else {
            return Ok(());
        };

        let key = hash.to_string();
        let flight = self.put_flight.clone();
        let hash = hash.to_string();
        let files = files.to_vec();
        tokio::spawn(async move {
            flight
                .run(&key, || put_with_retry(remote, hash, files, duration))
                .await;
        });

        Ok(())
    }
}

/// Uploads to `remote`, retrying up to [`PUT_MAX_ATTEMPTS`] times with
/// exponential backoff capped at [`PUT_BACKOFF_CAP`] before giving up.
async fn put_with_retry(
    remote: Arc<dyn RemoteCache>,
    hash: String,
    files: Vec<AnchoredSystemPathBuf>,
    duration: u32,
) -> Arc<Result<(), String>> {
    let mut backoff = Duration::from_secs(1);
    for attempt in 1..=PUT_MAX_ATTEMPTS {
        match remote.put(&hash, &files, duration).await {
            Ok(()) => return Arc::new(Ok(())),
            Err(err) if attempt < PUT_MAX_ATTEMPTS => {
                warn!(%hash, attempt, %err, "remote cache write failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(PUT_BACKOFF_CAP);
            }
            Err(err) => {
                warn!(%hash, %err, "remote cache write failed, giving up after {PUT_MAX_ATTEMPTS} attempts");
                return Arc::new(Err(err.to_string()));
            }
        }
    }
    unreachable!("loop always returns on its final iteration")
}

#[cfg(test)]
mod tests {
    use monotask_path::AbsoluteSystemPathBuf;
    use tempfile::tempdir;

    use super::*;

    struct NeverHasIt;

    #[async_trait]
    impl RemoteCache for NeverHasIt {
        async fn exists(&self, _hash: &str) -> Result<bool, CacheError> {
            Ok(false)
        }

        async fn fetch(
            &self,
            _anchor: &AbsoluteSystemPath,
            _hash: &str,
        ) -> Result<Option<(Vec<AnchoredUnixPathBuf>, u32)>, CacheError> {
            Ok(None)
        }

        async fn put(
            &self,
            _hash: &str,
            _files: &[AnchoredSystemPathBuf],
            _duration: u32,
        ) -> Result<(), CacheError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn local_hit_skips_remote() {
        let repo = tempdir().unwrap();
        std::fs::write(repo.path().join("out.txt"), b"result").unwrap();
        let anchor = AbsoluteSystemPathBuf::new(repo.path().to_path_buf()).unwrap();

        let cache_dir = tempdir().unwrap();
        let local =
            FsCache::new(AbsoluteSystemPathBuf::new(cache_dir.path().to_path_buf()).unwrap())
                .unwrap();
        let facade = CacheFacade::new(local, Some(Arc::new(NeverHasIt)), false);

        let files = vec![AnchoredSystemPathBuf::new("out.txt").unwrap()];
        facade.put(&anchor, "cafef00d", &files, 7).await.unwrap();

        let exists = facade.exists("cafef00d").await.unwrap();
        assert!(exists.hit());
        assert_eq!(exists.time_saved_ms, 7);

        let dest = tempdir().unwrap();
        let dest_anchor = AbsoluteSystemPathBuf::new(dest.path().to_path_buf()).unwrap();
        let (restored, duration, metadata) =
            facade.fetch(&dest_anchor, "cafef00d").await.unwrap().unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(duration, 7);
        assert_eq!(metadata.source, CacheSource::Local);
    }

    #[tokio::test]
    async fn miss_on_both_tiers_returns_none() {
        let cache_dir = tempdir().unwrap();
        let local =
            FsCache::new(AbsoluteSystemPathBuf::new(cache_dir.path().to_path_buf()).unwrap())
                .unwrap();
        let facade = CacheFacade::new(local, Some(Arc::new(NeverHasIt)), false);

        let anchor = AbsoluteSystemPathBuf::new(cache_dir.path().to_path_buf()).unwrap();
        assert!(facade.fetch(&anchor, "missing").await.unwrap().is_none());
    }

    struct FlakyThenOk {
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl RemoteCache for FlakyThenOk {
        async fn exists(&self, _hash: &str) -> Result<bool, CacheError> {
            Ok(false)
        }

        async fn fetch(
            &self,
            _anchor: &AbsoluteSystemPath,
            _hash: &str,
        ) -> Result<Option<(Vec<AnchoredUnixPathBuf>, u32)>, CacheError> {
            Ok(None)
        }

        async fn put(
            &self,
            _hash: &str,
            _files: &[AnchoredSystemPathBuf],
            _duration: u32,
        ) -> Result<(), CacheError> {
            use std::sync::atomic::Ordering;
            if self.calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CacheError::Remote("connection reset".to_string(), None))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn put_retries_a_flaky_remote_in_the_background() {
        let repo = tempdir().unwrap();
        std::fs::write(repo.path().join("out.txt"), b"result").unwrap();
        let anchor = AbsoluteSystemPathBuf::new(repo.path().to_path_buf()).unwrap();

        let cache_dir = tempdir().unwrap();
        let local =
            FsCache::new(AbsoluteSystemPathBuf::new(cache_dir.path().to_path_buf()).unwrap())
                .unwrap();
        let remote = Arc::new(FlakyThenOk { calls: std::sync::atomic::AtomicU32::new(0) });
        let facade = CacheFacade::new(local, Some(remote.clone()), false);

        let files = vec![AnchoredSystemPathBuf::new("out.txt").unwrap()];
        // `put` itself only waits on the local write; the remote upload and
        // its retries run in the background.
        facade.put(&anchor, "cafef00d", &files, 7).await.unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;

        assert_eq!(remote.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
