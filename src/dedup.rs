//! Fingerprint/dedup store.
//!
//! `check_and_mark` is the single atomic primitive the orchestrator relies on:
//! exactly one caller per fingerprint sees `true`, across tasks and processes.
//! Only the key is kept, never article content.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::article::Fingerprint;
use crate::error::DedupError;

#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn seen(&self, fp: &Fingerprint) -> Result<bool, DedupError>;

    /// Atomic check-and-set. `Ok(true)` when this call created the mark,
    /// `Ok(false)` when it already existed.
    async fn check_and_mark(&self, fp: &Fingerprint) -> Result<bool, DedupError>;

    /// Idempotent mark.
    async fn mark(&self, fp: &Fingerprint) -> Result<(), DedupError> {
        self.check_and_mark(fp).await.map(|_| ())
    }

    fn name(&self) -> &'static str;
}

/// Process-local store; used by tests and single-process dry runs.
#[derive(Debug, Default)]
pub struct MemoryDedupStore {
    inner: Mutex<HashSet<Fingerprint>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn seen(&self, fp: &Fingerprint) -> Result<bool, DedupError> {
        let g = self
            .inner
            .lock()
            .map_err(|_| DedupError::Unavailable("dedup mutex poisoned".into()))?;
        Ok(g.contains(fp))
    }

    async fn check_and_mark(&self, fp: &Fingerprint) -> Result<bool, DedupError> {
        let mut g = self
            .inner
            .lock()
            .map_err(|_| DedupError::Unavailable("dedup mutex poisoned".into()))?;
        Ok(g.insert(fp.clone()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Durable store: one marker file per fingerprint under `<dir>/<xx>/<fp>`.
/// `create_new` (O_EXCL) makes the check-and-set atomic at the filesystem, so
/// independent processes sharing the directory cannot both win.
#[derive(Debug, Clone)]
pub struct FileDedupStore {
    dir: PathBuf,
}

impl FileDedupStore {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn marker_path(&self, fp: &Fingerprint) -> PathBuf {
        let s = fp.as_str();
        let shard = s.get(..2).unwrap_or(s);
        self.dir.join(shard).join(s)
    }
}

fn unavailable(op: &str, e: io::Error) -> DedupError {
    DedupError::Unavailable(format!("{op}: {e}"))
}

#[async_trait]
impl DedupStore for FileDedupStore {
    async fn seen(&self, fp: &Fingerprint) -> Result<bool, DedupError> {
        tokio::fs::try_exists(self.marker_path(fp))
            .await
            .map_err(|e| unavailable("stat marker", e))
    }

    async fn check_and_mark(&self, fp: &Fingerprint) -> Result<bool, DedupError> {
        let path = self.marker_path(fp);
        if let Some(shard) = path.parent() {
            tokio::fs::create_dir_all(shard)
                .await
                .map_err(|e| unavailable("create shard dir", e))?;
        }

        let opened = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;

        match opened {
            Ok(mut f) => {
                let stamp = chrono::Utc::now().to_rfc3339();
                let written = match f.write_all(stamp.as_bytes()).await {
                    Ok(()) => f.sync_data().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    // An unsynced marker would turn the retry into a false duplicate.
                    drop(f);
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(unavailable("write marker", e));
                }
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(unavailable("create marker", e)),
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
