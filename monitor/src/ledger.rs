//! Persisted record of items the bot has already decided about.
//!
//! Membership means a response decision is final for that item, including
//! the decision to stay quiet. Ids are never removed while the process runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use turtlebot_core::{CoreError, ErrorExt, ItemKind, PersistenceError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    #[serde(default)]
    pub posts: BTreeSet<String>,
    #[serde(default)]
    pub comments: BTreeSet<String>,
}

impl LedgerState {
    fn ids(&self, kind: ItemKind) -> &BTreeSet<String> {
        match kind {
            ItemKind::Post => &self.posts,
            ItemKind::Comment => &self.comments,
        }
    }

    fn ids_mut(&mut self, kind: ItemKind) -> &mut BTreeSet<String> {
        match kind {
            ItemKind::Post => &mut self.posts,
            ItemKind::Comment => &mut self.comments,
        }
    }
}

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    state: Mutex<LedgerState>,
    // Held for the whole temp-write + rename so flushes never interleave.
    write_lock: Mutex<()>,
}

impl Ledger {
    /// In-memory ledger that persists to `path`; nothing is read.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self::with_state(path, LedgerState::default())
    }

    pub fn with_state(path: impl Into<PathBuf>, state: LedgerState) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(state),
            write_lock: Mutex::new(()),
        }
    }

    /// Loads the ledger from `path`.
    ///
    /// Never fails: a missing, unreadable or corrupt file yields an empty
    /// ledger and the file is rewritten with an empty, valid payload.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        match read_state(&path).await {
            Ok(state) => {
                info!(
                    "Loaded ledger from {} ({} posts, {} comments)",
                    path.display(),
                    state.posts.len(),
                    state.comments.len()
                );
                Self::with_state(path, state)
            }
            Err(e) => {
                e.log_warn();
                let ledger = Self::empty(path);
                if let Err(e) = ledger.try_persist().await {
                    e.log_error();
                }
                ledger
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn contains(&self, kind: ItemKind, id: &str) -> bool {
        self.state.lock().await.ids(kind).contains(id)
    }

    /// Records `id` as seen. Returns `true` only for the caller that inserted
    /// it, which makes this the check-then-mark primitive for concurrent ticks.
    pub async fn mark_seen(&self, kind: ItemKind, id: &str) -> bool {
        let inserted = self.state.lock().await.ids_mut(kind).insert(id.to_string());
        if inserted {
            debug!("Marked {} {} as seen", kind, id);
        }
        inserted
    }

    pub async fn len(&self, kind: ItemKind) -> usize {
        self.state.lock().await.ids(kind).len()
    }

    pub async fn snapshot(&self) -> LedgerState {
        self.state.lock().await.clone()
    }

    /// Writes the current state, logging instead of failing.
    pub async fn persist(&self) {
        if let Err(e) = self.try_persist().await {
            e.log_error();
        }
    }

    pub async fn try_persist(&self) -> Result<(), CoreError> {
        let _write_guard = self.write_lock.lock().await;
        // Snapshot under the write lock so a later flush always carries a
        // superset of what an earlier one wrote.
        let snapshot = self.snapshot().await;
        let payload = serde_json::to_vec(&snapshot)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || atomic_write(&path, &payload))
            .await
            .map_err(|e| CoreError::Internal {
                message: format!("ledger write task failed: {}", e),
            })??;

        debug!(
            "Persisted ledger to {} ({} posts, {} comments)",
            self.path.display(),
            snapshot.posts.len(),
            snapshot.comments.len()
        );
        Ok(())
    }
}

async fn read_state(path: &Path) -> Result<LedgerState, CoreError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        PersistenceError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })?;

    serde_json::from_str(&raw).map_err(|e| {
        warn!("Ledger file {} is not valid JSON", path.display());
        CoreError::Persistence(PersistenceError::CorruptState {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    })
}

/// Temp file in the target directory, then rename over the target.
fn atomic_write(path: &Path, payload: &[u8]) -> Result<(), CoreError> {
    let write_failed = |reason: String| {
        CoreError::Persistence(PersistenceError::WriteFailed {
            path: path.display().to_string(),
            reason,
        })
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| write_failed(e.to_string()))?;

    let mut temp =
        tempfile::NamedTempFile::new_in(&parent).map_err(|e| write_failed(e.to_string()))?;
    temp.write_all(payload)
        .map_err(|e| write_failed(e.to_string()))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| write_failed(e.to_string()))?;
    temp.persist(path)
        .map_err(|e| write_failed(e.error.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_load_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");
        std::fs::write(&path, r#"{"posts":["abc"],"comments":[]}"#).unwrap();

        let ledger = Ledger::load(&path).await;
        assert!(ledger.contains(ItemKind::Post, "abc").await);
        assert!(!ledger.contains(ItemKind::Comment, "abc").await);
    }

    #[tokio::test]
    async fn test_missing_file_is_created_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");

        let ledger = Ledger::load(&path).await;
        assert_eq!(ledger.len(ItemKind::Post).await, 0);

        let raw = std::fs::read_to_string(&path).unwrap();
        let state: LedgerState = serde_json::from_str(&raw).unwrap();
        assert_eq!(state, LedgerState::default());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");
        std::fs::write(&path, "{ not json").unwrap();

        let ledger = Ledger::load(&path).await;
        assert_eq!(ledger.snapshot().await, LedgerState::default());

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, r#"{"posts":[],"comments":[]}"#);
    }

    #[tokio::test]
    async fn test_partial_object_defaults_missing_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");
        std::fs::write(&path, r#"{"comments":["c1"]}"#).unwrap();

        let ledger = Ledger::load(&path).await;
        assert!(ledger.contains(ItemKind::Comment, "c1").await);
        assert_eq!(ledger.len(ItemKind::Post).await, 0);
    }

    #[tokio::test]
    async fn test_mark_seen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::empty(dir.path().join("seen.json"));
        assert!(ledger.mark_seen(ItemKind::Comment, "c1").await);
        assert!(!ledger.mark_seen(ItemKind::Comment, "c1").await);
        // Kinds are partitioned.
        assert!(ledger.mark_seen(ItemKind::Post, "c1").await);
        assert_eq!(ledger.len(ItemKind::Comment).await, 1);
    }

    #[tokio::test]
    async fn test_persist_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("seen.json");

        let ledger = Ledger::empty(&path);
        ledger.mark_seen(ItemKind::Post, "p1").await;
        ledger.mark_seen(ItemKind::Comment, "c1").await;
        ledger.try_persist().await.unwrap();

        let reloaded = Ledger::load(&path).await;
        assert!(reloaded.contains(ItemKind::Post, "p1").await);
        assert!(reloaded.contains(ItemKind::Comment, "c1").await);
    }

    #[tokio::test]
    async fn test_concurrent_mark_seen_has_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(Ledger::empty(dir.path().join("seen.json")));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.mark_seen(ItemKind::Post, "same").await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_concurrent_persists_leave_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");
        let ledger = Arc::new(Ledger::empty(&path));

        let mut handles = Vec::new();
        for i in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.mark_seen(ItemKind::Post, &format!("p{}", i)).await;
                ledger.persist().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let raw = std::fs::read_to_string(&path).unwrap();
        let state: LedgerState = serde_json::from_str(&raw).unwrap();
        assert_eq!(state.posts.len(), 8);
    }
}
