// SPDX-License-Identifier: MIT

//! JSON-file checkpoint store
//!
//! The whole log lives in one file keyed by session id. Reads are served from
//! memory; every create is written through before it returns.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::{CheckpointMetadata, CheckpointStore, CheckpointSummary, Snapshot, SnapshotLog};
use crate::adk::error::CheckpointError;
use crate::mnemos::state::State;

pub struct FileCheckpointStore {
    path: PathBuf,
    log: RwLock<SnapshotLog>,
    max_per_session: Option<usize>,
}

impl FileCheckpointStore {
    /// Open or create the store file, creating parent directories
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = expand_tilde(path.as_ref());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| CheckpointError::Io(format!("create {}: {}", parent.display(), e)))?;
        }

        let log = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| CheckpointError::Io(format!("read {}: {}", path.display(), e)))?;
            if raw.trim().is_empty() {
                SnapshotLog::default()
            } else {
                let envelopes: HashMap<String, Vec<Value>> = serde_json::from_str(&raw)?;
                SnapshotLog::from_raw(envelopes)?
            }
        } else {
            SnapshotLog::default()
        };

        log::info!(
            "Opened checkpoint store {} ({} sessions)",
            path.display(),
            log.session_count()
        );
        Ok(Self {
            path,
            log: RwLock::new(log),
            max_per_session: None,
        })
    }

    pub fn with_max_per_session(mut self, max: usize) -> Self {
        self.max_per_session = Some(max);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write to a sibling temp file, then rename over the store file
    async fn flush(&self, log: &SnapshotLog) -> Result<(), CheckpointError> {
        let json = serde_json::to_string_pretty(log)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| CheckpointError::Io(format!("write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| CheckpointError::Io(format!("rename {}: {}", self.path.display(), e)))?;
        log::debug!("Checkpoint store flushed to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn create(
        &self,
        session_id: &str,
        state: &State,
        metadata: CheckpointMetadata,
    ) -> Result<String, CheckpointError> {
        // the write lock serializes creates, so the file never races itself
        let mut log = self.log.write().await;
        let before = log.clone();
        let snapshot = log.prepare(session_id, state, metadata);
        let checkpoint_id = snapshot.checkpoint_id.clone();
        log.append(snapshot, self.max_per_session);

        if let Err(e) = self.flush(&log).await {
            *log = before;
            return Err(e);
        }
        log::info!(
            "[{}] checkpoint {} written (turn {})",
            session_id,
            checkpoint_id,
            state.turn
        );
        Ok(checkpoint_id)
    }

    async fn list(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<CheckpointSummary>, CheckpointError> {
        Ok(self.log.read().await.list(session_id, limit))
    }

    async fn restore(&self, checkpoint_id: &str) -> Result<Snapshot, CheckpointError> {
        self.log.read().await.find(checkpoint_id)
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}
