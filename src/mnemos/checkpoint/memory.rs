// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CheckpointMetadata, CheckpointStore, CheckpointSummary, Snapshot, SnapshotLog};
use crate::adk::error::CheckpointError;
use crate::mnemos::state::State;

/// Process-memory checkpoint store
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    log: RwLock<SnapshotLog>,
    max_per_session: Option<usize>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_per_session(mut self, max: usize) -> Self {
        self.max_per_session = Some(max);
        self
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn create(
        &self,
        session_id: &str,
        state: &State,
        metadata: CheckpointMetadata,
    ) -> Result<String, CheckpointError> {
        let mut log = self.log.write().await;
        let snapshot = log.prepare(session_id, state, metadata);
        let checkpoint_id = snapshot.checkpoint_id.clone();
        let pruned = log.append(snapshot, self.max_per_session);
        log::debug!(
            "[{}] checkpoint {} created (turn {}), pruned {}",
            session_id,
            checkpoint_id,
            state.turn,
            pruned.len()
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
