// SPDX-License-Identifier: MIT

//! Session repository
//!
//! One slot per session id holding the committed state, the id of its
//! head checkpoint and the messages trimmed after the last answer. Each slot has its own mutex: turns and commits for one
//! session run one at a time, different sessions never contend.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::adk::error::CheckpointError;
use crate::mnemos::checkpoint::CheckpointStore;
use crate::mnemos::state::{Message, State};

#[derive(Debug, Default)]
pub struct SessionSlot {
    loaded: bool,
    state: State,
    head: Option<String>,
    unsummarized: Vec<Message>,
}

impl SessionSlot {
    /// Last committed state
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Checkpoint the committed state was written to
    pub fn head(&self) -> Option<&str> {
        self.head.as_deref()
    }

    /// Evicted after the last answer, not yet folded into the summary
    pub fn unsummarized(&self) -> &[Message] {
        &self.unsummarized
    }

    /// Make `state` the authoritative state of the session
    pub fn commit(&mut self, state: State, checkpoint_id: String, unsummarized: Vec<Message>) {
        self.state = state;
        self.head = Some(checkpoint_id);
        self.unsummarized = unsummarized;
    }
}

pub type SessionGuard = OwnedMutexGuard<SessionSlot>;

#[derive(Clone)]
pub struct SessionRepository {
    store: Arc<dyn CheckpointStore>,
    slots: Arc<Mutex<HashMap<String, Arc<Mutex<SessionSlot>>>>>,
}

impl SessionRepository {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            store,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Exclusive access to a session, loading its latest checkpoint on first use
    pub async fn lock(&self, session_id: &str) -> Result<SessionGuard, CheckpointError> {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SessionSlot::default())))
                .clone()
        };

        let mut guard = slot.lock_owned().await;
        if !guard.loaded {
            if let Some(snapshot) = self.store.latest(session_id).await? {
                log::info!(
                    "[{}] resumed from checkpoint {} (turn {})",
                    session_id,
                    snapshot.checkpoint_id,
                    snapshot.turn
                );
                guard.state = snapshot.state;
                guard.head = Some(snapshot.checkpoint_id);
                guard.unsummarized = snapshot.metadata.unsummarized;
            }
            guard.loaded = true;
        }
        Ok(guard)
    }

    /// Copy of the committed state
    pub async fn state(&self, session_id: &str) -> Result<State, CheckpointError> {
        Ok(self.lock(session_id).await?.state().clone())
    }

    /// Sessions touched by this process, sorted
    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.slots.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mnemos::checkpoint::{CheckpointMetadata, InMemoryCheckpointStore};
    use crate::mnemos::router::MemoryMode;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fresh_session_is_empty() {
        let repo = SessionRepository::new(Arc::new(InMemoryCheckpointStore::new()));
        let guard = repo.lock("new").await.unwrap();
        assert_eq!(guard.state(), &State::new());
        assert!(guard.head().is_none());
    }

    #[tokio::test]
    async fn test_loads_latest_checkpoint() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let mut state = State::new();
        state.turn = 3;
        let id = store
            .create("s1", &state, CheckpointMetadata::turn(MemoryMode::Rolling))
            .await
            .unwrap();

        let repo = SessionRepository::new(store);
        let guard = repo.lock("s1").await.unwrap();
        assert_eq!(guard.state().turn, 3);
        assert_eq!(guard.head(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn test_loads_unsummarized_messages() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let carried = vec![Message::user("evicted", 1, chrono::Utc::now())];
        store
            .create(
                "s1",
                &State::new(),
                CheckpointMetadata::turn(MemoryMode::Hybrid).with_unsummarized(carried.clone()),
            )
            .await
            .unwrap();

        let repo = SessionRepository::new(store);
        let guard = repo.lock("s1").await.unwrap();
        assert_eq!(guard.unsummarized(), carried.as_slice());
    }

    #[tokio::test]
    async fn test_commit_is_visible_to_next_lock() {
        let repo = SessionRepository::new(Arc::new(InMemoryCheckpointStore::new()));
        {
            let mut guard = repo.lock("s1").await.unwrap();
            let mut next = guard.state().clone();
            next.turn = 1;
            guard.commit(next, "cp-1".to_string(), Vec::new());
        }
        assert_eq!(repo.state("s1").await.unwrap().turn, 1);
        assert_eq!(repo.session_ids().await, vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn test_same_session_serializes_other_sessions_do_not() {
        let repo = SessionRepository::new(Arc::new(InMemoryCheckpointStore::new()));
        let held = repo.lock("a").await.unwrap();

        // a different session is available immediately
        let other = tokio::time::timeout(Duration::from_millis(200), repo.lock("b")).await;
        assert!(other.is_ok());

        // the same session waits until the holder releases it
        let blocked = tokio::time::timeout(Duration::from_millis(50), repo.lock("a")).await;
        assert!(blocked.is_err());
        drop(held);
        let acquired = tokio::time::timeout(Duration::from_millis(200), repo.lock("a")).await;
        assert!(acquired.is_ok());
    }
}
