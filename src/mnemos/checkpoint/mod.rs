// SPDX-License-Identifier: MIT

//! Checkpoint store
//!
//! Immutable, append-only state snapshots per session. Backends:
//!
//! | Type | Notes |
//! |------|-------|
//! | [`InMemoryCheckpointStore`] | process memory, lost on restart |
//! | [`FileCheckpointStore`] | single JSON file, written through on every create |
//! | [`RetryingCheckpointStore`] | wraps any store, retries transient I/O with backoff |

mod file;
mod memory;
mod retry;

pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;
pub use retry::RetryingCheckpointStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::adk::error::CheckpointError;
use crate::mnemos::config::{CheckpointBackend, CheckpointConfig};
use crate::mnemos::router::MemoryMode;
use crate::mnemos::state::{Message, State};

/// Current snapshot envelope format
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// What produced a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// A committed turn
    Turn,
    /// An explicit commit of a restored snapshot
    Restore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub mode: MemoryMode,
    pub source: CheckpointSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_from: Option<String>,
    /// Messages trimmed after the answer was added; the next turn summarizes them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsummarized: Vec<Message>,
}

impl CheckpointMetadata {
    pub fn turn(mode: MemoryMode) -> Self {
        Self {
            mode,
            source: CheckpointSource::Turn,
            restored_from: None,
            unsummarized: Vec::new(),
        }
    }

    pub fn restore(mode: MemoryMode, restored_from: impl Into<String>) -> Self {
        Self {
            mode,
            source: CheckpointSource::Restore,
            restored_from: Some(restored_from.into()),
            unsummarized: Vec::new(),
        }
    }

    pub fn with_unsummarized(mut self, messages: Vec<Message>) -> Self {
        self.unsummarized = messages;
        self
    }
}

/// Serialized checkpoint envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: u32,
    pub checkpoint_id: String,
    pub session_id: String,
    pub parent_id: Option<String>,
    pub turn: u64,
    pub created_at: DateTime<Utc>,
    pub metadata: CheckpointMetadata,
    pub state: State,
}

impl Snapshot {
    pub fn new(
        session_id: &str,
        parent_id: Option<String>,
        state: &State,
        metadata: CheckpointMetadata,
    ) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            checkpoint_id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            parent_id,
            turn: state.turn,
            created_at: Utc::now(),
            metadata,
            state: state.clone(),
        }
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            checkpoint_id: self.checkpoint_id.clone(),
            session_id: self.session_id.clone(),
            parent_id: self.parent_id.clone(),
            turn: self.turn,
            created_at: self.created_at,
            message_count: self.state.messages.len(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, CheckpointError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, CheckpointError> {
        migrate(serde_json::from_str(raw)?)
    }
}

/// Upgrade a raw envelope to the current schema.
///
/// Version 0 envelopes predate the `schema_version` field and carried no
/// metadata; they are read as turn checkpoints of the profile's mode.
pub fn migrate(mut raw: Value) -> Result<Snapshot, CheckpointError> {
    let found = raw
        .get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    if found > SNAPSHOT_SCHEMA_VERSION {
        return Err(CheckpointError::UnsupportedSchema {
            found,
            supported: SNAPSHOT_SCHEMA_VERSION,
        });
    }

    if found == 0 {
        let obj = raw.as_object_mut().ok_or_else(|| {
            CheckpointError::Serialization("snapshot envelope is not an object".to_string())
        })?;
        let mode = obj
            .get("state")
            .and_then(|s| s.get("profile"))
            .and_then(|p| p.get("memory_mode"))
            .cloned()
            .unwrap_or_else(|| json!(MemoryMode::Rolling));
        obj.entry("metadata")
            .or_insert_with(|| json!({ "mode": mode, "source": "turn" }));
        obj.insert("schema_version".to_string(), json!(SNAPSHOT_SCHEMA_VERSION));
        log::debug!("Migrated snapshot envelope from schema v0");
    }

    Ok(serde_json::from_value(raw)?)
}

/// Listing entry, without the state payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub checkpoint_id: String,
    pub session_id: String,
    pub parent_id: Option<String>,
    pub turn: u64,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
    pub metadata: CheckpointMetadata,
}

/// Persistence contract for state snapshots
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Write an immutable snapshot, returning its id
    async fn create(
        &self,
        session_id: &str,
        state: &State,
        metadata: CheckpointMetadata,
    ) -> Result<String, CheckpointError>;

    /// Checkpoints of a session, most recent first
    async fn list(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<CheckpointSummary>, CheckpointError>;

    /// Detached copy of a snapshot
    async fn restore(&self, checkpoint_id: &str) -> Result<Snapshot, CheckpointError>;

    /// Most recent snapshot of a session, if any
    async fn latest(&self, session_id: &str) -> Result<Option<Snapshot>, CheckpointError> {
        match self.list(session_id, 1).await?.first() {
            Some(summary) => Ok(Some(self.restore(&summary.checkpoint_id).await?)),
            None => Ok(None),
        }
    }
}

/// Build the configured backend, wrapped in the retry layer
pub fn open_store(config: &CheckpointConfig) -> Result<Arc<dyn CheckpointStore>, CheckpointError> {
    let delay = Duration::from_millis(config.retry_delay_ms);
    let store: Arc<dyn CheckpointStore> = match config.backend {
        CheckpointBackend::Memory => {
            let mut store = InMemoryCheckpointStore::new();
            if let Some(max) = config.max_per_session {
                store = store.with_max_per_session(max);
            }
            Arc::new(RetryingCheckpointStore::new(store, config.max_retries, delay))
        }
        CheckpointBackend::File => {
            let mut store = FileCheckpointStore::open(&config.path)?;
            if let Some(max) = config.max_per_session {
                store = store.with_max_per_session(max);
            }
            Arc::new(RetryingCheckpointStore::new(store, config.max_retries, delay))
        }
    };
    Ok(store)
}

/// Append-only per-session snapshot log shared by the backends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct SnapshotLog {
    sessions: HashMap<String, Vec<Snapshot>>,
}

impl SnapshotLog {
    /// Build from raw envelopes, migrating each to the current schema
    pub(crate) fn from_raw(raw: HashMap<String, Vec<Value>>) -> Result<Self, CheckpointError> {
        let mut sessions = HashMap::new();
        for (session_id, envelopes) in raw {
            let snapshots = envelopes
                .into_iter()
                .map(migrate)
                .collect::<Result<Vec<_>, _>>()?;
            sessions.insert(session_id, snapshots);
        }
        Ok(Self { sessions })
    }

    pub(crate) fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Next snapshot for a session, parented on its current head
    pub(crate) fn prepare(
        &self,
        session_id: &str,
        state: &State,
        metadata: CheckpointMetadata,
    ) -> Snapshot {
        let parent = self
            .sessions
            .get(session_id)
            .and_then(|log| log.last())
            .map(|s| s.checkpoint_id.clone());
        Snapshot::new(session_id, parent, state, metadata)
    }

    /// Append and prune the oldest beyond `max_per_session`; returns pruned ids
    pub(crate) fn append(&mut self, snapshot: Snapshot, max_per_session: Option<usize>) -> Vec<String> {
        let log = self.sessions.entry(snapshot.session_id.clone()).or_default();
        log.push(snapshot);
        match max_per_session {
            Some(max) if log.len() > max.max(1) => {
                let overflow = log.len() - max.max(1);
                log.drain(..overflow).map(|s| s.checkpoint_id).collect()
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn list(&self, session_id: &str, limit: usize) -> Vec<CheckpointSummary> {
        self.sessions
            .get(session_id)
            .map(|log| log.iter().rev().take(limit).map(Snapshot::summary).collect())
            .unwrap_or_default()
    }

    pub(crate) fn find(&self, checkpoint_id: &str) -> Result<Snapshot, CheckpointError> {
        self.sessions
            .values()
            .flat_map(|log| log.iter())
            .find(|s| s.checkpoint_id == checkpoint_id)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.to_string()))
    }
}
