// SPDX-License-Identifier: MIT

//! Capability nodes
//!
//! A node is a function from a frozen state snapshot plus the turn input to a
//! [`PartialUpdate`]. Nodes never see each other's output within a phase.

mod answer;
mod facts;
mod metrics;
mod pii;
mod retrieval;
mod summary;

pub use answer::AnswerComposer;
pub use facts::FactExtractor;
pub use metrics::MetricsRecorder;
pub use pii::PiiFilter;
pub use retrieval::RetrievalFetcher;
pub use summary::SummaryUpdater;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::adk::error::NodeFailure;
use crate::adk::pii::PiiMode;
use crate::mnemos::router::MemoryMode;
use crate::mnemos::state::{Message, PartialUpdate, State, TraceEntry};

/// Sequence number of the executor's input stage
pub const INPUT_SEQ: u32 = 0;
/// Sequence number of the executor's finalize stage (assistant message)
pub const COMMIT_SEQ: u32 = 70;

/// The six capability nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    SummaryUpdater,
    FactExtractor,
    RetrievalFetcher,
    AnswerComposer,
    PiiFilter,
    MetricsRecorder,
}

impl NodeKind {
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::SummaryUpdater => "summary-updater",
            NodeKind::FactExtractor => "fact-extractor",
            NodeKind::RetrievalFetcher => "retrieval-fetcher",
            NodeKind::AnswerComposer => "answer-composer",
            NodeKind::PiiFilter => "pii-filter",
            NodeKind::MetricsRecorder => "metrics-recorder",
        }
    }

    /// Declared sequence number, the reducer's primary tie-break
    pub fn seq(self) -> u32 {
        match self {
            NodeKind::SummaryUpdater => 20,
            NodeKind::FactExtractor => 30,
            NodeKind::RetrievalFetcher => 40,
            NodeKind::AnswerComposer => 50,
            NodeKind::PiiFilter => 60,
            NodeKind::MetricsRecorder => 80,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a node knows about the turn being executed
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub session_id: String,
    /// Ordinal of the turn in progress (committed turns + 1)
    pub turn: u64,
    pub user_message: Message,
    pub mode: MemoryMode,
    pub pii_mode: PiiMode,
    /// Messages the post-reduce retention trim will evict this turn
    pub evictions: Vec<Message>,
    /// Summary version committed before this turn
    pub baseline_summary_version: u64,
    pub system_prompt: Option<String>,
    /// Single timestamp shared by every record produced this turn
    pub started_at: DateTime<Utc>,
}

/// Read-only view handed to a node
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub input: Arc<TurnInput>,
    pub snapshot: Arc<State>,
    /// Text produced by the previous finalize step, if any
    pub draft: Option<String>,
}

impl NodeContext {
    pub fn new(input: Arc<TurnInput>, snapshot: Arc<State>) -> Self {
        Self {
            input,
            snapshot,
            draft: None,
        }
    }

    pub fn with_draft(mut self, draft: impl Into<String>) -> Self {
        self.draft = Some(draft.into());
        self
    }

    /// Empty update attributed to `kind`
    pub fn update(&self, kind: NodeKind) -> PartialUpdate {
        PartialUpdate::new(kind.name(), kind.seq())
    }

    pub fn trace(&self, kind: NodeKind, event: &str, detail: impl Into<String>) -> TraceEntry {
        TraceEntry {
            turn: self.input.turn,
            seq: kind.seq(),
            node: kind.name().to_string(),
            event: event.to_string(),
            detail: detail.into(),
            timestamp: self.input.started_at,
        }
    }
}

#[async_trait]
pub trait Node: Send + Sync {
    fn kind(&self) -> NodeKind;

    async fn run(&self, ctx: &NodeContext) -> Result<PartialUpdate, NodeFailure>;
}
