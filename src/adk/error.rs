// SPDX-License-Identifier: MIT

//! Typed error handling for mnemos-rs
//!
//! Every failure a turn can hit is attributable to a phase and, where relevant,
//! to a node. The top-level [`MnemosError`] wraps the per-concern enums.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for mnemos-rs
#[derive(Debug, Error)]
pub enum MnemosError {
    /// A node failed or timed out; the turn was aborted without mutating state
    #[error(transparent)]
    Node(#[from] NodeExecutionError),

    /// A reducer invariant was broken (programmer error, fail fast)
    #[error(transparent)]
    Reducer(#[from] ReducerError),

    /// Checkpoint persistence failed
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Unknown or misconfigured memory strategy, rejected before any node runs
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Configuration errors (missing env vars, unreadable config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper for compatibility
    #[error("{0}")]
    Other(String),
}

impl MnemosError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether the caller may simply retry the same turn
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Node(_) => true,
            Self::Checkpoint(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<&str> for MnemosError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for MnemosError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

/// Phase of the turn state machine in which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    FanOut,
    Reduce,
    ConditionalFanOut,
    ConditionalReduce,
    Finalize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::FanOut => "fan-out",
            Phase::Reduce => "reduce",
            Phase::ConditionalFanOut => "conditional fan-out",
            Phase::ConditionalReduce => "conditional reduce",
            Phase::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// A single node failed during one of the execution phases
#[derive(Debug, Error)]
#[error("Node '{node}' failed during {phase}: {failure}")]
pub struct NodeExecutionError {
    pub node: String,
    pub phase: Phase,
    pub failure: NodeFailure,
}

impl NodeExecutionError {
    pub fn new(node: impl Into<String>, phase: Phase, failure: NodeFailure) -> Self {
        Self {
            node: node.into(),
            phase,
            failure,
        }
    }
}

/// Why a node failed
#[derive(Debug, Error)]
pub enum NodeFailure {
    /// The generation/summarization/extraction capability returned an error
    #[error("invoke failed: {0}")]
    Invoke(String),

    /// Retrieval or masking capability returned an error
    #[error("capability failed: {0}")]
    Capability(String),

    /// The node did not finish within the configured timeout
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The node task panicked or was cancelled
    #[error("task aborted: {0}")]
    Panicked(String),
}

/// Reducer invariant violations
#[derive(Debug, Error)]
pub enum ReducerError {
    /// Two summary proposals share a version but differ in content
    #[error(
        "Summary version conflict at version {version}: existing {existing:?} vs proposed {proposed:?}"
    )]
    SummaryVersionConflict {
        version: u64,
        existing: String,
        proposed: String,
    },

    /// More than one node proposed a different profile in the same phase
    #[error("Concurrent profile writers in one phase: {writers:?}")]
    ConcurrentProfileWriters { writers: Vec<String> },
}

/// Checkpoint persistence errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Storage I/O failed (transient, eligible for retry)
    #[error("Checkpoint I/O error: {0}")]
    Io(String),

    /// Snapshot could not be encoded or decoded
    #[error("Checkpoint serialization error: {0}")]
    Serialization(String),

    /// No checkpoint with that id
    #[error("Checkpoint '{0}' not found")]
    NotFound(String),

    /// Snapshot written by a newer format than this build understands
    #[error("Unsupported snapshot schema version {found} (supported up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    /// A restored checkpoint was committed into a different session
    #[error("Checkpoint belongs to session '{expected}', not '{actual}'")]
    SessionMismatch { expected: String, actual: String },

    /// Retries were exhausted on a transient failure
    #[error("Checkpoint operation failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl CheckpointError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::RetriesExhausted { .. })
    }
}

impl From<serde_json::Error> for CheckpointError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Strategy routing errors
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Unknown memory mode
    #[error("Unknown memory mode: {0}")]
    UnknownMode(String),

    /// Unknown PII mode
    #[error("Unknown PII mode: {0}")]
    UnknownPiiMode(String),

    /// The mode needs a node that is not registered on the executor
    #[error("Memory mode '{mode}' requires node '{node}' which is not registered")]
    MissingNode { mode: String, node: String },

    /// Configuration values that make the strategy unusable
    #[error("Invalid strategy configuration: {0}")]
    InvalidConfig(String),
}

/// Convenient Result alias
pub type Result<T> = std::result::Result<T, MnemosError>;
