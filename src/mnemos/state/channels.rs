// SPDX-License-Identifier: MIT

//! Channel record types and the six-channel session state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::adk::pii::PiiMode;
use crate::mnemos::router::MemoryMode;

/// Speaker of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => f.write_str("system"),
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// A conversation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Content-derived identifier, see [`message_id`]
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Turn in which the message was proposed
    pub turn: u64,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, turn: u64, timestamp: DateTime<Utc>) -> Self {
        let content = content.into();
        Self {
            id: message_id(role, turn, &content),
            role,
            content,
            timestamp,
            turn,
        }
    }

    pub fn system(content: impl Into<String>, turn: u64, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::System, content, turn, timestamp)
    }

    pub fn user(content: impl Into<String>, turn: u64, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::User, content, turn, timestamp)
    }

    pub fn assistant(content: impl Into<String>, turn: u64, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::Assistant, content, turn, timestamp)
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// Stable hash over role and content, scoped by turn.
///
/// Re-applying the same turn's message yields the same id (and is discarded),
/// while a user repeating "ok" in a later turn is a distinct message.
pub fn message_id(role: Role, turn: u64, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(role.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(turn.to_le_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Running compaction of history that has been trimmed away
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub text: String,
    pub version: u64,
    /// Total number of messages folded into the summary so far
    pub covered_messages: usize,
    pub updated_at: DateTime<Utc>,
}

/// A structured fact extracted from the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactRecord {
    pub value: String,
    pub category: String,
    pub timestamp: DateTime<Utc>,
}

impl FactRecord {
    /// Total order deciding which record stays live for a key: later timestamp
    /// wins, then the larger value, then the larger category.
    pub fn precedence(&self) -> (DateTime<Utc>, &str, &str) {
        (self.timestamp, self.value.as_str(), self.category.as_str())
    }
}

/// Normalize a fact key: trim, case-fold, collapse inner whitespace to `_`
pub fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// User profile and settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub user_id: String,
    pub tenant_id: String,
    pub memory_mode: MemoryMode,
    pub pii_mode: PiiMode,
}

/// One line of the execution audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub turn: u64,
    pub seq: u32,
    pub node: String,
    pub event: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of an on-demand retrieval, cleared every turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub query: String,
    pub content: String,
    pub hits: usize,
    pub fetched_at: DateTime<Utc>,
}

/// Full per-session state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct State {
    /// Number of committed turns
    pub turn: u64,
    pub messages: Vec<Message>,
    pub summary: Option<SummaryRecord>,
    pub facts: BTreeMap<String, FactRecord>,
    pub profile: Option<ProfileRecord>,
    pub trace: Vec<TraceEntry>,
    pub retrieved_context: Option<RetrievedContext>,
}

impl State {
    /// Fresh session state, all channels empty
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary_version(&self) -> u64 {
        self.summary.as_ref().map(|s| s.version).unwrap_or(0)
    }

    /// Trace entries recorded for one turn, in log order
    pub fn turn_trace(&self, turn: u64) -> Vec<TraceEntry> {
        self.trace.iter().filter(|e| e.turn == turn).cloned().collect()
    }

    /// Channel-level counts and flags reported to callers
    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            message_count: self.messages.len(),
            fact_count: self.facts.len(),
            has_summary: self.summary.is_some(),
            summary_version: self.summary_version(),
            has_retrieved_context: self.retrieved_context.is_some(),
            trace_length: self.trace.len(),
        }
    }
}

/// Channel-level view of a state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub message_count: usize,
    pub fact_count: usize,
    pub has_summary: bool,
    pub summary_version: u64,
    pub has_retrieved_context: bool,
    pub trace_length: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_message_id_is_stable() {
        let a = Message::user("Hi, I'm Alice", 1, ts());
        let b = Message::user("Hi, I'm Alice", 1, ts() + chrono::Duration::seconds(5));
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 64);
    }

    #[test]
    fn test_message_id_depends_on_role_turn_content() {
        let base = message_id(Role::User, 1, "ok");
        assert_ne!(base, message_id(Role::Assistant, 1, "ok"));
        assert_ne!(base, message_id(Role::User, 2, "ok"));
        assert_ne!(base, message_id(Role::User, 1, "ok!"));
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  Favorite Color "), "favorite_color");
        assert_eq!(normalize_key("favorite_color"), "favorite_color");
        assert_eq!(normalize_key("HOME\tCity"), "home_city");
    }

    #[test]
    fn test_fact_precedence() {
        let older = FactRecord {
            value: "zebra".into(),
            category: "pref".into(),
            timestamp: ts(),
        };
        let newer = FactRecord {
            value: "apple".into(),
            category: "pref".into(),
            timestamp: ts() + chrono::Duration::seconds(1),
        };
        assert!(newer.precedence() > older.precedence());

        let tie = FactRecord {
            value: "zebra".into(),
            category: "pref".into(),
            timestamp: ts(),
        };
        let tie_smaller = FactRecord {
            value: "apple".into(),
            ..tie.clone()
        };
        assert!(tie.precedence() > tie_smaller.precedence());
    }

    #[test]
    fn test_snapshot_counts() {
        let mut state = State::new();
        assert_eq!(state.snapshot().message_count, 0);
        assert!(!state.snapshot().has_summary);

        state.messages.push(Message::user("hello", 1, ts()));
        state.summary = Some(SummaryRecord {
            text: "s".into(),
            version: 3,
            covered_messages: 2,
            updated_at: ts(),
        });
        let snap = state.snapshot();
        assert_eq!(snap.message_count, 1);
        assert!(snap.has_summary);
        assert_eq!(snap.summary_version, 3);
        assert!(!snap.has_retrieved_context);
    }
}
