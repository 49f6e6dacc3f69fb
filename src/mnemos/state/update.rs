// SPDX-License-Identifier: MIT

//! Partial updates proposed by nodes and merged by the reducer

use serde::{Deserialize, Serialize};

use super::channels::{
    FactRecord, Message, ProfileRecord, RetrievedContext, SummaryRecord, TraceEntry,
};
use super::schema::Channel;
use crate::mnemos::metrics::TurnMetrics;

/// A proposed fact upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactProposal {
    pub key: String,
    pub record: FactRecord,
}

/// Proposal from one node (or executor stage) against a frozen snapshot
///
/// `seq` is the node-declared sequence number used for deterministic
/// ordering. `output` and `metrics` are side outputs the reducer ignores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialUpdate {
    pub source: String,
    pub seq: u32,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub summary: Option<SummaryRecord>,
    #[serde(default)]
    pub facts: Vec<FactProposal>,
    #[serde(default)]
    pub profile: Option<ProfileRecord>,
    #[serde(default)]
    pub trace: Vec<TraceEntry>,
    #[serde(default)]
    pub retrieved_context: Option<RetrievedContext>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub metrics: Option<TurnMetrics>,
}

impl PartialUpdate {
    pub fn new(source: impl Into<String>, seq: u32) -> Self {
        Self {
            source: source.into(),
            seq,
            messages: Vec::new(),
            summary: None,
            facts: Vec::new(),
            profile: None,
            trace: Vec::new(),
            retrieved_context: None,
            output: None,
            metrics: None,
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_summary(mut self, summary: SummaryRecord) -> Self {
        self.summary = Some(summary);
        self
    }

    pub fn with_fact(mut self, key: impl Into<String>, record: FactRecord) -> Self {
        self.facts.push(FactProposal {
            key: key.into(),
            record,
        });
        self
    }

    pub fn with_profile(mut self, profile: ProfileRecord) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_trace(mut self, entry: TraceEntry) -> Self {
        self.trace.push(entry);
        self
    }

    pub fn with_retrieved_context(mut self, context: RetrievedContext) -> Self {
        self.retrieved_context = Some(context);
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_metrics(mut self, metrics: TurnMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Channels this update writes to
    pub fn touched_channels(&self) -> Vec<Channel> {
        let mut channels = Vec::new();
        if !self.messages.is_empty() {
            channels.push(Channel::Messages);
        }
        if self.summary.is_some() {
            channels.push(Channel::Summary);
        }
        if !self.facts.is_empty() {
            channels.push(Channel::Facts);
        }
        if self.profile.is_some() {
            channels.push(Channel::Profile);
        }
        if !self.trace.is_empty() {
            channels.push(Channel::Trace);
        }
        if self.retrieved_context.is_some() {
            channels.push(Channel::RetrievedContext);
        }
        channels
    }
}
