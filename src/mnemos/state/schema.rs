// SPDX-License-Identifier: MIT

//! Channel registry: the six state channels and their merge rules

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named, independently merged slice of the session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Messages,
    Summary,
    Facts,
    Profile,
    Trace,
    RetrievedContext,
}

/// How proposals for a channel are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRule {
    /// Append in tie-break order, dropping ids already present
    AppendUnique,
    /// Replace only with a strictly higher version
    VersionedReplace,
    /// Upsert by key, highest precedence record wins
    KeyedUpsert,
    /// Whole-record replace, one writer per phase
    SingleWriter,
    /// Append then evict oldest beyond the cap
    BoundedAppend,
    /// Last writer within the turn, cleared before each turn
    Ephemeral,
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::Messages,
        Channel::Summary,
        Channel::Facts,
        Channel::Profile,
        Channel::Trace,
        Channel::RetrievedContext,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Channel::Messages => "messages",
            Channel::Summary => "summary",
            Channel::Facts => "facts",
            Channel::Profile => "profile",
            Channel::Trace => "trace",
            Channel::RetrievedContext => "retrieved_context",
        }
    }

    pub fn merge_rule(self) -> MergeRule {
        match self {
            Channel::Messages => MergeRule::AppendUnique,
            Channel::Summary => MergeRule::VersionedReplace,
            Channel::Facts => MergeRule::KeyedUpsert,
            Channel::Profile => MergeRule::SingleWriter,
            Channel::Trace => MergeRule::BoundedAppend,
            Channel::RetrievedContext => MergeRule::Ephemeral,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_six_distinct_channels() {
        let mut names: Vec<_> = Channel::ALL.iter().map(|c| c.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn test_channel_serde_names() {
        let json = serde_json::to_string(&Channel::RetrievedContext).unwrap();
        assert_eq!(json, "\"retrieved_context\"");
        let back: Channel = serde_yaml::from_str("summary").unwrap();
        assert_eq!(back, Channel::Summary);
    }

    #[test]
    fn test_merge_rules() {
        assert_eq!(Channel::Messages.merge_rule(), MergeRule::AppendUnique);
        assert_eq!(Channel::Summary.merge_rule(), MergeRule::VersionedReplace);
        assert_eq!(Channel::Facts.merge_rule(), MergeRule::KeyedUpsert);
        assert_eq!(Channel::Profile.merge_rule(), MergeRule::SingleWriter);
        assert_eq!(Channel::Trace.merge_rule(), MergeRule::BoundedAppend);
        assert_eq!(Channel::RetrievedContext.merge_rule(), MergeRule::Ephemeral);
    }
}
