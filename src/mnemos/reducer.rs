// SPDX-License-Identifier: MIT

//! Reducer engine
//!
//! `reduce(prior, updates)` is pure: the same prior state and the same set of
//! updates, in any order, yield an identical next state. Each channel has its
//! own merge rule (see [`Channel::merge_rule`](crate::mnemos::state::Channel::merge_rule)).

use std::collections::{BTreeSet, HashSet};

use crate::adk::error::ReducerError;
use crate::mnemos::state::{
    normalize_key, Channel, Message, PartialUpdate, ProfileRecord, RetrievedContext, State,
    SummaryRecord, TraceEntry,
};

/// Default bound on the trace channel
pub const DEFAULT_TRACE_CAP: usize = 200;

/// Deterministic multi-channel reducer
#[derive(Debug, Clone, Copy)]
pub struct Reducer {
    trace_cap: usize,
}

impl Default for Reducer {
    fn default() -> Self {
        Self::new(DEFAULT_TRACE_CAP)
    }
}

impl Reducer {
    pub fn new(trace_cap: usize) -> Self {
        Self { trace_cap }
    }

    pub fn trace_cap(&self) -> usize {
        self.trace_cap
    }

    /// Merge all partial updates into the next state
    ///
    /// Only channels some update writes to are merged, each with its
    /// registered rule; untouched channels carry over from `prior`.
    pub fn reduce(&self, prior: &State, updates: &[PartialUpdate]) -> Result<State, ReducerError> {
        let mut next = prior.clone();

        let touched: BTreeSet<Channel> = updates.iter().flat_map(|u| u.touched_channels()).collect();
        for channel in touched {
            log::trace!("Merging {} ({:?})", channel, channel.merge_rule());
            match channel {
                Channel::Messages => merge_messages(&mut next.messages, updates),
                Channel::Summary => next.summary = merge_summary(prior.summary.as_ref(), updates)?,
                Channel::Facts => merge_facts(&mut next, updates),
                Channel::Profile => {
                    if let Some(profile) = merge_profile(updates)? {
                        next.profile = Some(profile);
                    }
                }
                Channel::Trace => merge_trace(&mut next.trace, updates, self.trace_cap),
                Channel::RetrievedContext => {
                    if let Some(context) = merge_retrieved_context(updates) {
                        next.retrieved_context = Some(context);
                    }
                }
            }
        }

        log::debug!(
            "Reduced {} updates: {} messages, summary v{}, {} facts, {} trace entries",
            updates.len(),
            next.messages.len(),
            next.summary_version(),
            next.facts.len(),
            next.trace.len()
        );
        Ok(next)
    }
}

/// Append new messages ordered by (seq, position, id), skipping known ids
fn merge_messages(messages: &mut Vec<Message>, updates: &[PartialUpdate]) {
    let mut proposals: Vec<(u32, usize, &Message)> = updates
        .iter()
        .flat_map(|u| {
            u.messages
                .iter()
                .enumerate()
                .map(move |(pos, m)| (u.seq, pos, m))
        })
        .collect();
    proposals.sort_by(|a, b| {
        (a.0, a.1, a.2.id.as_str(), a.2.timestamp).cmp(&(b.0, b.1, b.2.id.as_str(), b.2.timestamp))
    });

    let mut seen: HashSet<String> = messages.iter().map(|m| m.id.clone()).collect();
    for (_, _, message) in proposals {
        if seen.insert(message.id.clone()) {
            messages.push(message.clone());
        }
    }
}

fn merge_summary(
    prior: Option<&SummaryRecord>,
    updates: &[PartialUpdate],
) -> Result<Option<SummaryRecord>, ReducerError> {
    let mut proposals: Vec<&SummaryRecord> =
        updates.iter().filter_map(|u| u.summary.as_ref()).collect();
    proposals.sort_by(|a, b| {
        (a.version, a.text.as_str(), a.covered_messages, a.updated_at).cmp(&(
            b.version,
            b.text.as_str(),
            b.covered_messages,
            b.updated_at,
        ))
    });

    let mut current = prior.cloned();
    for proposed in proposals {
        let current_version = current.as_ref().map(|s| s.version).unwrap_or(0);
        if proposed.version > current_version {
            current = Some(proposed.clone());
        } else if proposed.version == current_version {
            match &current {
                Some(existing) if existing.text == proposed.text => {}
                Some(existing) => {
                    return Err(ReducerError::SummaryVersionConflict {
                        version: proposed.version,
                        existing: existing.text.clone(),
                        proposed: proposed.text.clone(),
                    });
                }
                // version 0 without a prior summary carries no information
                None => {}
            }
        } else {
            log::debug!(
                "Ignoring stale summary v{} (current v{})",
                proposed.version,
                current_version
            );
        }
    }
    Ok(current)
}

/// Keep the highest-precedence record per normalized key
fn merge_facts(state: &mut State, updates: &[PartialUpdate]) {
    for proposal in updates.iter().flat_map(|u| u.facts.iter()) {
        let key = normalize_key(&proposal.key);
        if key.is_empty() {
            continue;
        }
        let replace = match state.facts.get(&key) {
            Some(existing) => proposal.record.precedence() > existing.precedence(),
            None => true,
        };
        if replace {
            state.facts.insert(key, proposal.record.clone());
        }
    }
}

fn merge_profile(updates: &[PartialUpdate]) -> Result<Option<ProfileRecord>, ReducerError> {
    let mut distinct: Vec<&ProfileRecord> = Vec::new();
    let mut writers: Vec<String> = Vec::new();
    for update in updates {
        if let Some(profile) = &update.profile {
            writers.push(update.source.clone());
            if !distinct.contains(&profile) {
                distinct.push(profile);
            }
        }
    }
    match distinct.len() {
        0 => Ok(None),
        1 => Ok(Some(distinct[0].clone())),
        _ => {
            writers.sort();
            writers.dedup();
            Err(ReducerError::ConcurrentProfileWriters { writers })
        }
    }
}

fn merge_trace(trace: &mut Vec<TraceEntry>, updates: &[PartialUpdate], cap: usize) {
    let mut proposals: Vec<(u32, &str, usize, &TraceEntry)> = updates
        .iter()
        .flat_map(|u| {
            u.trace
                .iter()
                .enumerate()
                .map(move |(pos, e)| (u.seq, u.source.as_str(), pos, e))
        })
        .collect();
    proposals.sort_by(|a, b| trace_key(a).cmp(&trace_key(b)));
    proposals.dedup_by(|a, b| a.0 == b.0 && a.1 == b.1 && a.2 == b.2 && a.3 == b.3);

    trace.extend(proposals.into_iter().map(|(_, _, _, e)| e.clone()));
    if trace.len() > cap {
        let overflow = trace.len() - cap;
        trace.drain(..overflow);
    }
}

type TraceKey<'a> = (u32, &'a str, usize, u64, &'a str, &'a str, &'a str, chrono::DateTime<chrono::Utc>);

fn trace_key<'a>(p: &(u32, &'a str, usize, &'a TraceEntry)) -> TraceKey<'a> {
    let (seq, source, pos, entry) = *p;
    (
        seq,
        source,
        pos,
        entry.turn,
        entry.node.as_str(),
        entry.event.as_str(),
        entry.detail.as_str(),
        entry.timestamp,
    )
}

fn merge_retrieved_context(updates: &[PartialUpdate]) -> Option<RetrievedContext> {
    updates
        .iter()
        .filter_map(|u| u.retrieved_context.as_ref().map(|c| (u.seq, c)))
        .max_by(|a, b| {
            (a.0, a.1.content.as_str(), a.1.query.as_str(), a.1.hits, a.1.fetched_at).cmp(&(
                b.0,
                b.1.content.as_str(),
                b.1.query.as_str(),
                b.1.hits,
                b.1.fetched_at,
            ))
        })
        .map(|(_, c)| c.clone())
}
