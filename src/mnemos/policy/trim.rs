// SPDX-License-Identifier: MIT

//! Message trimming: token budget and turn limit
//!
//! Both trims never drop system messages and are deterministic given a
//! deterministic estimator.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::mnemos::state::{Message, Role};

/// Estimated token count of one message
pub type TokenEstimator = fn(&Message) -> usize;

/// Rough estimate: four characters per token, plus one for framing
pub fn estimate_tokens(message: &Message) -> usize {
    message.content.chars().count() / 4 + 1
}

pub fn total_tokens(messages: &[Message], estimator: TokenEstimator) -> usize {
    messages.iter().map(estimator).sum()
}

/// Messages kept and evicted by a trim, both in original order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrimOutcome {
    pub kept: Vec<Message>,
    pub evicted: Vec<Message>,
}

impl TrimOutcome {
    fn untouched(messages: &[Message]) -> Self {
        Self {
            kept: messages.to_vec(),
            evicted: Vec::new(),
        }
    }
}

/// Drop the oldest non-system message until the estimate fits the budget
pub fn trim_to_token_budget(
    messages: &[Message],
    budget: usize,
    estimator: TokenEstimator,
) -> TrimOutcome {
    let mut kept = messages.to_vec();
    let mut evicted = Vec::new();
    let mut total = total_tokens(&kept, estimator);

    while total > budget {
        let Some(index) = kept.iter().position(|m| !m.is_system()) else {
            break;
        };
        let dropped = kept.remove(index);
        total -= estimator(&dropped);
        evicted.push(dropped);
    }

    TrimOutcome { kept, evicted }
}

/// Keep only the last `max_turns` user/assistant exchanges
pub fn trim_to_turn_limit(messages: &[Message], max_turns: usize) -> TrimOutcome {
    let mut users_seen = 0;
    let mut cut = None;
    for (index, message) in messages.iter().enumerate().rev() {
        if message.role == Role::User {
            users_seen += 1;
            if users_seen > max_turns {
                cut = Some(index + 1);
                break;
            }
        }
    }

    let Some(cut) = cut else {
        return TrimOutcome::untouched(messages);
    };

    let mut outcome = TrimOutcome::default();
    for (index, message) in messages.iter().enumerate() {
        if index < cut && !message.is_system() {
            outcome.evicted.push(message.clone());
        } else {
            outcome.kept.push(message.clone());
        }
    }
    outcome
}

/// Retention applied to `messages` after the fan-in reduce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Token budget for the kept history (rolling/hybrid modes)
    #[serde(default)]
    pub token_budget: Option<usize>,
    /// Maximum number of user/assistant exchanges kept (every mode)
    #[serde(default)]
    pub max_turns: Option<usize>,
}

impl RetentionPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Turn limit first, then token budget
    pub fn apply(&self, messages: &[Message], estimator: TokenEstimator) -> TrimOutcome {
        let mut outcome = TrimOutcome::untouched(messages);
        if let Some(max_turns) = self.max_turns {
            outcome = trim_to_turn_limit(&outcome.kept, max_turns);
        }
        if let Some(budget) = self.token_budget {
            let by_budget = trim_to_token_budget(&outcome.kept, budget, estimator);
            outcome.kept = by_budget.kept;
            outcome.evicted.extend(by_budget.evicted);
        }

        if outcome.evicted.is_empty() {
            return outcome;
        }
        // restore original order across both passes
        let evicted_ids: HashSet<&str> = outcome.evicted.iter().map(|m| m.id.as_str()).collect();
        let evicted = messages
            .iter()
            .filter(|m| evicted_ids.contains(m.id.as_str()))
            .cloned()
            .collect();
        TrimOutcome {
            kept: outcome.kept,
            evicted,
        }
    }
}
