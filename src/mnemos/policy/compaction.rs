// SPDX-License-Identifier: MIT

//! Summary compaction helpers

use crate::mnemos::state::Message;

/// Render messages as `[role]: content` lines for a summarization prompt
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("[{}]: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fold a delta into the running summary text
pub fn fold_summary(prior: Option<&str>, delta: &str) -> String {
    let delta = delta.trim();
    match prior.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prior) if delta.is_empty() => prior.to_string(),
        Some(prior) => format!("{prior}\n{delta}"),
        None => delta.to_string(),
    }
}
