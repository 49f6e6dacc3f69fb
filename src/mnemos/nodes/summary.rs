// SPDX-License-Identifier: MIT

//! Running-summary updater

use async_trait::async_trait;
use std::sync::Arc;

use super::{Node, NodeContext, NodeKind};
use crate::adk::error::NodeFailure;
use crate::adk::model::Invoker;
use crate::mnemos::policy::{fold_summary, render_transcript};
use crate::mnemos::state::{PartialUpdate, SummaryRecord};

const SUMMARY_PROMPT: &str = "Summarize the following conversation excerpt in a few sentences. \
Keep names, preferences, decisions and open requests. \
The context holds the summary written so far; do not repeat it.";

/// Summarizes exactly the messages this turn's retention trim evicts
pub struct SummaryUpdater {
    invoker: Arc<dyn Invoker>,
}

impl SummaryUpdater {
    pub fn new(invoker: Arc<dyn Invoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl Node for SummaryUpdater {
    fn kind(&self) -> NodeKind {
        NodeKind::SummaryUpdater
    }

    async fn run(&self, ctx: &NodeContext) -> Result<PartialUpdate, NodeFailure> {
        let kind = self.kind();
        let evicted = &ctx.input.evictions;
        if evicted.is_empty() {
            return Ok(ctx
                .update(kind)
                .with_trace(ctx.trace(kind, "skipped", "nothing to compact")));
        }

        let prior = ctx.snapshot.summary.as_ref();
        let prompt = format!("{}\n\n{}", SUMMARY_PROMPT, render_transcript(evicted));
        let context = prior.map(|s| s.text.as_str()).unwrap_or_default();
        let delta = self
            .invoker
            .invoke(&prompt, context)
            .await
            .map_err(|e| NodeFailure::Invoke(e.to_string()))?;

        let record = SummaryRecord {
            text: fold_summary(prior.map(|s| s.text.as_str()), &delta),
            version: ctx.snapshot.summary_version() + 1,
            covered_messages: prior.map(|s| s.covered_messages).unwrap_or(0) + evicted.len(),
            updated_at: ctx.input.started_at,
        };
        log::debug!(
            "[{}] turn {}: summary v{} covers {} messages",
            ctx.input.session_id,
            ctx.input.turn,
            record.version,
            record.covered_messages
        );

        let detail = format!("v{} (+{} messages)", record.version, evicted.len());
        Ok(ctx
            .update(kind)
            .with_summary(record)
            .with_trace(ctx.trace(kind, "summarized", detail)))
    }
}
