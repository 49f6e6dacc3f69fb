// SPDX-License-Identifier: MIT

//! Metrics recorder
//!
//! Pure: reads the finalized state and emits a [`TurnMetrics`] side output.
//! Writing it to a sink happens after commit.

use async_trait::async_trait;

use super::{Node, NodeContext, NodeKind};
use crate::adk::error::NodeFailure;
use crate::mnemos::metrics::TurnMetrics;
use crate::mnemos::policy::{estimate_tokens, total_tokens};
use crate::mnemos::state::PartialUpdate;

#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Node for MetricsRecorder {
    fn kind(&self) -> NodeKind {
        NodeKind::MetricsRecorder
    }

    async fn run(&self, ctx: &NodeContext) -> Result<PartialUpdate, NodeFailure> {
        let kind = self.kind();
        let state = &ctx.snapshot;
        let metrics = TurnMetrics {
            session_id: ctx.input.session_id.clone(),
            turn: ctx.input.turn,
            mode: ctx.input.mode,
            message_count: state.messages.len(),
            fact_count: state.facts.len(),
            token_estimate: total_tokens(&state.messages, estimate_tokens),
            summary_produced: state.summary_version() > ctx.input.baseline_summary_version,
            retrieval_produced: state.retrieved_context.is_some(),
            recorded_at: ctx.input.started_at,
        };
        let detail = format!(
            "messages={} facts={} tokens={}",
            metrics.message_count, metrics.fact_count, metrics.token_estimate
        );
        Ok(ctx
            .update(kind)
            .with_metrics(metrics)
            .with_trace(ctx.trace(kind, "recorded", detail)))
    }
}
