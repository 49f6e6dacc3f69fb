// SPDX-License-Identifier: MIT

//! PII filter applied to the composed answer

use async_trait::async_trait;
use std::sync::Arc;

use super::{Node, NodeContext, NodeKind};
use crate::adk::error::NodeFailure;
use crate::adk::pii::Masker;
use crate::mnemos::state::PartialUpdate;

pub struct PiiFilter {
    masker: Arc<dyn Masker>,
}

impl PiiFilter {
    pub fn new(masker: Arc<dyn Masker>) -> Self {
        Self { masker }
    }
}

#[async_trait]
impl Node for PiiFilter {
    fn kind(&self) -> NodeKind {
        NodeKind::PiiFilter
    }

    async fn run(&self, ctx: &NodeContext) -> Result<PartialUpdate, NodeFailure> {
        let kind = self.kind();
        let draft = ctx
            .draft
            .as_deref()
            .ok_or_else(|| NodeFailure::Capability("no composed answer to mask".to_string()))?;

        let masked = self
            .masker
            .mask(draft, ctx.input.pii_mode)
            .await
            .map_err(|e| NodeFailure::Capability(e.to_string()))?;

        let event = if masked == draft { "clean" } else { "masked" };
        Ok(ctx
            .update(kind)
            .with_output(masked)
            .with_trace(ctx.trace(kind, event, ctx.input.pii_mode.to_string())))
    }
}
