// SPDX-License-Identifier: MIT

//! Conditional retrieval fetcher (hybrid mode)

use async_trait::async_trait;
use std::sync::Arc;

use super::{Node, NodeContext, NodeKind};
use crate::adk::error::NodeFailure;
use crate::adk::retrieval::Retriever;
use crate::mnemos::state::{PartialUpdate, RetrievedContext};

pub struct RetrievalFetcher {
    retriever: Arc<dyn Retriever>,
}

impl RetrievalFetcher {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Node for RetrievalFetcher {
    fn kind(&self) -> NodeKind {
        NodeKind::RetrievalFetcher
    }

    /// Always proposes a context once scheduled, even with zero hits
    async fn run(&self, ctx: &NodeContext) -> Result<PartialUpdate, NodeFailure> {
        let kind = self.kind();
        let query = ctx.input.user_message.content.clone();
        let result = self
            .retriever
            .retrieve(&ctx.input.session_id, &query, &ctx.snapshot)
            .await
            .map_err(|e| NodeFailure::Capability(e.to_string()))?;

        let detail = format!("{} hits", result.hits);
        Ok(ctx
            .update(kind)
            .with_retrieved_context(RetrievedContext {
                query,
                content: result.content,
                hits: result.hits,
                fetched_at: ctx.input.started_at,
            })
            .with_trace(ctx.trace(kind, "fetched", detail)))
    }
}
