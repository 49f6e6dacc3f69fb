// SPDX-License-Identifier: MIT

//! Structured fact extractor

use async_trait::async_trait;
use std::sync::Arc;

use super::{Node, NodeContext, NodeKind};
use crate::adk::error::NodeFailure;
use crate::adk::model::Invoker;
use crate::mnemos::policy::parse_facts;
use crate::mnemos::state::{FactRecord, PartialUpdate};

const EXTRACTION_PROMPT: &str = "Extract durable facts about the user from the message below. \
Respond with a JSON array of objects with string fields \"key\", \"value\" and \"category\" \
(identity, preference, plan, or general). Use snake_case keys. \
Respond with [] if there is nothing worth remembering.";

pub struct FactExtractor {
    invoker: Arc<dyn Invoker>,
}

impl FactExtractor {
    pub fn new(invoker: Arc<dyn Invoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl Node for FactExtractor {
    fn kind(&self) -> NodeKind {
        NodeKind::FactExtractor
    }

    async fn run(&self, ctx: &NodeContext) -> Result<PartialUpdate, NodeFailure> {
        let kind = self.kind();
        let prompt = format!(
            "{}\n\nMessage: {}",
            EXTRACTION_PROMPT, ctx.input.user_message.content
        );
        // known facts let the model reuse existing keys
        let known = ctx
            .snapshot
            .facts
            .iter()
            .map(|(key, fact)| format!("{}: {}", key, fact.value))
            .collect::<Vec<_>>()
            .join("\n");

        let raw = self
            .invoker
            .invoke(&prompt, &known)
            .await
            .map_err(|e| NodeFailure::Invoke(e.to_string()))?;

        let facts = match parse_facts(&raw) {
            Ok(facts) => facts,
            Err(e) => {
                log::warn!(
                    "[{}] turn {}: discarding extractor output: {}",
                    ctx.input.session_id,
                    ctx.input.turn,
                    e
                );
                return Ok(ctx.update(kind).with_trace(ctx.trace(kind, "unparseable", e)));
            }
        };

        let keys = facts.iter().map(|f| f.key.as_str()).collect::<Vec<_>>().join(",");
        let mut update = ctx.update(kind).with_trace(ctx.trace(
            kind,
            "extracted",
            format!("{} facts [{}]", facts.len(), keys),
        ));
        for fact in facts {
            update = update.with_fact(
                fact.key,
                FactRecord {
                    value: fact.value,
                    category: fact.category,
                    timestamp: ctx.input.started_at,
                },
            );
        }
        Ok(update)
    }
}
