// SPDX-License-Identifier: MIT

//! Answer composer
//!
//! Runs against the merged state of the turn and produces the response text.
//! Its output is a side output; the executor decides what lands in `messages`.

use async_trait::async_trait;
use std::sync::Arc;

use super::{Node, NodeContext, NodeKind};
use crate::adk::error::NodeFailure;
use crate::adk::model::Invoker;
use crate::mnemos::policy::render_transcript;
use crate::mnemos::state::{Message, PartialUpdate, State};

pub struct AnswerComposer {
    invoker: Arc<dyn Invoker>,
}

impl AnswerComposer {
    pub fn new(invoker: Arc<dyn Invoker>) -> Self {
        Self { invoker }
    }
}

/// Memory blob handed to the model alongside the user message
pub fn compose_context(state: &State, system_prompt: Option<&str>, current: &Message) -> String {
    let mut sections = Vec::new();

    let system = state
        .messages
        .iter()
        .find(|m| m.is_system())
        .map(|m| m.content.as_str())
        .or(system_prompt);
    if let Some(system) = system {
        sections.push(system.to_string());
    }
    if let Some(summary) = &state.summary {
        sections.push(format!("Summary of earlier conversation:\n{}", summary.text));
    }
    if !state.facts.is_empty() {
        let facts = state
            .facts
            .iter()
            .map(|(key, fact)| format!("- {}: {} ({})", key, fact.value, fact.category))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("Known facts about the user:\n{}", facts));
    }
    if let Some(retrieved) = &state.retrieved_context {
        if !retrieved.content.is_empty() {
            sections.push(format!("Retrieved context:\n{}", retrieved.content));
        }
    }

    let history: Vec<Message> = state
        .messages
        .iter()
        .filter(|m| !m.is_system() && m.id != current.id)
        .cloned()
        .collect();
    if !history.is_empty() {
        sections.push(format!("Conversation so far:\n{}", render_transcript(&history)));
    }

    sections.join("\n\n")
}

#[async_trait]
impl Node for AnswerComposer {
    fn kind(&self) -> NodeKind {
        NodeKind::AnswerComposer
    }

    async fn run(&self, ctx: &NodeContext) -> Result<PartialUpdate, NodeFailure> {
        let kind = self.kind();
        let current = &ctx.input.user_message;
        let context = compose_context(&ctx.snapshot, ctx.input.system_prompt.as_deref(), current);

        let answer = self
            .invoker
            .invoke(&current.content, &context)
            .await
            .map_err(|e| NodeFailure::Invoke(e.to_string()))?;

        let detail = format!("{} chars", answer.chars().count());
        Ok(ctx
            .update(kind)
            .with_output(answer)
            .with_trace(ctx.trace(kind, "composed", detail)))
    }
}
