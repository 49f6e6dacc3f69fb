// SPDX-License-Identifier: MIT

//! Model module - the text-generation capability consumed by nodes
//!
//! Summarization, fact extraction and answer composition all go through a single
//! `invoke(prompt, context) -> text` call. Implementations:
//! - [openai] - OpenAI-compatible chat completions API

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// Core trait for the generation capability
///
/// `prompt` is the instruction for this call, `context` the memory blob the
/// caller assembled from state. Any error is treated as a node failure.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(
        &self,
        prompt: &str,
        context: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;
}
