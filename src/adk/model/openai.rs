// SPDX-License-Identifier: MIT

//! OpenAI Invoker - chat completions implementation of the generation capability

use super::{GenerationConfig, Invoker};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;
use std::error::Error;

/// OpenAI-compatible invoker
pub struct OpenAIInvoker {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
    config: GenerationConfig,
}

impl OpenAIInvoker {
    /// Create a new OpenAIInvoker
    ///
    /// Requires `OPENAI_API_KEY` environment variable to be set.
    /// Optionally uses `OPENAI_BASE_URL` for custom endpoints.
    pub fn new(
        model_name: String,
        config: GenerationConfig,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| "OPENAI_API_KEY must be set")?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            api_key,
            model_name,
            base_url,
            config,
        })
    }

    /// Build the request body: context as the system message, prompt as the user turn
    fn request_body(&self, prompt: &str, context: &str) -> serde_json::Value {
        let mut messages = Vec::new();
        if !context.trim().is_empty() {
            messages.push(json!({ "role": "system", "content": context }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let mut body = json!({
            "model": self.model_name,
            "messages": messages
        });

        if let Some(temp) = self.config.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = self.config.max_output_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }

    /// Extract the text of the first choice
    fn parse_response(
        response: &serde_json::Value,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let choice = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or("No choices in OpenAI response")?;

        match choice["message"]["content"].as_str() {
            Some(text) => Ok(text.to_string()),
            None => Err("OpenAI response has no text content".into()),
        }
    }
}

#[async_trait]
impl Invoker for OpenAIInvoker {
    async fn invoke(
        &self,
        prompt: &str,
        context: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(prompt, context);

        log::debug!(
            "OpenAI request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(format!("OpenAI API error: {}", text).into());
        }

        let resp_json: serde_json::Value = resp.json().await?;
        log::debug!("OpenAI response: {}", resp_json);

        Self::parse_response(&resp_json)
    }
}
