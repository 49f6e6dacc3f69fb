// SPDX-License-Identifier: MIT

//! Engine configuration - YAML schema and loader
//!
//! Every field has a default, so an empty document is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::adk::error::{MnemosError, RoutingError};
use crate::adk::model::GenerationConfig;
use crate::adk::pii::PiiMode;
use crate::mnemos::policy::{RetentionPolicy, DEFAULT_TRIGGER_PHRASES};
use crate::mnemos::reducer::DEFAULT_TRACE_CAP;
use crate::mnemos::router::MemoryMode;

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_mode: MemoryMode,
    pub default_pii_mode: PiiMode,
    /// Written as the session's system message on its first turn
    pub system_prompt: Option<String>,
    pub retention: RetentionPolicy,
    pub trace_cap: usize,
    pub node_timeout_ms: u64,
    /// Store the masked answer in `messages` instead of the raw one
    pub mask_history: bool,
    pub retrieval: RetrievalConfig,
    pub checkpoint: CheckpointConfig,
    pub model: ModelConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_mode: MemoryMode::Rolling,
            default_pii_mode: PiiMode::Placeholder,
            system_prompt: Some("You are a helpful assistant.".to_string()),
            retention: RetentionPolicy {
                token_budget: Some(2000),
                max_turns: Some(20),
            },
            trace_cap: DEFAULT_TRACE_CAP,
            node_timeout_ms: 30_000,
            mask_history: false,
            retrieval: RetrievalConfig::default(),
            checkpoint: CheckpointConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    /// Reject values that make a strategy unusable
    pub fn validate(&self) -> Result<(), RoutingError> {
        if self.trace_cap == 0 {
            return Err(RoutingError::InvalidConfig("trace_cap must be at least 1".into()));
        }
        if self.node_timeout_ms == 0 {
            return Err(RoutingError::InvalidConfig("node_timeout_ms must be positive".into()));
        }
        if self.retention.token_budget == Some(0) {
            return Err(RoutingError::InvalidConfig(
                "retention.token_budget must be positive".into(),
            ));
        }
        if self.retention.max_turns == Some(0) {
            return Err(RoutingError::InvalidConfig(
                "retention.max_turns must be at least 1".into(),
            ));
        }
        if self.retrieval.trigger_phrases.iter().all(|p| p.trim().is_empty()) {
            return Err(RoutingError::InvalidConfig(
                "retrieval.trigger_phrases must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub trigger_phrases: Vec<String>,
    /// Maximum entries returned by the built-in retriever
    pub limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            trigger_phrases: DEFAULT_TRIGGER_PHRASES.iter().map(|p| p.to_string()).collect(),
            limit: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,
    pub path: PathBuf,
    pub max_per_session: Option<usize>,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::File,
            path: PathBuf::from("~/.mnemos/checkpoints.json"),
            max_per_session: None,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gpt-4o-mini".to_string(),
            temperature: Some(0.2),
            max_output_tokens: Some(1024),
        }
    }
}

impl ModelConfig {
    pub fn generation(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
    }
}

/// Loads engine configuration from YAML
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<EngineConfig, MnemosError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            MnemosError::config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::parse_yaml(&content)
    }

    /// Parse and validate a configuration document
    pub fn parse_yaml(content: &str) -> Result<EngineConfig, MnemosError> {
        let config: EngineConfig = if content.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }
}
