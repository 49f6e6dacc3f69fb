// SPDX-License-Identifier: MIT

//! Per-turn metrics records and sinks

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::mnemos::router::MemoryMode;

/// One append-only record per committed turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMetrics {
    pub session_id: String,
    pub turn: u64,
    pub mode: MemoryMode,
    pub message_count: usize,
    pub fact_count: usize,
    pub token_estimate: usize,
    pub summary_produced: bool,
    pub retrieval_produced: bool,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record(&self, metrics: &TurnMetrics) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Writes one structured log line per turn
#[derive(Debug, Clone, Default)]
pub struct LogMetricsSink;

#[async_trait]
impl MetricsSink for LogMetricsSink {
    async fn record(&self, metrics: &TurnMetrics) -> Result<(), Box<dyn Error + Send + Sync>> {
        log::info!("turn metrics: {}", serde_json::to_string(metrics)?);
        Ok(())
    }
}

/// Keeps every record in memory, mostly for tests and the HTTP surface
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetricsSink {
    records: Arc<RwLock<Vec<TurnMetrics>>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<TurnMetrics> {
        self.records.read().await.clone()
    }

    pub async fn for_session(&self, session_id: &str) -> Vec<TurnMetrics> {
        self.records
            .read()
            .await
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetricsSink {
    async fn record(&self, metrics: &TurnMetrics) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.records.write().await.push(metrics.clone());
        Ok(())
    }
}
