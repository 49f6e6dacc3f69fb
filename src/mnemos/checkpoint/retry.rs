// SPDX-License-Identifier: MIT

//! Retry wrapper for checkpoint stores

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use super::{CheckpointMetadata, CheckpointStore, CheckpointSummary, Snapshot};
use crate::adk::error::CheckpointError;
use crate::mnemos::state::State;

/// Retries transient (`Io`) failures with exponential backoff
pub struct RetryingCheckpointStore<S> {
    inner: S,
    max_retries: u32,
    retry_delay: Duration,
}

impl<S: CheckpointStore> RetryingCheckpointStore<S> {
    pub fn new(inner: S, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            retry_delay,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// `delay * 2^(attempt-1)`, exponent capped at 5
    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay * (1u32 << (attempt - 1).min(5))
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, CheckpointError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CheckpointError>>,
    {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
            match call().await {
                Ok(value) => return Ok(value),
                Err(CheckpointError::Io(message)) if attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "Checkpoint {} failed (attempt {}/{}): {}",
                        operation,
                        attempt,
                        self.max_retries + 1,
                        message
                    );
                }
                Err(CheckpointError::Io(message)) => {
                    log::error!("Checkpoint {} gave up: {}", operation, message);
                    return Err(CheckpointError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: message,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<S: CheckpointStore> CheckpointStore for RetryingCheckpointStore<S> {
    async fn create(
        &self,
        session_id: &str,
        state: &State,
        metadata: CheckpointMetadata,
    ) -> Result<String, CheckpointError> {
        self.with_retry("create", || {
            self.inner.create(session_id, state, metadata.clone())
        })
        .await
    }

    async fn list(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<CheckpointSummary>, CheckpointError> {
        self.with_retry("list", || self.inner.list(session_id, limit))
            .await
    }

    async fn restore(&self, checkpoint_id: &str) -> Result<Snapshot, CheckpointError> {
        self.with_retry("restore", || self.inner.restore(checkpoint_id))
            .await
    }
}
