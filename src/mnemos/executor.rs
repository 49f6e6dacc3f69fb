// SPDX-License-Identifier: MIT

//! Turn executor
//!
//! `Idle -> FanOut -> Barrier -> Reduce -> (ConditionalFanOut -> ConditionalReduce)?
//! -> Finalize -> Committed`. Every phase reads one frozen snapshot; the reducer is
//! the only place state changes. A failure anywhere before commit leaves the
//! session's committed state and checkpoint log untouched.

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::adk::error::{
    CheckpointError, MnemosError, NodeExecutionError, NodeFailure, Phase, Result,
};
use crate::adk::pii::PiiMode;
use crate::mnemos::checkpoint::{CheckpointMetadata, CheckpointStore, CheckpointSummary, Snapshot};
use crate::mnemos::config::EngineConfig;
use crate::mnemos::metrics::{LogMetricsSink, MetricsSink};
use crate::mnemos::nodes::{NodeContext, NodeKind, TurnInput, COMMIT_SEQ, INPUT_SEQ};
use crate::mnemos::policy::{estimate_tokens, RetentionPolicy};
use crate::mnemos::reducer::Reducer;
use crate::mnemos::router::{MemoryMode, MemoryRouter};
use crate::mnemos::session::SessionRepository;
use crate::mnemos::state::{
    MemorySnapshot, Message, PartialUpdate, ProfileRecord, State, TraceEntry,
};

/// One incoming user message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub session_id: String,
    pub user_id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub message: String,
    /// Falls back to the configured default when absent
    #[serde(default)]
    pub memory_mode: Option<String>,
    #[serde(default)]
    pub pii_mode: Option<String>,
}

impl TurnRequest {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            tenant_id: String::new(),
            message: message.into(),
            memory_mode: None,
            pii_mode: None,
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.memory_mode = Some(mode.into());
        self
    }

    pub fn with_pii_mode(mut self, mode: impl Into<String>) -> Self {
        self.pii_mode = Some(mode.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }
}

/// Result of a committed turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub turn: u64,
    pub checkpoint_id: String,
    pub response_text: String,
    pub memory_snapshot: MemorySnapshot,
    /// This turn's trace entries, in log order
    pub trace: Vec<TraceEntry>,
}

/// Executor knobs, usually taken from [`EngineConfig`]
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub default_mode: MemoryMode,
    pub default_pii_mode: PiiMode,
    pub system_prompt: Option<String>,
    pub retention: RetentionPolicy,
    pub trace_cap: usize,
    pub node_timeout: Duration,
    pub mask_history: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ExecutorSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            default_mode: config.default_mode,
            default_pii_mode: config.default_pii_mode,
            system_prompt: config.system_prompt.clone(),
            retention: config.retention,
            trace_cap: config.trace_cap,
            node_timeout: config.node_timeout(),
            mask_history: config.mask_history,
        }
    }
}

pub struct TurnExecutor {
    router: MemoryRouter,
    reducer: Reducer,
    sessions: SessionRepository,
    metrics: Arc<dyn MetricsSink>,
    settings: ExecutorSettings,
}

impl TurnExecutor {
    pub fn new(
        router: MemoryRouter,
        store: Arc<dyn CheckpointStore>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            router,
            reducer: Reducer::new(settings.trace_cap),
            sessions: SessionRepository::new(store),
            metrics: Arc::new(LogMetricsSink),
            settings,
        }
    }

    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub fn sessions(&self) -> &SessionRepository {
        &self.sessions
    }

    /// Execute one turn and commit it
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnResponse> {
        // routing is decided before the session is touched
        let plan = match &request.memory_mode {
            Some(name) => self.router.route(name)?,
            None => self.router.plan(self.settings.default_mode)?,
        };
        let mode = plan.mode;
        let pii_mode = match &request.pii_mode {
            Some(name) => name.parse::<PiiMode>()?,
            None => self.settings.default_pii_mode,
        };
        if request.message.trim().is_empty() {
            return Err(MnemosError::other("User message must not be empty"));
        }

        let session_id = request.session_id.clone();
        let mut session = self.sessions.lock(&session_id).await?;
        let committed = session.state().clone();
        let turn = committed.turn + 1;
        let started_at = Utc::now();
        log::info!("[{}] turn {} started (mode={}, pii={})", session_id, turn, mode, pii_mode);

        let mut base = committed.clone();
        base.retrieved_context = None;

        let user_message = Message::user(request.message.clone(), turn, started_at);
        let input_update = self.input_update(&request, &base, &user_message, mode, pii_mode);

        // what the last turn trimmed after its answer, then what this turn trims
        let retention = mode.retention(self.settings.retention);
        let mut pending = base.messages.clone();
        pending.extend(input_update.messages.iter().cloned());
        let mut evictions = session.unsummarized().to_vec();
        evictions.extend(retention.apply(&pending, estimate_tokens).evicted);

        let input = Arc::new(TurnInput {
            session_id: session_id.clone(),
            turn,
            user_message,
            mode,
            pii_mode,
            evictions,
            baseline_summary_version: committed.summary_version(),
            system_prompt: self.settings.system_prompt.clone(),
            started_at,
        });

        // FanOut -> Barrier -> Reduce
        log::debug!("[{}] turn {}: fan-out {:?}", session_id, turn, plan.fan_out);
        let snapshot = Arc::new(base.clone());
        let mut updates = vec![input_update];
        updates.extend(
            self.run_phase(&plan.fan_out, &NodeContext::new(input.clone(), snapshot), Phase::FanOut)
                .await?,
        );
        let mut state = self.reduce(&base, &updates, Phase::Reduce, &input)?;

        let trimmed = retention.apply(&state.messages, estimate_tokens);
        let evicted_count = trimmed.evicted.len();
        if evicted_count > 0 {
            log::info!(
                "[{}] turn {}: evicted {} messages, {} kept",
                session_id,
                turn,
                evicted_count,
                trimmed.kept.len()
            );
            state.messages = trimmed.kept;
        }

        // ConditionalFanOut -> ConditionalReduce
        if self.router.should_retrieve(&plan, &input.user_message.content) {
            log::debug!("[{}] turn {}: retrieval triggered", session_id, turn);
            let ctx = NodeContext::new(input.clone(), Arc::new(state.clone()));
            let updates = self
                .run_phase(&plan.conditional, &ctx, Phase::ConditionalFanOut)
                .await?;
            state = self.reduce(&state, &updates, Phase::ConditionalReduce, &input)?;
        }

        // Finalize
        let ctx = NodeContext::new(input.clone(), Arc::new(state.clone()));
        let answer = self.run_node(NodeKind::AnswerComposer, &ctx).await?;
        let raw = answer.output.clone().ok_or_else(|| {
            NodeExecutionError::new(
                NodeKind::AnswerComposer.name(),
                Phase::Finalize,
                NodeFailure::Capability("answer composer produced no output".to_string()),
            )
        })?;
        let filtered = self
            .run_node(NodeKind::PiiFilter, &ctx.clone().with_draft(raw.clone()))
            .await?;
        let response_text = filtered.output.clone().ok_or_else(|| {
            NodeExecutionError::new(
                NodeKind::PiiFilter.name(),
                Phase::Finalize,
                NodeFailure::Capability("pii filter produced no output".to_string()),
            )
        })?;

        let stored = if self.settings.mask_history {
            response_text.clone()
        } else {
            raw
        };
        let mut commit = PartialUpdate::new("executor", COMMIT_SEQ)
            .with_message(Message::assistant(stored, turn, started_at));
        if evicted_count > 0 {
            commit = commit.with_trace(stage_trace(
                &input,
                COMMIT_SEQ,
                "retention",
                "trimmed",
                format!("{} messages evicted", evicted_count),
            ));
        }
        state = self.reduce(&state, &[answer, filtered, commit], Phase::Finalize, &input)?;

        // the answer can push history over budget again; those messages are
        // summarized on the next turn
        let settled = retention.apply(&state.messages, estimate_tokens);
        let unsummarized = settled.evicted;
        let mut settle = PartialUpdate::new("executor", COMMIT_SEQ);
        if !unsummarized.is_empty() {
            log::info!(
                "[{}] turn {}: evicted {} messages after answer, {} kept",
                session_id,
                turn,
                unsummarized.len(),
                settled.kept.len()
            );
            state.messages = settled.kept;
            settle = settle.with_trace(stage_trace(
                &input,
                COMMIT_SEQ,
                "retention",
                "settled",
                format!("{} messages evicted after answer", unsummarized.len()),
            ));
        }

        let ctx = NodeContext::new(input.clone(), Arc::new(state.clone()));
        let recorded = self.run_node(NodeKind::MetricsRecorder, &ctx).await?;
        let metrics = recorded.metrics.clone();
        state = self.reduce(&state, &[settle, recorded], Phase::Finalize, &input)?;
        state.turn = turn;

        // Committed
        let metadata = CheckpointMetadata::turn(mode).with_unsummarized(unsummarized.clone());
        let checkpoint_id = self
            .sessions
            .store()
            .create(&session_id, &state, metadata)
            .await
            .map_err(|e| {
                log::error!("[{}] turn {}: checkpoint failed: {}", session_id, turn, e);
                e
            })?;
        session.commit(state.clone(), checkpoint_id.clone(), unsummarized);
        drop(session);
        log::info!(
            "[{}] turn {} committed as checkpoint {}",
            session_id,
            turn,
            checkpoint_id
        );

        if let Some(metrics) = metrics {
            if let Err(e) = self.metrics.record(&metrics).await {
                log::warn!("[{}] turn {}: metrics sink failed: {}", session_id, turn, e);
            }
        }

        Ok(TurnResponse {
            session_id,
            turn,
            checkpoint_id,
            response_text,
            memory_snapshot: state.snapshot(),
            trace: state.turn_trace(turn),
        })
    }

    /// Detached preview of a checkpoint; the live session is not touched
    pub async fn restore(&self, checkpoint_id: &str) -> Result<Snapshot> {
        Ok(self.sessions.store().restore(checkpoint_id).await?)
    }

    /// Make a restored snapshot the live state of its session
    pub async fn commit_restored(&self, session_id: &str, restored: Snapshot) -> Result<String> {
        if restored.session_id != session_id {
            return Err(CheckpointError::SessionMismatch {
                expected: restored.session_id,
                actual: session_id.to_string(),
            }
            .into());
        }

        let mut session = self.sessions.lock(session_id).await?;
        let metadata = CheckpointMetadata::restore(restored.metadata.mode, &restored.checkpoint_id)
            .with_unsummarized(restored.metadata.unsummarized.clone());
        let checkpoint_id = self
            .sessions
            .store()
            .create(session_id, &restored.state, metadata)
            .await?;
        log::info!(
            "[{}] restored checkpoint {} (turn {}) as {}",
            session_id,
            restored.checkpoint_id,
            restored.turn,
            checkpoint_id
        );
        session.commit(restored.state, checkpoint_id.clone(), restored.metadata.unsummarized);
        Ok(checkpoint_id)
    }

    pub async fn checkpoints(&self, session_id: &str, limit: usize) -> Result<Vec<CheckpointSummary>> {
        Ok(self.sessions.store().list(session_id, limit).await?)
    }

    /// Committed state of a session
    pub async fn state(&self, session_id: &str) -> Result<State> {
        Ok(self.sessions.state(session_id).await?)
    }

    /// Input stage: system message on the first turn, the user message, the
    /// profile when it changed, and an audit entry
    fn input_update(
        &self,
        request: &TurnRequest,
        base: &State,
        user_message: &Message,
        mode: MemoryMode,
        pii_mode: PiiMode,
    ) -> PartialUpdate {
        let turn = user_message.turn;
        let mut update = PartialUpdate::new("input", INPUT_SEQ);

        if let Some(prompt) = &self.settings.system_prompt {
            if !base.messages.iter().any(Message::is_system) {
                update = update.with_message(Message::system(
                    prompt.clone(),
                    turn,
                    user_message.timestamp,
                ));
            }
        }
        update = update.with_message(user_message.clone());

        let profile = ProfileRecord {
            user_id: request.user_id.clone(),
            tenant_id: request.tenant_id.clone(),
            memory_mode: mode,
            pii_mode,
        };
        if base.profile.as_ref() != Some(&profile) {
            update = update.with_profile(profile);
        }

        update.with_trace(TraceEntry {
            turn,
            seq: INPUT_SEQ,
            node: "input".to_string(),
            event: "received".to_string(),
            detail: format!("mode={} pii={}", mode, pii_mode),
            timestamp: user_message.timestamp,
        })
    }

    fn reduce(
        &self,
        prior: &State,
        updates: &[PartialUpdate],
        phase: Phase,
        input: &TurnInput,
    ) -> Result<State> {
        self.reducer.reduce(prior, updates).map_err(|e| {
            log::error!(
                "[{}] turn {}: reducer invariant violated during {}: {}",
                input.session_id,
                input.turn,
                phase,
                e
            );
            e.into()
        })
    }

    async fn run_node(&self, kind: NodeKind, ctx: &NodeContext) -> Result<PartialUpdate> {
        let mut updates = self.run_phase(&[kind], ctx, Phase::Finalize).await?;
        updates.pop().ok_or_else(|| {
            NodeExecutionError::new(
                kind.name(),
                Phase::Finalize,
                NodeFailure::Capability("node produced no update".to_string()),
            )
            .into()
        })
    }

    /// Run nodes concurrently against one context and wait for all of them.
    ///
    /// Any failure fails the phase; the reported error is the first failing
    /// node in plan order.
    async fn run_phase(
        &self,
        kinds: &[NodeKind],
        ctx: &NodeContext,
        phase: Phase,
    ) -> std::result::Result<Vec<PartialUpdate>, NodeExecutionError> {
        let timeout = self.settings.node_timeout;
        let mut tasks = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let node = self.router.get(kind).ok_or_else(|| {
                NodeExecutionError::new(
                    kind.name(),
                    phase,
                    NodeFailure::Capability("node not registered".to_string()),
                )
            })?;
            let ctx = ctx.clone();
            let handle = tokio::spawn(async move {
                match tokio::time::timeout(timeout, node.run(&ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(NodeFailure::Timeout(timeout)),
                }
            });
            tasks.push(async move { (kind, handle.await) });
        }

        let mut updates = Vec::with_capacity(kinds.len());
        let mut first_error = None;
        for (kind, joined) in join_all(tasks).await {
            let outcome = joined.unwrap_or_else(|e| Err(NodeFailure::Panicked(e.to_string())));
            match outcome {
                Ok(update) => updates.push(update),
                Err(failure) => {
                    log::error!(
                        "[{}] turn {}: node {} failed during {}: {}",
                        ctx.input.session_id,
                        ctx.input.turn,
                        kind,
                        phase,
                        failure
                    );
                    if first_error.is_none() {
                        first_error = Some(NodeExecutionError::new(kind.name(), phase, failure));
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(updates),
        }
    }
}

fn stage_trace(
    input: &TurnInput,
    seq: u32,
    node: &str,
    event: &str,
    detail: impl Into<String>,
) -> TraceEntry {
    TraceEntry {
        turn: input.turn,
        seq,
        node: node.to_string(),
        event: event.to_string(),
        detail: detail.into(),
        timestamp: input.started_at,
    }
}
