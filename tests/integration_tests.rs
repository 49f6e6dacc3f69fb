//! Integration tests for multi-turn memory behavior
//!
//! These tests drive the turn executor end to end using mock invokers.

use async_trait::async_trait;
use mnemos_rs::adk::error::{MnemosError, NodeFailure, Phase};
use mnemos_rs::adk::model::Invoker;
use mnemos_rs::adk::pii::PatternMasker;
use mnemos_rs::adk::retrieval::StateRetriever;
use mnemos_rs::mnemos::checkpoint::{
    CheckpointSource, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
};
use mnemos_rs::mnemos::executor::{ExecutorSettings, TurnExecutor, TurnRequest};
use mnemos_rs::mnemos::policy::{estimate_tokens, total_tokens, RetentionPolicy, RetrievalTrigger};
use mnemos_rs::mnemos::router::{MemoryMode, MemoryRouter};
use mnemos_rs::mnemos::state::Role;
use once_cell::sync::Lazy;
use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Mock Components
// ============================================================================

/// Facts the mock extractor reports, keyed by a word in the user message
static FACT_REPLIES: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        (
            "blue",
            r#"[{"key": "favorite_color", "value": "blue", "category": "preference"}]"#,
        ),
        (
            "green",
            r#"[{"key": "favorite_color", "value": "green", "category": "preference"}]"#,
        ),
        (
            "Alice",
            r#"```json
{"facts": [{"key": "name", "value": "Alice", "category": "identity"}]}
```"#,
        ),
    ]
});

/// Mock model that answers by prompt kind: extraction, summarization or chat
struct MockInvoker {
    summaries: AtomicUsize,
    fail_answers: AtomicBool,
    delay: Option<Duration>,
}

impl MockInvoker {
    fn new() -> Self {
        Self {
            summaries: AtomicUsize::new(0),
            fail_answers: AtomicBool::new(false),
            delay: None,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }
}

#[async_trait]
impl Invoker for MockInvoker {
    async fn invoke(
        &self,
        prompt: &str,
        _context: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if prompt.starts_with("Extract") {
            let reply = FACT_REPLIES
                .iter()
                .find(|(word, _)| prompt.contains(word))
                .map(|(_, reply)| *reply)
                .unwrap_or("[]");
            return Ok(reply.to_string());
        }
        if prompt.starts_with("Summarize") {
            let n = self.summaries.fetch_add(1, Ordering::SeqCst) + 1;
            return Ok(format!("summary part {}", n));
        }
        if self.fail_answers.load(Ordering::SeqCst) {
            return Err("model unavailable".into());
        }
        Ok(format!("You said: {}", prompt))
    }
}

fn router(invoker: Arc<MockInvoker>) -> MemoryRouter {
    MemoryRouter::standard(
        RetrievalTrigger::default(),
        invoker,
        Arc::new(PatternMasker::new()),
        Arc::new(StateRetriever::default()),
    )
}

fn settings(mode: MemoryMode, max_turns: Option<usize>) -> ExecutorSettings {
    ExecutorSettings {
        default_mode: mode,
        retention: RetentionPolicy {
            token_budget: None,
            max_turns,
        },
        ..ExecutorSettings::default()
    }
}

fn budget_settings(mode: MemoryMode, token_budget: usize) -> ExecutorSettings {
    ExecutorSettings {
        default_mode: mode,
        retention: RetentionPolicy {
            token_budget: Some(token_budget),
            max_turns: None,
        },
        ..ExecutorSettings::default()
    }
}

fn executor(settings: ExecutorSettings) -> (TurnExecutor, Arc<MockInvoker>) {
    let invoker = Arc::new(MockInvoker::new());
    let exec = TurnExecutor::new(
        router(invoker.clone()),
        Arc::new(InMemoryCheckpointStore::new()),
        settings,
    );
    (exec, invoker)
}

fn turn(message: &str) -> TurnRequest {
    TurnRequest::new("session-1", "alice", message)
}

// ============================================================================
// Memory Modes
// ============================================================================

#[tokio::test]
async fn test_rolling_keeps_short_conversation_whole() {
    let (exec, _) = executor(budget_settings(MemoryMode::Rolling, 2000));
    exec.run_turn(turn("Hi, I'm Alice")).await.unwrap();
    let response = exec.run_turn(turn("What's my name?")).await.unwrap();

    let state = exec.state("session-1").await.unwrap();
    let users: Vec<&str> = state
        .messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(users, vec!["Hi, I'm Alice", "What's my name?"]);
    assert!(state.summary.is_none());
    assert!(state.facts.is_empty());
    assert!(!response.memory_snapshot.has_summary);
    assert_eq!(response.memory_snapshot.fact_count, 0);
}

#[tokio::test]
async fn test_rolling_budget_evicts_oldest_messages() {
    let budget = 40;
    let (exec, _) = executor(budget_settings(MemoryMode::Rolling, budget));
    for i in 1..=5 {
        exec.run_turn(turn(&format!("Here is a fairly long message, number {}", i)))
            .await
            .unwrap();
        let state = exec.state("session-1").await.unwrap();
        assert!(total_tokens(&state.messages, estimate_tokens) <= budget);
        assert!(state.messages[0].is_system());
    }

    let state = exec.state("session-1").await.unwrap();
    assert!(!state
        .messages
        .iter()
        .any(|m| m.content.contains("number 1")));
    assert_eq!(
        state.messages.last().unwrap().content,
        "You said: Here is a fairly long message, number 5"
    );
    assert!(state.summary.is_none());
}

#[tokio::test]
async fn test_hybrid_budget_summarizes_evicted_history() {
    let budget = 40;
    let (exec, invoker) = executor(budget_settings(MemoryMode::Hybrid, budget));
    for i in 1..=3 {
        exec.run_turn(turn(&format!("Let me describe my trip to the mountains, part {}", i)))
            .await
            .unwrap();
        let state = exec.state("session-1").await.unwrap();
        assert!(total_tokens(&state.messages, estimate_tokens) <= budget);
    }

    let state = exec.state("session-1").await.unwrap();
    let summary = state.summary.expect("evicted history is summarized");
    assert!(summary.version >= 1);
    assert!(summary.covered_messages >= 1);
    assert!(summary.text.contains("summary part 1"));
    assert!(invoker.summaries.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_rolling_window_keeps_recent_turns() {
    let (exec, _) = executor(settings(MemoryMode::Rolling, Some(2)));
    for i in 1..=5 {
        exec.run_turn(turn(&format!("message number {}", i)))
            .await
            .unwrap();
    }

    let state = exec.state("session-1").await.unwrap();
    let contents: Vec<&str> = state
        .messages
        .iter()
        .filter(|m| !m.is_system())
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(
        contents,
        vec![
            "message number 4",
            "You said: message number 4",
            "message number 5",
            "You said: message number 5",
        ]
    );
    assert!(state.messages[0].is_system());
    assert_eq!(state.turn, 5);
    assert!(state.summary.is_none());
}

#[tokio::test]
async fn test_facts_upsert_latest_value() {
    let (exec, _) = executor(settings(MemoryMode::Facts, None));
    exec.run_turn(turn("My favorite color is blue")).await.unwrap();
    let first = exec.state("session-1").await.unwrap();
    assert_eq!(first.facts["favorite_color"].value, "blue");

    let response = exec
        .run_turn(turn("Actually, my favorite color is green now"))
        .await
        .unwrap();
    let state = exec.state("session-1").await.unwrap();
    assert_eq!(state.facts.len(), 1);
    assert_eq!(state.facts["favorite_color"].value, "green");
    assert_eq!(state.facts["favorite_color"].category, "preference");
    assert_eq!(response.memory_snapshot.fact_count, 1);
}

#[tokio::test]
async fn test_fenced_fact_reply_is_parsed() {
    let (exec, _) = executor(settings(MemoryMode::Facts, None));
    exec.run_turn(turn("Hi, I'm Alice")).await.unwrap();
    let state = exec.state("session-1").await.unwrap();
    assert_eq!(state.facts["name"].value, "Alice");
    assert_eq!(state.facts["name"].category, "identity");
}

#[tokio::test]
async fn test_summary_versions_increase_as_history_is_evicted() {
    let (exec, invoker) = executor(settings(MemoryMode::Summary, Some(1)));

    let first = exec.run_turn(turn("first topic")).await.unwrap();
    assert!(!first.memory_snapshot.has_summary);

    let mut last_version = 0;
    for i in 2..=5 {
        let response = exec
            .run_turn(turn(&format!("topic {}", i)))
            .await
            .unwrap();
        assert!(response.memory_snapshot.has_summary);
        assert!(response.memory_snapshot.summary_version > last_version);
        last_version = response.memory_snapshot.summary_version;
    }
    assert_eq!(last_version, 4);
    assert_eq!(invoker.summaries.load(Ordering::SeqCst), 4);

    let state = exec.state("session-1").await.unwrap();
    let summary = state.summary.unwrap();
    assert!(summary.text.contains("summary part 1"));
    assert!(summary.text.contains("summary part 4"));
    assert_eq!(summary.covered_messages, 8);
}

#[tokio::test]
async fn test_hybrid_retrieves_only_on_trigger() {
    let (exec, _) = executor(settings(MemoryMode::Hybrid, None));
    exec.run_turn(turn("My favorite color is blue")).await.unwrap();

    let recall = exec
        .run_turn(turn("Do you remember my favorite color?"))
        .await
        .unwrap();
    assert!(recall.memory_snapshot.has_retrieved_context);
    assert!(recall.trace.iter().any(|e| e.node == "retrieval-fetcher"));
    let state = exec.state("session-1").await.unwrap();
    let context = state.retrieved_context.unwrap();
    assert!(context.content.contains("favorite_color"));

    let plain = exec.run_turn(turn("What is the weather like?")).await.unwrap();
    assert!(!plain.memory_snapshot.has_retrieved_context);
    assert!(!plain.trace.iter().any(|e| e.node == "retrieval-fetcher"));
}

#[tokio::test]
async fn test_unknown_mode_leaves_no_trace() {
    let (exec, _) = executor(ExecutorSettings::default());
    let err = exec
        .run_turn(turn("hello").with_mode("episodic"))
        .await
        .unwrap_err();
    assert!(matches!(err, MnemosError::Routing(_)));
    assert!(!err.is_retryable());
    assert!(exec.checkpoints("session-1", 10).await.unwrap().is_empty());
}

// ============================================================================
// Failure Handling
// ============================================================================

#[tokio::test]
async fn test_node_failure_is_atomic() {
    let (exec, invoker) = executor(settings(MemoryMode::Facts, None));
    exec.run_turn(turn("My favorite color is blue")).await.unwrap();
    let before = exec.state("session-1").await.unwrap();

    invoker.fail_answers.store(true, Ordering::SeqCst);
    let err = exec
        .run_turn(turn("My favorite color is green"))
        .await
        .unwrap_err();
    match &err {
        MnemosError::Node(e) => {
            assert_eq!(e.node, "answer-composer");
            assert!(matches!(e.phase, Phase::Finalize));
            assert!(matches!(e.failure, NodeFailure::Invoke(_)));
        }
        other => panic!("expected node error, got {other:?}"),
    }
    assert!(err.is_retryable());

    let after = exec.state("session-1").await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.facts["favorite_color"].value, "blue");
    assert_eq!(exec.checkpoints("session-1", 10).await.unwrap().len(), 1);

    // the same turn succeeds once the model recovers
    invoker.fail_answers.store(false, Ordering::SeqCst);
    let retried = exec
        .run_turn(turn("My favorite color is green"))
        .await
        .unwrap();
    assert_eq!(retried.turn, 2);
}

#[tokio::test]
async fn test_slow_node_times_out() {
    let invoker = Arc::new(MockInvoker::slow(Duration::from_millis(500)));
    let exec = TurnExecutor::new(
        router(invoker),
        Arc::new(InMemoryCheckpointStore::new()),
        ExecutorSettings {
            node_timeout: Duration::from_millis(20),
            ..settings(MemoryMode::Facts, None)
        },
    );

    let err = exec.run_turn(turn("hello there")).await.unwrap_err();
    match err {
        MnemosError::Node(e) => {
            assert_eq!(e.node, "fact-extractor");
            assert!(matches!(e.phase, Phase::FanOut));
            assert!(matches!(e.failure, NodeFailure::Timeout(_)));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(exec.state("session-1").await.unwrap().turn, 0);
}

#[tokio::test]
async fn test_trace_stays_bounded() {
    let (exec, _) = executor(ExecutorSettings {
        trace_cap: 12,
        ..settings(MemoryMode::Hybrid, None)
    });
    for i in 0..10 {
        exec.run_turn(turn(&format!("do you remember item {}", i)))
            .await
            .unwrap();
    }
    let state = exec.state("session-1").await.unwrap();
    assert!(state.trace.len() <= 12);
    // oldest entries are dropped first
    assert_eq!(state.trace.last().unwrap().turn, 10);
    assert!(state.trace.iter().all(|e| e.turn >= 8));
}

// ============================================================================
// Checkpoints and Sessions
// ============================================================================

#[tokio::test]
async fn test_restore_and_recommit_earlier_checkpoint() {
    let (exec, _) = executor(settings(MemoryMode::Facts, None));
    exec.run_turn(turn("My favorite color is blue")).await.unwrap();
    exec.run_turn(turn("My favorite color is green")).await.unwrap();
    let third = exec.run_turn(turn("thanks")).await.unwrap();

    let listed = exec.checkpoints("session-1", 10).await.unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].turn, 3);
    let first_id = listed[2].checkpoint_id.clone();

    let snapshot = exec.restore(&first_id).await.unwrap();
    assert_eq!(snapshot.turn, 1);
    assert_eq!(snapshot.state.facts["favorite_color"].value, "blue");
    // previewing does not change the live session
    assert_eq!(exec.state("session-1").await.unwrap().turn, 3);

    let restored_count = snapshot.state.messages.len();
    let new_id = exec.commit_restored("session-1", snapshot).await.unwrap();
    let live = exec.state("session-1").await.unwrap();
    assert_eq!(live.messages.len(), restored_count);
    assert_eq!(live.turn, 1);
    let listed = exec.checkpoints("session-1", 10).await.unwrap();
    assert_eq!(listed[0].checkpoint_id, new_id);
    assert_eq!(listed[0].parent_id.as_deref(), Some(third.checkpoint_id.as_str()));
    assert_eq!(listed[0].metadata.source, CheckpointSource::Restore);
    assert_eq!(listed[0].metadata.restored_from.as_deref(), Some(first_id.as_str()));

    let next = exec.run_turn(turn("where were we?")).await.unwrap();
    assert_eq!(next.turn, 2);
    let state = exec.state("session-1").await.unwrap();
    assert_eq!(state.facts["favorite_color"].value, "blue");
}

#[tokio::test]
async fn test_file_store_resumes_session_after_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("checkpoints.json");

    {
        let store = Arc::new(FileCheckpointStore::open(&path).unwrap());
        let exec = TurnExecutor::new(
            router(Arc::new(MockInvoker::new())),
            store,
            settings(MemoryMode::Facts, None),
        );
        exec.run_turn(turn("My favorite color is blue")).await.unwrap();
        exec.run_turn(turn("Hi, I'm Alice")).await.unwrap();
    }

    let store = Arc::new(FileCheckpointStore::open(&path).unwrap());
    assert_eq!(store.list("session-1", 10).await.unwrap().len(), 2);
    let exec = TurnExecutor::new(
        router(Arc::new(MockInvoker::new())),
        store,
        settings(MemoryMode::Facts, None),
    );
    let response = exec.run_turn(turn("anything new?")).await.unwrap();
    assert_eq!(response.turn, 3);
    let state = exec.state("session-1").await.unwrap();
    assert_eq!(state.facts.len(), 2);
}

#[tokio::test]
async fn test_concurrent_turns_on_one_session_serialize() {
    let (exec, _) = executor(ExecutorSettings::default());
    let exec = Arc::new(exec);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let exec = exec.clone();
            tokio::spawn(async move { exec.run_turn(turn(&format!("parallel {}", i))).await })
        })
        .collect();
    let mut turns = Vec::new();
    for handle in handles {
        turns.push(handle.await.unwrap().unwrap().turn);
    }
    turns.sort();
    assert_eq!(turns, vec![1, 2, 3, 4]);

    let state = exec.state("session-1").await.unwrap();
    // system message plus one user/assistant pair per turn
    assert_eq!(state.messages.len(), 9);
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let (exec, _) = executor(settings(MemoryMode::Facts, None));
    exec.run_turn(TurnRequest::new("a", "alice", "My favorite color is blue"))
        .await
        .unwrap();
    exec.run_turn(TurnRequest::new("b", "bob", "My favorite color is green"))
        .await
        .unwrap();

    let a = exec.state("a").await.unwrap();
    let b = exec.state("b").await.unwrap();
    assert_eq!(a.facts["favorite_color"].value, "blue");
    assert_eq!(b.facts["favorite_color"].value, "green");
    assert_eq!(b.profile.unwrap().user_id, "bob");
}
