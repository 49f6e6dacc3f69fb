// SPDX-License-Identifier: MIT

//! HTTP surface over the turn executor

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adk::error::{CheckpointError, MnemosError};
use crate::mnemos::executor::{TurnExecutor, TurnRequest};

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn router(executor: Arc<TurnExecutor>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/turns", post(create_turn))
        .route("/api/sessions/{id}/checkpoints", get(list_checkpoints))
        .route("/api/checkpoints/{id}", get(get_checkpoint))
        .route("/api/checkpoints/{id}/commit", post(commit_checkpoint))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(executor)
}

pub async fn serve(
    executor: Arc<TurnExecutor>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(executor);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn status_for(err: &MnemosError) -> StatusCode {
    match err {
        MnemosError::Routing(_) | MnemosError::Other(_) => StatusCode::BAD_REQUEST,
        MnemosError::Checkpoint(CheckpointError::NotFound(_)) => StatusCode::NOT_FOUND,
        MnemosError::Checkpoint(CheckpointError::SessionMismatch { .. }) => StatusCode::CONFLICT,
        MnemosError::Node(_) => StatusCode::BAD_GATEWAY,
        MnemosError::Checkpoint(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: MnemosError) -> (StatusCode, Json<Value>) {
    let status = status_for(&err);
    if status.is_server_error() {
        log::error!("Request failed: {}", err);
    }
    (
        status,
        Json(json!({ "error": err.to_string(), "retryable": err.is_retryable() })),
    )
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn create_turn(
    State(executor): State<Arc<TurnExecutor>>,
    Json(request): Json<TurnRequest>,
) -> ApiResult {
    let response = executor.run_turn(request).await.map_err(error_response)?;
    Ok(Json(json!(response)))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

async fn list_checkpoints(
    State(executor): State<Arc<TurnExecutor>>,
    Path(session_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let checkpoints = executor
        .checkpoints(&session_id, query.limit.unwrap_or(20))
        .await
        .map_err(error_response)?;
    Ok(Json(json!(checkpoints)))
}

async fn get_checkpoint(
    State(executor): State<Arc<TurnExecutor>>,
    Path(checkpoint_id): Path<String>,
) -> ApiResult {
    let snapshot = executor.restore(&checkpoint_id).await.map_err(error_response)?;
    Ok(Json(json!(snapshot)))
}

async fn commit_checkpoint(
    State(executor): State<Arc<TurnExecutor>>,
    Path(checkpoint_id): Path<String>,
) -> ApiResult {
    let snapshot = executor.restore(&checkpoint_id).await.map_err(error_response)?;
    let session_id = snapshot.session_id.clone();
    let new_id = executor
        .commit_restored(&session_id, snapshot)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({
        "session_id": session_id,
        "restored_from": checkpoint_id,
        "checkpoint_id": new_id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::RoutingError;
    use crate::adk::pii::PatternMasker;
    use crate::adk::retrieval::StateRetriever;
    use crate::mnemos::checkpoint::InMemoryCheckpointStore;
    use crate::mnemos::executor::ExecutorSettings;
    use crate::mnemos::nodes::testing::ScriptedInvoker;
    use crate::mnemos::policy::RetrievalTrigger;
    use crate::mnemos::router::MemoryRouter;

    fn executor() -> Arc<TurnExecutor> {
        let router = MemoryRouter::standard(
            RetrievalTrigger::default(),
            Arc::new(ScriptedInvoker::replying("Hi Alice")),
            Arc::new(PatternMasker::new()),
            Arc::new(StateRetriever::default()),
        );
        Arc::new(TurnExecutor::new(
            router,
            Arc::new(InMemoryCheckpointStore::new()),
            ExecutorSettings::default(),
        ))
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&RoutingError::UnknownMode("x".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&CheckpointError::NotFound("x".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&CheckpointError::Io("x".into()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_turn_then_list_then_commit() {
        let exec = executor();
        let Json(turn) = create_turn(
            State(exec.clone()),
            Json(TurnRequest::new("s1", "alice", "Hi, I'm Alice")),
        )
        .await
        .unwrap();
        assert_eq!(turn["response_text"], "Hi Alice");
        assert_eq!(turn["memory_snapshot"]["message_count"], 3);

        let Json(list) = list_checkpoints(
            State(exec.clone()),
            Path("s1".to_string()),
            Query(ListQuery { limit: Some(5) }),
        )
        .await
        .unwrap();
        let first_id = list[0]["checkpoint_id"].as_str().unwrap().to_string();

        let Json(committed) = commit_checkpoint(State(exec.clone()), Path(first_id.clone()))
            .await
            .unwrap();
        assert_eq!(committed["restored_from"], first_id.as_str());
        assert_ne!(committed["checkpoint_id"], first_id.as_str());
    }

    #[tokio::test]
    async fn test_bad_mode_is_400() {
        let exec = executor();
        let err = create_turn(
            State(exec),
            Json(TurnRequest::new("s1", "alice", "hi").with_mode("nope")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_checkpoint_is_404() {
        let err = get_checkpoint(State(executor()), Path("missing".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }
}
