//! Service root, health check and goal execution

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use droidpilot::pipeline::start_task;
use droidpilot::{AgentRequest, HistoryStore, TaskOutcome, TaskRun};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::streamer::stream_log_lines;

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub scenario: Option<String>,
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "DroidPilot API is running" }))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Result<Json<Value>, StatusCode> {
    match state.history.ping().await {
        Ok(()) => Ok(Json(json!({
            "status": "healthy",
            "database": "connected",
            "version": env!("CARGO_PKG_VERSION")
        }))),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

/// Run a goal on the device and stream the agent's progress as SSE.
pub async fn stream_execute(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActionRequest>,
) -> ApiResult<Response> {
    let action = req.action.trim();
    if action.is_empty() {
        return Err(ApiError::Validation("Action cannot be empty".to_string()));
    }

    let request = AgentRequest {
        goal: action.to_string(),
        scenario: req.scenario.filter(|s| !s.trim().is_empty()),
        settings: state.settings.snapshot().await,
    };
    info!("Executing action: {}", action);

    let TaskRun { lines, outcome } =
        start_task(state.agent.clone(), request, state.pipeline.clone());
    record_outcome(state.history.clone(), action.to_string(), outcome);

    Ok(stream_log_lines(lines, state.config.clean_markup).into_response())
}

/// Store the task's outcome once it finishes, whether or not anyone is still
/// reading the stream.
pub fn record_outcome(
    history: HistoryStore,
    action: String,
    outcome: JoinHandle<TaskOutcome>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = TaskOutcome::from_join(outcome.await);
        match history.add(&action, &outcome).await {
            Ok(item) => info!(
                "Recorded history item {} (success={})",
                item.id, item.success
            ),
            Err(e) => error!("Failed to record history for '{}': {}", action, e),
        }
    })
}
