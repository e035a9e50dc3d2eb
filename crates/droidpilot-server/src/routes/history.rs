//! Execution history routes

use axum::extract::{Path, State};
use axum::response::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use droidpilot::HistoryItem;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn list_history(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<HistoryItem>>> {
    Ok(Json(state.history.list().await?))
}

pub async fn delete_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    if !state.history.delete(id).await? {
        return Err(ApiError::NotFound(format!("History record {} not found", id)));
    }
    Ok(Json(json!({ "message": "History record deleted successfully" })))
}

pub async fn clear_history(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let deleted = state.history.clear().await?;
    Ok(Json(json!({
        "message": "All history records deleted successfully",
        "deleted": deleted
    })))
}
