//! Agent settings routes

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use droidpilot::AgentSettings;

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn get_settings(State(state): State<Arc<AppState>>) -> ApiResult<Json<AgentSettings>> {
    Ok(Json(state.settings.load().await?))
}

/// Merge the posted keys into the current settings and persist them.
pub async fn save_settings(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<Value>,
) -> ApiResult<Json<Value>> {
    let settings = state.settings.update(&patch).await?;
    Ok(Json(json!({
        "message": "Configuration saved successfully",
        "config": settings
    })))
}
