//! Device management routes

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

use droidpilot::device::portal::PortalInstall;
use droidpilot::device::{ConnectRequest, Connection};
use droidpilot::DeviceInfo;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DisconnectQuery {
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdbCommandRequest {
    #[serde(default)]
    pub command: String,
}

#[derive(Debug, Deserialize)]
pub struct InstallPortalQuery {
    pub portal_path: Option<String>,
}

pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Value> {
    let devices = state.adb.list_devices().await;
    Json(json!({ "devices": devices }))
}

pub async fn device_status(State(state): State<Arc<AppState>>) -> Json<DeviceInfo> {
    Json(state.adb.device_status().await)
}

/// Connect over USB or WiFi. An empty body means a plain USB reconnect.
pub async fn connect_device(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<Connection>> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ConnectRequest::default()
    } else {
        serde_json::from_slice::<Option<ConnectRequest>>(&body)
            .map_err(|e| ApiError::Validation(format!("Invalid connection request: {}", e)))?
            .unwrap_or_default()
    };
    Ok(Json(state.adb.connect(&request).await?))
}

pub async fn disconnect_device(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DisconnectQuery>,
) -> ApiResult<Json<Value>> {
    let message = state.adb.disconnect(query.device_id.as_deref()).await?;
    Ok(Json(json!({ "message": message })))
}

pub async fn take_screenshot(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let path = state
        .adb
        .screenshot(Path::new(&state.config.screenshot_dir))
        .await?;
    let path = path.display().to_string();
    Ok(Json(json!({
        "message": format!("Screenshot saved as {}", path),
        "path": path
    })))
}

pub async fn execute_adb_command(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdbCommandRequest>,
) -> ApiResult<Json<Value>> {
    let output = state.adb.execute(&req.command).await?;
    Ok(Json(json!({ "message": output })))
}

pub async fn install_portal(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InstallPortalQuery>,
) -> ApiResult<Json<PortalInstall>> {
    let apk_path = query
        .portal_path
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(Path::new);
    let installed = state
        .adb
        .install_portal(apk_path, &state.portal, &state.http)
        .await?;
    Ok(Json(installed))
}
