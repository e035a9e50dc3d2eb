//! HTTP routes

pub mod device;
pub mod execute;
pub mod history;
pub mod settings;

use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// All API routes with state attached.
pub fn configure(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(execute::root))
        .route("/health", get(execute::health_check))
        .route("/stream-execute", post(execute::stream_execute))
        .route(
            "/history",
            get(history::list_history).delete(history::clear_history),
        )
        .route("/history/{id}", delete(history::delete_history))
        .route(
            "/config",
            get(settings::get_settings).post(settings::save_settings),
        )
        .route("/devices", get(device::list_devices))
        .route("/device/status", get(device::device_status))
        .route("/device/connect", post(device::connect_device))
        .route("/device/disconnect", post(device::disconnect_device))
        .route("/device/screenshot", get(device::take_screenshot))
        .route("/device/adb", post(device::execute_adb_command))
        .route("/device/install-portal", post(device::install_portal))
        .with_state(state)
}
