//! Application state

use droidpilot::{AdbBridge, AutomationAgent, HistoryStore, PipelineConfig, PortalSource, SettingsStore};
use std::sync::Arc;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Config,

    /// Agent settings handed to each task as a snapshot
    pub settings: Arc<SettingsStore>,

    /// Execution history
    pub history: HistoryStore,

    /// Device bridge
    pub adb: AdbBridge,

    /// Runs submitted goals
    pub agent: Arc<dyn AutomationAgent>,

    /// Capture and delivery tunables for every task
    pub pipeline: PipelineConfig,

    /// Portal APK location
    pub portal: PortalSource,

    /// HTTP client for Portal downloads
    pub http: reqwest::Client,
}
