//! DroidPilot core
//!
//! Drives an Android automation agent and relays its progress as a filtered
//! stream of user-facing lines.
//!
//! # Features
//! - Streaming capture, relevance filtering and delivery of agent output
//! - Task boundary that always reports an outcome and signals completion
//! - Pluggable automation agents, including an external CLI runner
//! - ADB device bridge and Portal app installation
//! - Persisted agent settings and execution history

pub mod agent;
pub mod device;
pub mod history;
pub mod pipeline;
pub mod settings;

pub use agent::{AgentOutput, AgentRequest, AutomationAgent, CommandAgent};
pub use device::{AdbBridge, DeviceError, DeviceInfo, PortalSource};
pub use history::{HistoryError, HistoryItem, HistoryStore};
pub use pipeline::{PipelineConfig, TaskOutcome, TaskRun};
pub use settings::{AgentSettings, SettingsError, SettingsStore};
