//! Automation agent abstraction
//!
//! An agent receives its goal together with the sinks it must write its
//! progress to; nothing is captured by redirecting process-wide output.

pub mod command;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::pipeline::{CaptureSink, MessageSender, PipelineConfig, TaskOutcome};
use crate::settings::AgentSettings;

pub use command::CommandAgent;

/// What the agent is asked to do, with the settings in force at submit time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    pub settings: AgentSettings,
}

/// Output channels handed to a running agent
#[derive(Debug)]
pub struct AgentOutput {
    pub stdout: CaptureSink,
    pub stderr: CaptureSink,
}

impl AgentOutput {
    /// Two independent sinks feeding the same queue. Order is preserved per
    /// sink only.
    pub fn new(sender: MessageSender, config: &PipelineConfig) -> Self {
        Self {
            stdout: CaptureSink::new(sender.clone(), config),
            stderr: CaptureSink::new(sender, config),
        }
    }

    /// Flush both sinks and release the queue.
    pub fn close(self) {
        self.stdout.close();
        self.stderr.close();
    }
}

/// Trait for anything that can carry out a goal on a device
#[async_trait]
pub trait AutomationAgent: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Execute the request, writing progress text into `output`.
    async fn run(
        &self,
        request: &AgentRequest,
        output: &mut AgentOutput,
    ) -> anyhow::Result<TaskOutcome>;
}
