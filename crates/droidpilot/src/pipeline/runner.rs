//! Task boundary between the agent and the log pipeline

use futures::stream::{BoxStream, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use super::{delivery_stream, message_queue, CompletionSignal, MessageSender, PipelineConfig};
use crate::agent::{AgentOutput, AgentRequest, AutomationAgent};

/// Final result of one agent run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    pub reason: String,
    pub steps: u32,
}

impl TaskOutcome {
    pub fn completed(reason: impl Into<String>, steps: u32) -> Self {
        Self {
            success: true,
            reason: reason.into(),
            steps,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: reason.into(),
            steps: 0,
        }
    }

    /// Map a finished spawned task to an outcome, including abort and panic.
    pub fn from_join(result: Result<TaskOutcome, JoinError>) -> Self {
        match result {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Self::failed("Task was cancelled"),
            Err(e) => Self::failed(format!("Task failed: {}", e)),
        }
    }
}

/// A running task: its delivery stream and the handle to its outcome.
pub struct TaskRun {
    pub lines: BoxStream<'static, String>,
    pub outcome: JoinHandle<TaskOutcome>,
}

/// Run the agent with its output captured into `sender`.
///
/// Agent errors and panics become a failed outcome. The signal is set on
/// every exit path, after both sinks have been flushed.
pub async fn run_task(
    agent: Arc<dyn AutomationAgent>,
    request: AgentRequest,
    sender: MessageSender,
    signal: CompletionSignal,
    config: &PipelineConfig,
) -> TaskOutcome {
    let _done = signal.guard();
    let mut output = AgentOutput::new(sender, config);
    let started = Instant::now();
    info!("Agent '{}' started: {}", agent.name(), request.goal);

    let result = AssertUnwindSafe(agent.run(&request, &mut output))
        .catch_unwind()
        .await;
    output.close();

    let outcome = match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            warn!("Agent '{}' failed: {:#}", agent.name(), e);
            TaskOutcome::failed(e.to_string())
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!("Agent '{}' panicked: {}", agent.name(), message);
            TaskOutcome::failed(message)
        }
    };

    info!(
        "Agent '{}' finished: success={} steps={} (duration: {:?})",
        agent.name(),
        outcome.success,
        outcome.steps,
        started.elapsed()
    );
    outcome
}

/// Spawn the agent and return the stream of delivered lines alongside the
/// handle that resolves to its outcome.
pub fn start_task(
    agent: Arc<dyn AutomationAgent>,
    request: AgentRequest,
    config: PipelineConfig,
) -> TaskRun {
    let (sender, receiver) = message_queue();
    let signal = CompletionSignal::new();
    let lines = delivery_stream(receiver, signal.clone(), &config).boxed();
    let outcome =
        tokio::spawn(async move { run_task(agent, request, sender, signal, &config).await });

    TaskRun { lines, outcome }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("Agent panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("Agent panicked: {}", message)
    } else {
        "Agent panicked".to_string()
    }
}
