//! Streaming log pipeline
//!
//! Text produced by a running agent flows through two buffering stages:
//! - [`CaptureSink`] assembles raw fragments into complete, relevant messages
//!   and publishes them on an unbounded queue
//! - [`delivery_stream`] drains the queue, re-segments the messages into
//!   deliverable lines and ends once the [`CompletionSignal`] fires and the
//!   queue is empty
//!
//! The queue is unbounded on purpose: producers never wait on the consumer.
//! A hardened variant would swap it for a bounded channel that drops the
//! oldest message or surfaces back-pressure to the caller.

pub mod capture;
pub mod delivery;
pub mod filter;
pub mod runner;
pub mod signal;

use std::time::Duration;
use tokio::sync::mpsc;

pub use capture::CaptureSink;
pub use delivery::delivery_stream;
pub use filter::{clean_line, is_relevant};
pub use runner::{run_task, start_task, TaskOutcome, TaskRun};
pub use signal::{CompletionGuard, CompletionSignal};

/// Producer side of the message queue. Clone one per sink.
pub type MessageSender = mpsc::UnboundedSender<String>;

/// Consumer side of the message queue. Owned by exactly one delivery stream.
pub type MessageReceiver = mpsc::UnboundedReceiver<String>;

/// Create an ordered, unbounded message queue.
pub fn message_queue() -> (MessageSender, MessageReceiver) {
    mpsc::unbounded_channel()
}

/// Tunables for both buffering stages
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capture buffer length (chars) above which a flush is forced
    pub capture_max_chars: usize,
    /// Re-assembly buffer length (chars) above which a line is emitted
    pub delivery_max_chars: usize,
    /// Delay between queue polls while nothing is available
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capture_max_chars: 200,
            delivery_max_chars: 50,
            poll_interval: Duration::from_millis(100),
        }
    }
}
