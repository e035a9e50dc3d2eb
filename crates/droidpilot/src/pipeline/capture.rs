//! Capture sink: turns fragmented agent output into complete messages

use std::fmt;
use tracing::trace;

use super::filter::is_relevant;
use super::{MessageSender, PipelineConfig};

/// Characters that end a sentence in the languages the agent writes in.
pub const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '。', '！', '？', '；', ';'];

const BOLD_DELIMITER: &str = "**";
const CODE_DELIMITER: &str = "``";

/// Write target handed to an agent in place of its stdout or stderr.
///
/// Fragments accumulate until the buffer looks like one complete utterance,
/// then the trimmed buffer is published to the queue if it passes the
/// relevance filter. The buffer is cleared on every flush; irrelevant text is
/// discarded, never requeued. Writing never fails and never blocks.
#[derive(Debug)]
pub struct CaptureSink {
    sender: MessageSender,
    buffer: String,
    max_chars: usize,
}

impl CaptureSink {
    pub fn new(sender: MessageSender, config: &PipelineConfig) -> Self {
        Self {
            sender,
            buffer: String::new(),
            max_chars: config.capture_max_chars,
        }
    }

    /// Append a fragment and publish the buffer if it now forms a message.
    pub fn write(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
        if self.should_flush() {
            self.publish();
        }
    }

    /// Publish whatever is pending. No-op on an empty buffer.
    pub fn flush(&mut self) {
        if !self.buffer.is_empty() {
            self.publish();
        }
    }

    /// Flush and release the sink's handle on the queue.
    pub fn close(mut self) {
        self.flush();
    }

    /// Text written since the last flush.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    // Delimiter balance is an even-count heuristic, not a markup parser: text
    // that repeats a delimiter incidentally can flush early.
    fn should_flush(&self) -> bool {
        let buffer = self.buffer.as_str();
        buffer.contains('\n')
            || buffer.chars().count() > self.max_chars
            || buffer.contains(SENTENCE_TERMINATORS)
            || has_balanced(buffer, BOLD_DELIMITER)
            || has_balanced(buffer, CODE_DELIMITER)
    }

    fn publish(&mut self) {
        let content = std::mem::take(&mut self.buffer);
        let message = content.trim();
        if message.is_empty() || !is_relevant(message) {
            trace!("Dropped captured output: {:?}", message);
            return;
        }
        if self.sender.send(message.to_string()).is_err() {
            trace!("Log queue closed, discarding captured message");
        }
    }
}

fn has_balanced(buffer: &str, delimiter: &str) -> bool {
    let count = buffer.matches(delimiter).count();
    count > 0 && count % 2 == 0
}

impl fmt::Write for CaptureSink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s);
        Ok(())
    }
}

impl Drop for CaptureSink {
    fn drop(&mut self) {
        self.flush();
    }
}
