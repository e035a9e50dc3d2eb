//! Delivery stream: drains captured messages into deliverable lines

use futures::stream::Stream;
use tokio::sync::mpsc::error::TryRecvError;

use super::{CompletionSignal, MessageReceiver, PipelineConfig};

/// Characters that close a deliverable line when no newline is present.
pub const LINE_TERMINATORS: &[char] = &['.', '!', '?', '。', '！', '？'];

/// Turn the message queue into a finite, single-pass stream of lines.
///
/// Messages are concatenated into a re-assembly buffer and split on newlines;
/// a newline-free buffer is emitted whole once it grows past
/// `delivery_max_chars` or holds a sentence terminator. The stream ends only
/// after the signal was observed set *before* a queue check came back empty,
/// so nothing enqueued ahead of the signal is lost. Any residual buffer is
/// emitted as a final line.
pub fn delivery_stream(
    mut receiver: MessageReceiver,
    signal: CompletionSignal,
    config: &PipelineConfig,
) -> impl Stream<Item = String> + Send + 'static {
    let max_chars = config.delivery_max_chars;
    let poll_interval = config.poll_interval;

    async_stream::stream! {
        let mut buffer = String::new();

        loop {
            let finished = signal.is_set();
            match receiver.try_recv() {
                Ok(message) => {
                    buffer.push_str(&message);
                    for line in drain_lines(&mut buffer, max_chars) {
                        yield line;
                    }
                }
                Err(TryRecvError::Empty) => {
                    if finished {
                        break;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = signal.wait() => {}
                    }
                }
                // Every sink is gone, nothing more can arrive
                Err(TryRecvError::Disconnected) => break,
            }
        }

        if !buffer.is_empty() {
            yield buffer;
        }
    }
}

/// Pop every complete line out of the re-assembly buffer.
fn drain_lines(buffer: &mut String, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();

    while !buffer.is_empty() {
        if let Some(newline) = buffer.find('\n') {
            let mut line: String = buffer.drain(..=newline).collect();
            line.pop();
            if !line.is_empty() {
                lines.push(line);
            }
        } else if buffer.chars().count() > max_chars || buffer.contains(LINE_TERMINATORS) {
            lines.push(std::mem::take(buffer));
        } else {
            break;
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{message_queue, CaptureSink};
    use futures::StreamExt;
    use std::time::Duration;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            poll_interval: Duration::from_millis(10),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_drain_lines_splits_on_newlines() {
        let mut buffer = String::from("first\n\nsecond\nrest");
        assert_eq!(drain_lines(&mut buffer, 50), vec!["first", "second"]);
        assert_eq!(buffer, "rest");
    }

    #[test]
    fn test_drain_lines_emits_long_or_terminated_buffers() {
        let mut buffer = "x".repeat(51);
        assert_eq!(drain_lines(&mut buffer, 50).len(), 1);
        assert!(buffer.is_empty());

        let mut buffer = String::from("页面已打开。");
        assert_eq!(drain_lines(&mut buffer, 50), vec!["页面已打开。"]);

        let mut buffer = String::from("short");
        assert!(drain_lines(&mut buffer, 50).is_empty());
        assert_eq!(buffer, "short");
    }

    #[tokio::test]
    async fn test_single_action_line_end_to_end() {
        let config = fast_config();
        let (tx, rx) = message_queue();
        let signal = CompletionSignal::new();

        let mut sink = CaptureSink::new(tx, &config);
        sink.write("[点击] 点击搜索按钮\n");
        sink.close();
        signal.set();

        let lines: Vec<String> = delivery_stream(rx, signal, &config).collect().await;
        assert_eq!(lines, vec!["[点击] 点击搜索按钮"]);
    }

    #[tokio::test]
    async fn test_technical_output_yields_nothing() {
        let config = fast_config();
        let (tx, rx) = message_queue();
        let signal = CompletionSignal::new();

        let mut sink = CaptureSink::new(tx, &config);
        sink.write("INFO:");
        sink.write(" screenshot bounds=(0,0,100,100)\n");
        signal.set();

        let lines: Vec<String> = delivery_stream(rx, signal, &config).collect().await;
        assert!(lines.is_empty());
        drop(sink);
    }

    #[tokio::test]
    async fn test_drains_queue_after_signal_is_set() {
        let config = fast_config();
        let (tx, rx) = message_queue();
        let signal = CompletionSignal::new();

        for i in 0..5 {
            tx.send(format!("Step {} done.", i)).unwrap();
        }
        signal.set();

        // Sender still alive: termination must come from the signal, not disconnect
        let lines: Vec<String> = delivery_stream(rx, signal, &config).collect().await;
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[4], "Step 4 done.");
        drop(tx);
    }

    #[tokio::test]
    async fn test_unterminated_message_survives_completion_race() {
        let config = fast_config();
        let (tx, rx) = message_queue();
        let signal = CompletionSignal::new();

        tx.send("Checkout page".to_string()).unwrap();
        signal.set();

        let lines: Vec<String> = delivery_stream(rx, signal, &config).collect().await;
        assert_eq!(lines, vec!["Checkout page"]);
        drop(tx);
    }

    #[tokio::test]
    async fn test_resegments_across_messages() {
        let config = fast_config();
        let (tx, rx) = message_queue();
        let signal = CompletionSignal::new();

        tx.send("Line one\nLine tw".to_string()).unwrap();
        tx.send("o done\n".to_string()).unwrap();
        signal.set();

        let lines: Vec<String> = delivery_stream(rx, signal, &config).collect().await;
        assert_eq!(lines, vec!["Line one", "Line two done"]);
        drop(tx);
    }

    #[tokio::test]
    async fn test_lines_follow_enqueue_order_while_producer_runs() {
        let config = fast_config();
        let (tx, rx) = message_queue();
        let signal = CompletionSignal::new();

        let producer_signal = signal.clone();
        let producer = tokio::spawn(async move {
            let _done = producer_signal.guard();
            for i in 0..4 {
                tokio::time::sleep(Duration::from_millis(25)).await;
                tx.send(format!("Item {} added!", i)).unwrap();
            }
        });

        let lines: Vec<String> = delivery_stream(rx, signal, &config).collect().await;
        producer.await.unwrap();
        assert_eq!(
            lines,
            vec!["Item 0 added!", "Item 1 added!", "Item 2 added!", "Item 3 added!"]
        );
    }

    #[tokio::test]
    async fn test_keeps_polling_until_signal() {
        let config = fast_config();
        let (tx, rx) = message_queue();
        let signal = CompletionSignal::new();

        let stream = delivery_stream(rx, signal.clone(), &config);
        tokio::pin!(stream);

        let pending = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
        assert!(pending.is_err(), "stream must not end before the signal");

        signal.set();
        let end = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("stream should end once signalled");
        assert!(end.is_none());
        drop(tx);
    }

    #[tokio::test]
    async fn test_ends_when_every_sender_is_dropped() {
        let config = fast_config();
        let (tx, rx) = message_queue();
        tx.send("Order submitted".to_string()).unwrap();
        drop(tx);

        let lines: Vec<String> = tokio::time::timeout(
            Duration::from_secs(1),
            delivery_stream(rx, CompletionSignal::new(), &config).collect(),
        )
        .await
        .expect("stream should end on disconnect");
        assert_eq!(lines, vec!["Order submitted"]);
    }
}
