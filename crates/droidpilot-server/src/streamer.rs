//! SSE streaming of delivered log lines
//!
//! Each line becomes one `data: {"log": "..."}` event. There is no terminal
//! event: the response ends when the line stream does.

use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::stream::{BoxStream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;

use droidpilot::pipeline::clean_line;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Frame a line as the JSON payload of one event.
pub fn log_event_data(line: &str) -> String {
    serde_json::json!({ "log": line }).to_string()
}

/// Stream lines to the client as server-sent events.
pub fn stream_log_lines(mut lines: BoxStream<'static, String>, clean_markup: bool) -> impl IntoResponse {
    let stream = async_stream::stream! {
        let mut sent = 0usize;
        while let Some(line) = lines.next().await {
            let line = if clean_markup { clean_line(&line) } else { line };
            if line.is_empty() {
                continue;
            }
            sent += 1;
            yield Ok::<_, Infallible>(Event::default().data(log_event_data(&line)));
        }
        tracing::debug!("Log stream finished after {} lines", sent);
    };

    (
        [(header::CONNECTION, "keep-alive")],
        Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_data_is_json() {
        let data = log_event_data("[执行] 打开 \"设置\"");
        let value: serde_json::Value = serde_json::from_str(&data).unwrap();
        assert_eq!(value["log"], "[执行] 打开 \"设置\"");
        assert!(!data.contains('\n'));
    }
}
