//! Agent backed by an external command-line runner
//!
//! Spawns the agent CLI (by default `droidrun run <goal>`), forwards its
//! stdout and stderr into the matching capture sinks as the bytes arrive and
//! derives the outcome from a JSON summary line on stdout or the exit status.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info};

use super::{AgentOutput, AgentRequest, AutomationAgent};
use crate::pipeline::filter::strip_ansi;
use crate::pipeline::{CaptureSink, TaskOutcome};

/// Environment variable carrying the optional scenario hint
pub const SCENARIO_ENV: &str = "DROIDPILOT_SCENARIO";

const READ_CHUNK_BYTES: usize = 4096;

/// A stdout line that may be a summary is held back until its newline, up to this size.
const MAX_SUMMARY_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct CommandAgent {
    program: String,
    base_args: Vec<String>,
}

impl CommandAgent {
    pub fn new(program: impl Into<String>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
        }
    }

    /// Full argument list for one request.
    pub fn build_args(&self, request: &AgentRequest) -> Vec<String> {
        let settings = &request.settings;
        let mut args = self.base_args.clone();
        args.push(request.goal.clone());
        args.extend([
            "--provider".to_string(),
            settings.llm_provider.clone(),
            "--model".to_string(),
            settings.llm_model.clone(),
            "--temperature".to_string(),
            settings.llm_temperature.to_string(),
            "--steps".to_string(),
            settings.max_steps.to_string(),
        ]);
        if settings.enable_vision {
            args.push("--vision".to_string());
        }
        if settings.enable_reasoning {
            args.push("--reasoning".to_string());
        }
        args
    }
}

impl Default for CommandAgent {
    fn default() -> Self {
        Self::new("droidrun", vec!["run".to_string()])
    }
}

#[async_trait]
impl AutomationAgent for CommandAgent {
    fn name(&self) -> &str {
        &self.program
    }

    async fn run(&self, request: &AgentRequest, output: &mut AgentOutput) -> Result<TaskOutcome> {
        let args = self.build_args(request);
        debug!("Spawning agent: {} {:?}", self.program, args);

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(scenario) = &request.scenario {
            command.env(SCENARIO_ENV, scenario);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn agent command '{}'", self.program))?;
        let stdout = child.stdout.take().context("Agent stdout was not captured")?;
        let stderr = child.stderr.take().context("Agent stderr was not captured")?;

        let AgentOutput {
            stdout: stdout_sink,
            stderr: stderr_sink,
        } = output;
        let (report, _) = tokio::try_join!(
            forward_output(stdout, stdout_sink, true),
            forward_output(stderr, stderr_sink, false)
        )
        .context("Failed to read agent output")?;

        let status = child.wait().await.context("Failed to wait for agent")?;
        info!("Agent command '{}' exited with {}", self.program, status);

        Ok(report.unwrap_or_else(|| {
            if status.success() {
                TaskOutcome::completed("Task completed", 0)
            } else {
                TaskOutcome::failed(format!("Agent exited with {}", status))
            }
        }))
    }
}

/// Copy the child's output into a sink as it is read. With `read_summary`
/// set, a summary line is held back and returned instead of being captured.
async fn forward_output<R>(
    mut reader: R,
    sink: &mut CaptureSink,
    read_summary: bool,
) -> std::io::Result<Option<TaskOutcome>>
where
    R: AsyncRead + Unpin,
{
    let mut forwarder = OutputForwarder::new(sink, read_summary);
    let mut chunk = [0u8; READ_CHUNK_BYTES];

    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        forwarder.push(&chunk[..read]);
    }

    Ok(forwarder.finish())
}

/// Decodes raw output chunks and writes them to a sink without waiting for
/// newlines. Incomplete UTF-8 sequences and colour codes split across reads
/// are carried over to the next chunk.
struct OutputForwarder<'a> {
    sink: &'a mut CaptureSink,
    read_summary: bool,
    undecoded: Vec<u8>,
    unstripped: String,
    held_line: Option<String>,
    at_line_start: bool,
    report: Option<TaskOutcome>,
}

impl<'a> OutputForwarder<'a> {
    fn new(sink: &'a mut CaptureSink, read_summary: bool) -> Self {
        Self {
            sink,
            read_summary,
            undecoded: Vec::new(),
            unstripped: String::new(),
            held_line: None,
            at_line_start: true,
            report: None,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.undecoded.extend_from_slice(bytes);
        let ready = decodable_len(&self.undecoded);
        let decoded = String::from_utf8_lossy(&self.undecoded[..ready]).into_owned();
        self.undecoded.drain(..ready);

        self.unstripped.push_str(&decoded);
        let keep = partial_escape_start(&self.unstripped).unwrap_or(self.unstripped.len());
        let tail = self.unstripped.split_off(keep);
        let text = std::mem::replace(&mut self.unstripped, tail);
        self.forward(&strip_ansi(&text));
    }

    fn forward(&mut self, text: &str) {
        for segment in text.split_inclusive('\n') {
            let complete = segment.ends_with('\n');
            if let Some(line) = self.held_line.as_mut() {
                line.push_str(segment);
            } else if self.may_start_summary(segment, complete) {
                self.held_line = Some(segment.to_string());
            } else {
                self.sink.write(segment);
                self.at_line_start = complete;
                continue;
            }

            if complete {
                if let Some(line) = self.held_line.take() {
                    self.end_line(&line);
                }
            } else if self.held_line.as_deref().is_some_and(|line| {
                let lead = line.trim_start();
                line.len() > MAX_SUMMARY_BYTES || !(lead.is_empty() || lead.starts_with('{'))
            }) {
                if let Some(line) = self.held_line.take() {
                    self.sink.write(&line);
                }
            }
            self.at_line_start = complete;
        }
    }

    fn may_start_summary(&self, segment: &str, complete: bool) -> bool {
        let lead = segment.trim_start();
        self.read_summary
            && self.at_line_start
            && (lead.starts_with('{') || (lead.is_empty() && !complete))
    }

    fn end_line(&mut self, line: &str) {
        match parse_summary(line) {
            Some(summary) => self.report = Some(summary),
            None => self.sink.write(line),
        }
    }

    fn finish(mut self) -> Option<TaskOutcome> {
        let rest = String::from_utf8_lossy(&std::mem::take(&mut self.undecoded)).into_owned();
        let text = std::mem::take(&mut self.unstripped) + &rest;
        self.forward(&strip_ansi(&text));
        if let Some(line) = self.held_line.take() {
            self.end_line(&line);
        }
        self.report
    }
}

/// Length of the prefix that can be decoded now. Invalid bytes are included
/// and decode lossily; only an incomplete sequence at the end is left over.
fn decodable_len(bytes: &[u8]) -> usize {
    let mut end = 0;
    loop {
        match std::str::from_utf8(&bytes[end..]) {
            Ok(_) => return bytes.len(),
            Err(e) => match e.error_len() {
                Some(invalid) => end += e.valid_up_to() + invalid,
                None => return end + e.valid_up_to(),
            },
        }
    }
}

/// Start of a colour code cut off at the end of `text`, if any.
fn partial_escape_start(text: &str) -> Option<usize> {
    let start = text.rfind('\x1b')?;
    let rest = &text[start + 1..];
    let open = rest.is_empty()
        || rest
            .strip_prefix('[')
            .is_some_and(|params| params.chars().all(|c| c.is_ascii_digit() || c == ';'));
    open.then_some(start)
}

/// Recognise `{"success": bool, "reason": ..., "steps": ...}` summary lines.
fn parse_summary(line: &str) -> Option<TaskOutcome> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let success = value.get("success")?.as_bool()?;
    let reason = value
        .get("reason")
        .and_then(|r| r.as_str())
        .unwrap_or_default()
        .to_string();
    let steps = value
        .get("steps")
        .and_then(|s| s.as_u64())
        .map(|s| u32::try_from(s).unwrap_or(u32::MAX))
        .unwrap_or(0);

    Some(TaskOutcome {
        success,
        reason,
        steps,
    })
}
