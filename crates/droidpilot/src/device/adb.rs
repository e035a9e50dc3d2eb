//! Thin wrapper around the `adb` executable

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

pub const DEFAULT_ADB_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after (re)connecting before the device list is trusted.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

pub const ADB_TIMEOUT_MESSAGE: &str = "ADB command timeout";
pub const ADB_NOT_FOUND_MESSAGE: &str = "ADB not found. Please install Android SDK platform tools.";

/// Result of one adb invocation, with both streams trimmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdbOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl AdbOutput {
    fn failure(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdbBridge {
    program: PathBuf,
    global_args: Vec<String>,
    timeout: Duration,
    settle_delay: Duration,
}

impl AdbBridge {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            global_args: Vec::new(),
            timeout: DEFAULT_ADB_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Options passed before every command, e.g. `-H host -P port`.
    pub fn with_global_args(mut self, args: Vec<String>) -> Self {
        self.global_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub(crate) async fn settle(&self) {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
    }

    /// Run `adb <args>`. Never fails: spawn errors and timeouts are reported
    /// through `stderr` with `success == false`.
    pub async fn run<S: AsRef<str>>(&self, args: &[S]) -> AdbOutput {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        let quiet = matches!(args.as_slice(), ["devices"] | ["devices", "-l"]);
        if !quiet {
            debug!("Executing adb command: {:?}", args);
        }

        let mut command = Command::new(&self.program);
        command
            .args(&self.global_args)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                warn!("adb command timed out: {:?}", args);
                return AdbOutput::failure(ADB_TIMEOUT_MESSAGE);
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("adb not found at '{}'", self.program.display());
                return AdbOutput::failure(ADB_NOT_FOUND_MESSAGE);
            }
            Ok(Err(e)) => {
                warn!("adb command {:?} failed to run: {}", args, e);
                return AdbOutput::failure(e.to_string());
            }
            Ok(Ok(output)) => output,
        };

        let result = AdbOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };
        if !quiet {
            debug!(
                "adb result: success={} stdout='{}' stderr='{}'",
                result.success, result.stdout, result.stderr
            );
        }
        result
    }
}

impl Default for AdbBridge {
    fn default() -> Self {
        Self::new("adb")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_reports_not_found() {
        let adb = AdbBridge::new("droidpilot-no-such-adb");
        let output = adb.run(&["devices"]).await;
        assert!(!output.success);
        assert_eq!(output.stderr, ADB_NOT_FOUND_MESSAGE);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_is_trimmed() {
        let adb = AdbBridge::new("sh").with_global_args(vec!["-c".into()]);
        let output = adb.run(&["echo '  hello  '; echo ' oops ' >&2"]).await;
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.stderr, "oops");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_reported() {
        let adb = AdbBridge::new("sh")
            .with_global_args(vec!["-c".into()])
            .with_timeout(Duration::from_millis(50));
        let output = adb.run(&["sleep 5"]).await;
        assert!(!output.success);
        assert_eq!(output.stderr, ADB_TIMEOUT_MESSAGE);
    }
}
