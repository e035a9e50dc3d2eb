//! Configuration management for the server

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use droidpilot::device::portal::{DEFAULT_PORTAL_APK_PATH, PORTAL_APK_URL};

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port (default: 8000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// History database URL (default: sqlite:./data/droidpilot.db)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Maximum database connections (default: 5)
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Agent settings file (default: ./data/config.json)
    #[serde(default = "default_settings_path")]
    pub settings_path: String,

    /// adb executable (default: adb)
    #[serde(default = "default_adb_path")]
    pub adb_path: String,

    /// Options passed to adb before every command, e.g. "-H host -P 5037"
    #[serde(default)]
    pub adb_global_args: Vec<String>,

    /// Per-command adb timeout in seconds (default: 10)
    #[serde(default = "default_adb_timeout_secs")]
    pub adb_timeout_secs: u64,

    /// Directory screenshots are pulled into (default: ./data/screenshots)
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: String,

    /// Agent executable (default: droidrun)
    #[serde(default = "default_agent_command")]
    pub agent_command: String,

    /// Arguments placed before the goal (default: ["run"])
    #[serde(default = "default_agent_args")]
    pub agent_args: Vec<String>,

    /// Portal APK download URL
    #[serde(default = "default_portal_apk_url")]
    pub portal_apk_url: String,

    /// Where the downloaded Portal APK is cached
    #[serde(default = "default_portal_apk_path")]
    pub portal_apk_path: String,

    /// Delivery poll interval in milliseconds (default: 100)
    #[serde(default = "default_log_poll_interval_ms")]
    pub log_poll_interval_ms: u64,

    /// Strip markdown emphasis and code markers from streamed lines
    #[serde(default)]
    pub clean_markup: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_database_url() -> String {
    "sqlite:./data/droidpilot.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_settings_path() -> String {
    "./data/config.json".to_string()
}

fn default_adb_path() -> String {
    "adb".to_string()
}

fn default_adb_timeout_secs() -> u64 {
    10
}

fn default_screenshot_dir() -> String {
    "./data/screenshots".to_string()
}

fn default_agent_command() -> String {
    "droidrun".to_string()
}

fn default_agent_args() -> Vec<String> {
    vec!["run".to_string()]
}

fn default_portal_apk_url() -> String {
    PORTAL_APK_URL.to_string()
}

fn default_portal_apk_path() -> String {
    DEFAULT_PORTAL_APK_PATH.to_string()
}

fn default_log_poll_interval_ms() -> u64 {
    100
}

/// Split a shell-style argument string, rejecting unbalanced quotes.
fn split_args(name: &str, value: &str) -> Result<Vec<String>> {
    shlex::split(value).with_context(|| format!("Invalid {}: unbalanced quotes", name))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("DROIDPILOT_HOST").unwrap_or_else(|_| default_host());
        let port = std::env::var("DROIDPILOT_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(default_port);
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| default_database_url());
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(default_max_connections);
        let settings_path =
            std::env::var("SETTINGS_PATH").unwrap_or_else(|_| default_settings_path());
        let adb_path = std::env::var("ADB_PATH").unwrap_or_else(|_| default_adb_path());
        let adb_global_args = match std::env::var("ADB_GLOBAL_ARGS") {
            Ok(value) => split_args("ADB_GLOBAL_ARGS", &value)?,
            Err(_) => Vec::new(),
        };
        let adb_timeout_secs = std::env::var("ADB_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(default_adb_timeout_secs);
        let screenshot_dir =
            std::env::var("SCREENSHOT_DIR").unwrap_or_else(|_| default_screenshot_dir());
        let agent_command =
            std::env::var("AGENT_COMMAND").unwrap_or_else(|_| default_agent_command());
        let agent_args = match std::env::var("AGENT_ARGS") {
            Ok(value) => split_args("AGENT_ARGS", &value)?,
            Err(_) => default_agent_args(),
        };
        let portal_apk_url =
            std::env::var("PORTAL_APK_URL").unwrap_or_else(|_| default_portal_apk_url());
        let portal_apk_path =
            std::env::var("PORTAL_APK_PATH").unwrap_or_else(|_| default_portal_apk_path());
        let log_poll_interval_ms = std::env::var("LOG_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or_else(default_log_poll_interval_ms);
        let clean_markup = std::env::var("CLEAN_MARKUP")
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            host,
            port,
            database_url,
            max_connections,
            settings_path,
            adb_path,
            adb_global_args,
            adb_timeout_secs,
            screenshot_dir,
            agent_command,
            agent_args,
            portal_apk_url,
            portal_apk_path,
            log_poll_interval_ms,
            clean_markup,
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            settings_path: default_settings_path(),
            adb_path: default_adb_path(),
            adb_global_args: Vec::new(),
            adb_timeout_secs: default_adb_timeout_secs(),
            screenshot_dir: default_screenshot_dir(),
            agent_command: default_agent_command(),
            agent_args: default_agent_args(),
            portal_apk_url: default_portal_apk_url(),
            portal_apk_path: default_portal_apk_path(),
            log_poll_interval_ms: default_log_poll_interval_ms(),
            clean_markup: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("droidpilot.toml");
        std::fs::write(
            &path,
            r#"
port = 9000
agent_args = ["run", "--debug"]
clean_markup = true
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.agent_args, vec!["run", "--debug"]);
        assert!(config.clean_markup);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.database_url, "sqlite:./data/droidpilot.db");
        assert_eq!(config.log_poll_interval_ms, 100);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::from_file(Path::new("/nonexistent/droidpilot.toml")).is_err());
    }

    #[test]
    fn test_split_args() {
        assert_eq!(
            split_args("AGENT_ARGS", r#"run --profile "my phone""#).unwrap(),
            vec!["run", "--profile", "my phone"]
        );
        assert!(split_args("AGENT_ARGS", r#"run "unterminated"#).is_err());
    }
}
