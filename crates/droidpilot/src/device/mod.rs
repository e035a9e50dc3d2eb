//! Android device management over ADB
//!
//! Device discovery, connection, screenshots, raw adb commands and Portal app
//! installation. Every operation goes through an [`AdbBridge`].

pub mod adb;
pub mod portal;

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub use adb::{AdbBridge, AdbOutput};
pub use portal::{PortalSource, PORTAL_APK_URL, PORTAL_PACKAGE};

/// Words that make `execute` refuse a command
pub const DANGEROUS_COMMANDS: &[&str] = &["rm", "rmdir", "del", "format", "fdisk", "mkfs"];

const READY_STATUS: &str = "device";
const UNKNOWN: &str = "Unknown";

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("{0}")]
    NoDevice(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    CommandFailed(String),
    #[error("ADB error: {0}")]
    Adb(String),
    #[error("Portal APK file not found")]
    ApkNotFound,
    #[error("Failed to download Portal APK: {0}")]
    Download(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One line of `adb devices`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub id: String,
    pub status: String,
}

impl DeviceEntry {
    pub fn is_ready(&self) -> bool {
        self.status == READY_STATUS
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub name: String,
    pub model: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal_installed: Option<bool>,
}

impl DeviceInfo {
    /// Info for a device that is listed but not usable yet.
    fn unavailable(id: &str, status: &str) -> Self {
        Self {
            id: id.to_string(),
            connected: status == READY_STATUS,
            status: Some(status.to_string()),
            name: format!("Device ({})", status),
            model: UNKNOWN.to_string(),
            version: UNKNOWN.to_string(),
            portal_installed: Some(false),
        }
    }

    /// Placeholder returned when nothing is connected.
    pub fn disconnected() -> Self {
        Self {
            id: String::new(),
            connected: false,
            status: None,
            name: "未连接".to_string(),
            model: String::new(),
            version: String::new(),
            portal_installed: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// `usb` (default) or `wifi`
    #[serde(rename = "type", default)]
    pub connection_type: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Connection {
    pub message: String,
    pub device: DeviceInfo,
}

/// Parse `adb devices` output, skipping the header and daemon notices.
pub fn parse_devices(output: &str) -> Vec<DeviceEntry> {
    output
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let id = parts.next()?.trim();
            let status = parts.next()?.trim();
            Some(DeviceEntry {
                id: id.to_string(),
                status: status.to_string(),
            })
        })
        .collect()
}

/// True when any word of the command is a dangerous word. Words are split on
/// every non-alphanumeric character, so quoting, paths and shell separators
/// (`ls;rm`, `/system/bin/rm`, `'rm'`) cannot hide one.
pub fn is_dangerous(command: &str) -> bool {
    command
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .any(|word| DANGEROUS_COMMANDS.contains(&word.to_ascii_lowercase().as_str()))
}

/// Split a user-supplied command into adb arguments, dropping a leading `adb`.
pub fn parse_adb_command(command: &str) -> Result<Vec<String>, DeviceError> {
    let command = command.trim();
    if command.is_empty() {
        return Err(DeviceError::InvalidRequest("Command cannot be empty".to_string()));
    }
    if is_dangerous(command) {
        return Err(DeviceError::InvalidRequest(
            "Dangerous command not allowed".to_string(),
        ));
    }

    let mut parts: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    if parts
        .first()
        .is_some_and(|first| first.eq_ignore_ascii_case("adb"))
    {
        parts.remove(0);
    }
    if parts.is_empty() {
        return Err(DeviceError::InvalidRequest("Command cannot be empty".to_string()));
    }
    Ok(parts)
}

impl AdbBridge {
    /// Every device adb reports, whatever its status.
    pub async fn device_entries(&self) -> Vec<DeviceEntry> {
        let output = self.run(&["devices"]).await;
        if !output.success {
            return Vec::new();
        }
        parse_devices(&output.stdout)
    }

    /// Ids of devices ready for use.
    pub async fn connected_devices(&self) -> Vec<String> {
        self.device_entries()
            .await
            .into_iter()
            .filter(DeviceEntry::is_ready)
            .map(|entry| entry.id)
            .collect()
    }

    async fn getprop(&self, device_id: &str, property: &str, fallback: &str) -> String {
        let output = self
            .run(&["-s", device_id, "shell", "getprop", property])
            .await;
        if output.success {
            output.stdout
        } else {
            fallback.to_string()
        }
    }

    async fn ready_device_info(&self, device_id: &str) -> DeviceInfo {
        let model = self.getprop(device_id, "ro.product.model", UNKNOWN).await;
        let version = self
            .getprop(device_id, "ro.build.version.release", UNKNOWN)
            .await;
        let name = self
            .getprop(device_id, "ro.product.name", "Android Device")
            .await;
        let packages = self
            .run(&["-s", device_id, "shell", "pm", "list", "packages", PORTAL_PACKAGE])
            .await;

        DeviceInfo {
            id: device_id.to_string(),
            connected: true,
            status: Some(READY_STATUS.to_string()),
            name,
            model,
            version,
            portal_installed: Some(packages.success && packages.stdout.contains(PORTAL_PACKAGE)),
        }
    }

    /// Details for one device. Properties are only queried when it is ready.
    pub async fn device_info(&self, device_id: &str) -> DeviceInfo {
        let status = self
            .device_entries()
            .await
            .into_iter()
            .find(|entry| entry.id == device_id)
            .map(|entry| entry.status)
            .unwrap_or_else(|| "unknown".to_string());

        if status == READY_STATUS {
            self.ready_device_info(device_id).await
        } else {
            DeviceInfo::unavailable(device_id, &status)
        }
    }

    /// All devices, ready ones first.
    pub async fn list_devices(&self) -> Vec<DeviceInfo> {
        let entries = self.device_entries().await;
        let mut devices = Vec::with_capacity(entries.len());
        for entry in entries.iter().filter(|e| e.is_ready()) {
            devices.push(self.ready_device_info(&entry.id).await);
        }
        for entry in entries.iter().filter(|e| !e.is_ready()) {
            devices.push(DeviceInfo::unavailable(&entry.id, &entry.status));
        }
        devices
    }

    /// The first ready device, or the disconnected placeholder.
    pub async fn device_status(&self) -> DeviceInfo {
        match self.connected_devices().await.first() {
            Some(id) => self.ready_device_info(id).await,
            None => DeviceInfo::disconnected(),
        }
    }

    async fn first_device(&self, message: &str) -> Result<String, DeviceError> {
        self.connected_devices()
            .await
            .into_iter()
            .next()
            .ok_or_else(|| DeviceError::NoDevice(message.to_string()))
    }

    pub async fn connect(&self, request: &ConnectRequest) -> Result<Connection, DeviceError> {
        let connection_type = request.connection_type.as_deref().unwrap_or("usb");
        match (connection_type, request.ip_address.as_deref(), request.device_id.as_deref()) {
            ("wifi", Some(ip), _) if !ip.trim().is_empty() => {
                let output = self.run(&["connect", ip]).await;
                if !output.success {
                    return Err(DeviceError::CommandFailed(format!(
                        "Failed to connect: {}",
                        output.stderr
                    )));
                }
                self.settle().await;
                info!("Connected to device over wifi: {}", ip);
                Ok(Connection {
                    message: format!("Connected to {}", ip),
                    device: self.device_info(ip).await,
                })
            }
            ("wifi", _, _) => Err(DeviceError::InvalidRequest(
                "ip_address is required for wifi connections".to_string(),
            )),
            ("usb", _, Some(device_id)) => {
                let output = self.run(&["-s", device_id, "shell", "echo", "test"]).await;
                if !output.success {
                    return Err(DeviceError::CommandFailed(format!(
                        "Failed to connect to device {}: {}",
                        device_id, output.stderr
                    )));
                }
                info!("Connected to device over usb: {}", device_id);
                Ok(Connection {
                    message: format!("Connected to device {}", device_id),
                    device: self.device_info(device_id).await,
                })
            }
            ("usb", _, None) => {
                self.run(&["kill-server"]).await;
                let started = self.run(&["start-server"]).await;
                if !started.success {
                    return Err(DeviceError::Adb("Failed to start ADB server".to_string()));
                }
                self.settle().await;

                let device_id = self
                    .first_device(
                        "No USB device found. Please ensure USB debugging is enabled and device is connected.",
                    )
                    .await?;
                Ok(Connection {
                    message: "Device connected via USB".to_string(),
                    device: self.ready_device_info(&device_id).await,
                })
            }
            _ => Err(DeviceError::InvalidRequest(
                "Invalid connection type. Use 'usb' or 'wifi'".to_string(),
            )),
        }
    }

    /// Disconnect one network device, or all of them.
    pub async fn disconnect(&self, device_id: Option<&str>) -> Result<String, DeviceError> {
        let output = match device_id {
            Some(id) => self.run(&["disconnect", id]).await,
            None => self.run(&["disconnect"]).await,
        };
        if output.success {
            Ok("Device disconnected successfully".to_string())
        } else {
            Err(DeviceError::CommandFailed(format!(
                "Failed to disconnect: {}",
                output.stderr
            )))
        }
    }

    /// Capture the screen of the first device into `dir`.
    pub async fn screenshot(&self, dir: &Path) -> Result<PathBuf, DeviceError> {
        let version = self.run(&["version"]).await;
        if !version.success {
            return Err(DeviceError::Adb(version.stderr));
        }

        let device_id = self
            .first_device(
                "No Android device connected. Please connect a device and enable USB debugging.",
            )
            .await?;
        let device_id = device_id.as_str();

        let file_name = format!("screenshot_{}.png", Local::now().format("%Y%m%d_%H%M%S"));
        let remote_path = format!("/sdcard/{}", file_name);
        let remote_path = remote_path.as_str();
        tokio::fs::create_dir_all(dir).await?;
        let local_path = dir.join(&file_name);

        let captured = self
            .run(&["-s", device_id, "shell", "screencap", "-p", remote_path])
            .await;
        if !captured.success {
            return Err(DeviceError::CommandFailed(format!(
                "Failed to capture screenshot: {}",
                captured.stderr
            )));
        }

        let local = local_path.to_string_lossy();
        let pulled = self
            .run(&["-s", device_id, "pull", remote_path, local.as_ref()])
            .await;
        if !pulled.success {
            return Err(DeviceError::CommandFailed(format!(
                "Failed to pull screenshot: {}",
                pulled.stderr
            )));
        }

        self.run(&["-s", device_id, "shell", "rm", remote_path]).await;
        info!("Screenshot saved to {}", local_path.display());
        Ok(local_path)
    }

    /// Run a user-supplied adb command and return its output.
    pub async fn execute(&self, command: &str) -> Result<String, DeviceError> {
        let args = parse_adb_command(command)?;
        let output = self.run(&args).await;
        if !output.success {
            return Err(DeviceError::CommandFailed(format!(
                "ADB command failed: {}",
                output.stderr
            )));
        }
        if output.stdout.is_empty() {
            Ok("Command executed successfully".to_string())
        } else {
            Ok(output.stdout)
        }
    }
}
