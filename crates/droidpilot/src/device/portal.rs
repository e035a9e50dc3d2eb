//! DroidRun Portal companion app

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{AdbBridge, DeviceError};

pub const PORTAL_APK_URL: &str =
    "https://github.com/droidrun/droidrun-portal/releases/download/v0.4.7/droidrun-portal-v0.4.7.apk";
pub const PORTAL_PACKAGE: &str = "com.droidrun.portal";
pub const DEFAULT_PORTAL_APK_PATH: &str = "droidrun-portal.apk";

/// Where the Portal APK is fetched from and cached
#[derive(Debug, Clone)]
pub struct PortalSource {
    pub url: String,
    pub path: PathBuf,
}

impl Default for PortalSource {
    fn default() -> Self {
        Self {
            url: PORTAL_APK_URL.to_string(),
            path: PathBuf::from(DEFAULT_PORTAL_APK_PATH),
        }
    }
}

impl PortalSource {
    /// Download the APK unless a copy is already cached.
    pub async fn ensure_downloaded(&self, client: &reqwest::Client) -> Result<PathBuf, DeviceError> {
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(self.path.clone());
        }

        info!("Downloading DroidRun Portal APK from {}", self.url);
        let bytes = client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, &bytes).await?;
        info!("Portal APK saved to {} ({} bytes)", self.path.display(), bytes.len());
        Ok(self.path.clone())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PortalInstall {
    pub message: String,
    pub device: String,
}

impl AdbBridge {
    /// Install the Portal APK on the first connected device. Without an
    /// explicit `apk_path` the APK from `source` is used, downloading it first
    /// if needed.
    pub async fn install_portal(
        &self,
        apk_path: Option<&Path>,
        source: &PortalSource,
        client: &reqwest::Client,
    ) -> Result<PortalInstall, DeviceError> {
        let device_id = self.first_device("No device connected").await?;

        let apk_path = match apk_path {
            Some(path) => path.to_path_buf(),
            None => source.ensure_downloaded(client).await?,
        };
        if !tokio::fs::try_exists(&apk_path).await? {
            return Err(DeviceError::ApkNotFound);
        }

        info!("Installing Portal APK on device {}", device_id);
        let apk = apk_path.to_string_lossy();
        let output = self
            .run(&["-s", device_id.as_str(), "install", "-r", apk.as_ref()])
            .await;
        if !output.success {
            return Err(DeviceError::CommandFailed(format!(
                "Installation failed: {}",
                output.stderr
            )));
        }

        Ok(PortalInstall {
            message: "Portal app installed successfully".to_string(),
            device: device_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cached_apk_is_not_downloaded_again() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("portal.apk");
        std::fs::write(&path, b"apk").unwrap();

        let source = PortalSource {
            url: "http://127.0.0.1:9/unreachable.apk".to_string(),
            path: path.clone(),
        };
        let resolved = source.ensure_downloaded(&reqwest::Client::new()).await.unwrap();
        assert_eq!(resolved, path);
    }

    #[tokio::test]
    async fn test_install_without_device() {
        let adb = AdbBridge::new("droidpilot-no-such-adb");
        let result = adb
            .install_portal(None, &PortalSource::default(), &reqwest::Client::new())
            .await;
        assert!(matches!(result, Err(DeviceError::NoDevice(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_with_fake_adb() {
        let dir = TempDir::new().unwrap();
        let adb = crate::device::tests::fake_adb(&dir);
        let client = reqwest::Client::new();

        let missing = dir.path().join("missing.apk");
        let result = adb
            .install_portal(Some(&missing), &PortalSource::default(), &client)
            .await;
        assert!(matches!(result, Err(DeviceError::ApkNotFound)));

        let apk = dir.path().join("portal.apk");
        std::fs::write(&apk, b"apk").unwrap();
        let installed = adb
            .install_portal(Some(&apk), &PortalSource::default(), &client)
            .await
            .unwrap();
        assert_eq!(installed.device, "emulator-5554");
        assert_eq!(installed.message, "Portal app installed successfully");
    }
}
