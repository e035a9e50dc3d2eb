//! Agent settings persisted as JSON
//!
//! The service keeps one [`SettingsStore`]; each task receives a snapshot of
//! the settings at submit time, so concurrent tasks never share mutable
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Errors from loading or updating settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid settings update: {0}")]
    InvalidUpdate(String),
}

/// LLM and execution settings forwarded to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    pub llm_provider: String,
    pub llm_model: String,
    pub llm_temperature: f64,
    pub enable_vision: bool,
    pub enable_reasoning: bool,
    pub max_steps: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            llm_provider: "DeepSeek".to_string(),
            llm_model: "deepseek-chat".to_string(),
            llm_temperature: 0.1,
            enable_vision: true,
            enable_reasoning: false,
            max_steps: 20,
        }
    }
}

impl AgentSettings {
    /// Apply the keys present in `patch` on top of these settings.
    pub fn merged(&self, patch: &serde_json::Value) -> Result<Self, SettingsError> {
        let patch = patch
            .as_object()
            .ok_or_else(|| SettingsError::InvalidUpdate("expected a JSON object".to_string()))?;

        let mut current = serde_json::to_value(self)?;
        if let Some(fields) = current.as_object_mut() {
            for (key, value) in patch {
                fields.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(current).map_err(|e| SettingsError::InvalidUpdate(e.to_string()))
    }
}

/// File-backed settings holder
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<AgentSettings>,
}

impl SettingsStore {
    /// Create a store backed by `path`, starting from defaults.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(AgentSettings::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the settings file if it exists and return the result.
    pub async fn load(&self) -> Result<AgentSettings, SettingsError> {
        let mut current = self.current.write().await;
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let patch: serde_json::Value = serde_json::from_str(&content)?;
                *current = current.merged(&patch)?;
                debug!("Loaded settings from {}", self.path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(current.clone())
    }

    /// Settings currently in memory, without touching the file.
    pub async fn snapshot(&self) -> AgentSettings {
        self.current.read().await.clone()
    }

    /// Merge a partial update, persist it, and return the new settings.
    pub async fn update(&self, patch: &serde_json::Value) -> Result<AgentSettings, SettingsError> {
        let mut current = self.current.write().await;
        let updated = current.merged(patch)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(&updated)?;
        tokio::fs::write(&self.path, content).await?;

        *current = updated.clone();
        info!("Settings saved to {}", self.path.display());
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(AgentSettings::default()).unwrap();
        assert_eq!(value["llmProvider"], "DeepSeek");
        assert_eq!(value["llmModel"], "deepseek-chat");
        assert_eq!(value["enableVision"], true);
        assert_eq!(value["maxSteps"], 20);
    }

    #[test]
    fn test_merge_keeps_unmentioned_fields() {
        let merged = AgentSettings::default()
            .merged(&json!({"llmModel": "deepseek-reasoner", "maxSteps": 30}))
            .unwrap();
        assert_eq!(merged.llm_model, "deepseek-reasoner");
        assert_eq!(merged.max_steps, 30);
        assert_eq!(merged.llm_provider, "DeepSeek");
    }

    #[test]
    fn test_merge_rejects_wrong_types() {
        let result = AgentSettings::default().merged(&json!({"maxSteps": "many"}));
        assert!(matches!(result, Err(SettingsError::InvalidUpdate(_))));

        let result = AgentSettings::default().merged(&json!(["llmModel"]));
        assert!(matches!(result, Err(SettingsError::InvalidUpdate(_))));
    }

    #[tokio::test]
    async fn test_load_without_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("config.json"));
        assert_eq!(store.load().await.unwrap(), AgentSettings::default());
    }

    #[tokio::test]
    async fn test_update_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let store = SettingsStore::new(&path);
        store
            .update(&json!({"llmProvider": "OpenAI", "enableReasoning": true}))
            .await
            .unwrap();

        let reopened = SettingsStore::new(&path);
        let loaded = reopened.load().await.unwrap();
        assert_eq!(loaded.llm_provider, "OpenAI");
        assert!(loaded.enable_reasoning);
        assert_eq!(reopened.snapshot().await, loaded);
    }

    #[tokio::test]
    async fn test_load_merges_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"llmTemperature": 0.5}"#).unwrap();

        let store = SettingsStore::new(&path);
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.llm_temperature, 0.5);
        assert_eq!(loaded.max_steps, 20);
    }
}
