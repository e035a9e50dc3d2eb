//! Execution history backed by SQLite

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::pipeline::TaskOutcome;

const CREATE_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    action TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    success BOOLEAN NOT NULL,
    reason TEXT
)
"#;

/// File path of a `sqlite:` URL, or `None` for in-memory databases.
fn database_file(url: &str) -> Option<&Path> {
    let path = url.trim_start_matches("sqlite:").trim_start_matches("//");
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(Path::new(path))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One finished task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistoryItem {
    pub id: i64,
    pub action: String,
    pub timestamp: String,
    pub success: bool,
    pub reason: Option<String>,
}

#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` and apply the schema.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, HistoryError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal);

        if let Some(parent) = database_file(url).and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        info!("Connected to history database: {}", url);

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), HistoryError> {
        sqlx::query(CREATE_HISTORY_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// Record a finished task and return the stored row.
    pub async fn add(&self, action: &str, outcome: &TaskOutcome) -> Result<HistoryItem, HistoryError> {
        let timestamp = Utc::now().to_rfc3339();
        let reason = Some(outcome.reason.clone()).filter(|r| !r.is_empty());

        let id = sqlx::query(
            "INSERT INTO history (action, timestamp, success, reason) VALUES (?, ?, ?, ?)",
        )
        .bind(action)
        .bind(&timestamp)
        .bind(outcome.success)
        .bind(&reason)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        debug!("Recorded history item {}: {}", id, action);
        Ok(HistoryItem {
            id,
            action: action.to_string(),
            timestamp,
            success: outcome.success,
            reason,
        })
    }

    /// All records, newest first.
    pub async fn list(&self) -> Result<Vec<HistoryItem>, HistoryError> {
        let items = sqlx::query_as::<_, HistoryItem>(
            "SELECT id, action, timestamp, success, reason FROM history ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Delete one record. Returns false when it did not exist.
    pub async fn delete(&self, id: i64) -> Result<bool, HistoryError> {
        let result = sqlx::query("DELETE FROM history WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every record and return how many were removed.
    pub async fn clear(&self) -> Result<u64, HistoryError> {
        let result = sqlx::query("DELETE FROM history")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn ping(&self) -> Result<(), HistoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn memory_store() -> HistoryStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = HistoryStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_add_and_list_newest_first() {
        let store = memory_store().await;
        store
            .add("打开设置", &TaskOutcome::completed("done", 2))
            .await
            .unwrap();
        store
            .add("打开淘宝", &TaskOutcome::failed("device offline"))
            .await
            .unwrap();

        let items = store.list().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].action, "打开淘宝");
        assert!(!items[0].success);
        assert_eq!(items[0].reason.as_deref(), Some("device offline"));
        assert_eq!(items[1].action, "打开设置");
        assert!(items[1].success);
        assert!(items[0].id > items[1].id);
    }

    #[tokio::test]
    async fn test_empty_reason_is_stored_as_null() {
        let store = memory_store().await;
        let item = store.add("go", &TaskOutcome::failed("")).await.unwrap();
        assert_eq!(item.reason, None);
        assert_eq!(store.list().await.unwrap()[0].reason, None);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = memory_store().await;
        let first = store.add("a", &TaskOutcome::completed("", 0)).await.unwrap();
        store.add("b", &TaskOutcome::completed("", 0)).await.unwrap();
        store.add("c", &TaskOutcome::completed("", 0)).await.unwrap();

        assert!(store.delete(first.id).await.unwrap());
        assert!(!store.delete(first.id).await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 2);

        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_clear() {
        let store = memory_store().await;
        let first = store.add("a", &TaskOutcome::completed("", 0)).await.unwrap();
        store.clear().await.unwrap();
        let second = store.add("b", &TaskOutcome::completed("", 0)).await.unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn test_database_file() {
        assert_eq!(
            database_file("sqlite:./data/droidpilot.db?mode=rwc"),
            Some(Path::new("./data/droidpilot.db"))
        );
        assert_eq!(
            database_file("sqlite:///var/lib/droidpilot.db"),
            Some(Path::new("/var/lib/droidpilot.db"))
        );
        assert_eq!(database_file("sqlite::memory:"), None);
    }

    #[tokio::test]
    async fn test_connect_creates_database_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("history.db");
        let url = format!("sqlite:{}", path.display());

        let store = HistoryStore::connect(&url, 1).await.unwrap();
        store.ping().await.unwrap();
        store.add("a", &TaskOutcome::completed("", 1)).await.unwrap();
        assert!(path.exists());
    }
}
