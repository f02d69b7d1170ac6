//! Record manager collaborator.
//!
//! Tracks the index keys committed for each source so incremental runs can
//! skip unchanged chunks and clean up stale ones. Keys are namespaced so
//! several collections can share one database file.
//!
//! Only this component mutates index records; the indexer goes through the
//! [`RecordManager`] seam and tests substitute the same SQLite impl on a
//! temp file.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::config::RecordManagerConfig;
use crate::error::{Error, Result};

#[async_trait]
pub trait RecordManager: Send + Sync {
    /// Create the backing schema if missing. Idempotent.
    async fn create_schema(&self) -> Result<()>;

    /// For each key, whether a record exists. Order matches input.
    async fn exists(&self, keys: &[String]) -> Result<Vec<bool>>;

    /// Insert or refresh records, stamping the current time.
    /// `group_ids` pairs with `keys` index-wise.
    async fn upsert(&self, keys: &[String], group_ids: &[String]) -> Result<()>;

    /// All keys recorded under the given groups.
    async fn list_keys(&self, group_ids: &[String]) -> Result<Vec<String>>;

    async fn delete_keys(&self, keys: &[String]) -> Result<()>;
}

pub struct SqliteRecordManager {
    pool: SqlitePool,
    namespace: String,
}

impl SqliteRecordManager {
    /// Open (creating if missing) the record database named by the config.
    pub async fn open(config: &RecordManagerConfig) -> Result<Self> {
        let pool = connect(&config.db_path).await?;
        Ok(Self {
            pool,
            namespace: config.namespace.clone(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

async fn connect(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(|e| Error::record_manager(e.to_string()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl RecordManager for SqliteRecordManager {
    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_records (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                group_id TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_index_records_group
             ON index_records(namespace, group_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn exists(&self, keys: &[String]) -> Result<Vec<bool>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT key FROM index_records WHERE namespace = ? AND key IN ({})",
            placeholders(keys.len())
        );
        let mut query = sqlx::query(&sql).bind(&self.namespace);
        for key in keys {
            query = query.bind(key);
        }

        let rows = query.fetch_all(&self.pool).await?;
        let found: std::collections::HashSet<String> =
            rows.iter().map(|row| row.get("key")).collect();

        Ok(keys.iter().map(|k| found.contains(k)).collect())
    }

    async fn upsert(&self, keys: &[String], group_ids: &[String]) -> Result<()> {
        if keys.len() != group_ids.len() {
            return Err(Error::record_manager(
                "keys and group_ids must have equal length",
            ));
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        for (key, group_id) in keys.iter().zip(group_ids.iter()) {
            sqlx::query(
                r#"
                INSERT INTO index_records (namespace, key, group_id, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(namespace, key) DO UPDATE SET
                    group_id = excluded.group_id,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&self.namespace)
            .bind(key)
            .bind(group_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_keys(&self, group_ids: &[String]) -> Result<Vec<String>> {
        if group_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT key FROM index_records WHERE namespace = ? AND group_id IN ({}) ORDER BY key",
            placeholders(group_ids.len())
        );
        let mut query = sqlx::query(&sql).bind(&self.namespace);
        for group_id in group_ids {
            query = query.bind(group_id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row.get("key")).collect())
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "DELETE FROM index_records WHERE namespace = ? AND key IN ({})",
            placeholders(keys.len())
        );
        let mut query = sqlx::query(&sql).bind(&self.namespace);
        for key in keys {
            query = query.bind(key);
        }

        query.execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordManagerConfig;
    use tempfile::TempDir;

    async fn open_manager(tmp: &TempDir) -> SqliteRecordManager {
        let config = RecordManagerConfig {
            db_path: tmp.path().join("records.sqlite"),
            namespace: "test/documents".to_string(),
        };
        let manager = SqliteRecordManager::open(&config).await.unwrap();
        manager.create_schema().await.unwrap();
        manager
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_schema_idempotent() {
        let tmp = TempDir::new().unwrap();
        let manager = open_manager(&tmp).await;
        manager.create_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_and_exists() {
        let tmp = TempDir::new().unwrap();
        let manager = open_manager(&tmp).await;

        manager
            .upsert(&strings(&["k1", "k2"]), &strings(&["a.txt", "a.txt"]))
            .await
            .unwrap();

        let found = manager
            .exists(&strings(&["k1", "missing", "k2"]))
            .await
            .unwrap();
        assert_eq!(found, vec![true, false, true]);
    }

    #[tokio::test]
    async fn test_list_keys_scoped_to_group() {
        let tmp = TempDir::new().unwrap();
        let manager = open_manager(&tmp).await;

        manager
            .upsert(
                &strings(&["k1", "k2", "k3"]),
                &strings(&["a.txt", "a.txt", "b.txt"]),
            )
            .await
            .unwrap();

        let keys = manager.list_keys(&strings(&["a.txt"])).await.unwrap();
        assert_eq!(keys, strings(&["k1", "k2"]));

        let keys = manager
            .list_keys(&strings(&["a.txt", "b.txt"]))
            .await
            .unwrap();
        assert_eq!(keys.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_keys() {
        let tmp = TempDir::new().unwrap();
        let manager = open_manager(&tmp).await;

        manager
            .upsert(&strings(&["k1", "k2"]), &strings(&["a.txt", "b.txt"]))
            .await
            .unwrap();
        manager.delete_keys(&strings(&["k1"])).await.unwrap();

        let remaining = manager
            .list_keys(&strings(&["a.txt", "b.txt"]))
            .await
            .unwrap();
        assert_eq!(remaining, strings(&["k2"]));
    }

    #[tokio::test]
    async fn test_upsert_refreshes_existing_key() {
        let tmp = TempDir::new().unwrap();
        let manager = open_manager(&tmp).await;

        manager
            .upsert(&strings(&["k1"]), &strings(&["a.txt"]))
            .await
            .unwrap();
        manager
            .upsert(&strings(&["k1"]), &strings(&["a.txt"]))
            .await
            .unwrap();

        let keys = manager.list_keys(&strings(&["a.txt"])).await.unwrap();
        assert_eq!(keys, strings(&["k1"]));
    }
}
