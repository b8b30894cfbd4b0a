//! SQLite-backed local store: the durable offline queue and the menu cache.
//!
//! Both live in one `kv_store` table of named JSON records, mirroring the
//! browser-storage layout the POS has always used: the queue is the record
//! `kade-offline-storage`, the last fetched menu is `kade-menu-cache`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use kade_sales::MenuItem;

use crate::storage::{PersistedQueue, QUEUE_RECORD, QueueStorage, StorageError};

/// Name of the record holding the last fetched menu.
pub const MENU_RECORD: &str = "kade-menu-cache";

/// Cached menu plus when it was fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMenu {
    pub items: Vec<MenuItem>,
    pub cached_at: DateTime<Utc>,
}

/// SQLite-backed local store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct LocalStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl LocalStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create local store directory at {parent:?}"))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open SQLite local store at {path:?}"))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                name        TEXT PRIMARY KEY,
                data        TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create kv_store table")?;

        tracing::debug!(path = %path.display(), "local store opened");

        Ok(Self { pool, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the menu cache.
    pub async fn cache_menu(&self, items: &[MenuItem]) -> anyhow::Result<()> {
        self.write_record(MENU_RECORD, &items).await
    }

    /// Last cached menu, if any.
    pub async fn cached_menu(&self) -> anyhow::Result<Option<CachedMenu>> {
        Ok(self
            .read_record::<Vec<MenuItem>>(MENU_RECORD)
            .await?
            .map(|(items, cached_at)| CachedMenu { items, cached_at }))
    }

    async fn write_record<T>(&self, name: &str, value: &T) -> anyhow::Result<()>
    where
        T: Serialize + ?Sized,
    {
        let data = serde_json::to_string(value)
            .with_context(|| format!("failed to serialize record '{name}'"))?;

        sqlx::query(
            r#"
            INSERT INTO kv_store (name, data, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(data)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write record '{name}'"))?;

        Ok(())
    }

    async fn read_record<T>(&self, name: &str) -> anyhow::Result<Option<(T, DateTime<Utc>)>>
    where
        T: DeserializeOwned,
    {
        let row = sqlx::query(
            r#"
            SELECT data, updated_at
            FROM kv_store
            WHERE name = ?1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to read record '{name}'"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let data: String = row.try_get("data")?;
        let updated_at_str: String = row.try_get("updated_at")?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .with_context(|| format!("invalid updated_at for record '{name}'"))?;

        let value = serde_json::from_str(&data)
            .with_context(|| format!("failed to deserialize record '{name}'"))?;

        Ok(Some((value, updated_at)))
    }
}

#[async_trait]
impl QueueStorage for LocalStore {
    async fn load(&self) -> Result<Option<PersistedQueue>, StorageError> {
        match self.read_record::<PersistedQueue>(QUEUE_RECORD).await {
            Ok(record) => Ok(record.map(|(queue, _)| queue)),
            Err(err) if err.downcast_ref::<serde_json::Error>().is_some() => {
                Err(StorageError::Corrupt(format!("{err:#}")))
            }
            Err(err) => Err(StorageError::Unavailable(format!("{err:#}"))),
        }
    }

    async fn save(&self, state: &PersistedQueue) -> Result<(), StorageError> {
        self.write_record(QUEUE_RECORD, state)
            .await
            .map_err(|err| StorageError::Write(format!("{err:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kade_core::{Money, ProductId};
    use kade_sales::{MenuCategory, OrderLine};

    use crate::types::{QueueKey, QueuedOrder};

    fn order(minute: u32) -> QueuedOrder {
        let at = DateTime::parse_from_rfc3339(&format!("2024-03-01T10:{minute:02}:00.000001Z"))
            .unwrap()
            .with_timezone(&Utc);
        QueuedOrder {
            items: vec![OrderLine::new(ProductId::new(1), "Rice", Money::from_units(100), 2)],
            total_amount: Money::from_units(200),
            created_at: at,
            queued_at: QueueKey::new(at),
        }
    }

    #[tokio::test]
    async fn queue_round_trips_through_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("offline.db");

        let store = LocalStore::open(&path).await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);

        let state = PersistedQueue {
            offline_queue: vec![order(1), order(2)],
        };
        store.save(&state).await.unwrap();
        drop(store);

        let reopened = LocalStore::open(&path).await.unwrap();
        assert_eq!(reopened.load().await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn save_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("offline.db")).await.unwrap();

        store
            .save(&PersistedQueue { offline_queue: vec![order(1)] })
            .await
            .unwrap();
        store.save(&PersistedQueue::default()).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(PersistedQueue::default()));
    }

    #[tokio::test]
    async fn menu_cache_is_separate_from_queue() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("offline.db")).await.unwrap();

        let menu = vec![MenuItem {
            id: ProductId::new(1),
            name: "Rice".into(),
            price: Money::from_units(100),
            category: MenuCategory::Base,
            is_available: true,
        }];
        store.cache_menu(&menu).await.unwrap();

        let cached = store.cached_menu().await.unwrap().unwrap();
        assert_eq!(cached.items, menu);
        assert_eq!(store.load().await.unwrap(), None);
    }
}
