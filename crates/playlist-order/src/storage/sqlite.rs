use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::time::Duration;

use playlist_order_core::{
    ContainerId, ItemId, ItemRef, OrderError, OrderKey, OrderStore, OrderTransaction, Result,
};

use crate::config::DatabaseConfig;
use crate::storage::schema::{playlist_songs_schema, playlists_schema};

const ITEM_COLUMNS: &str = "song_id, sort_key, created_at";

/// `playlist_songs` store on SQLite via sqlx
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database named in `config` and ensure the schema.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(OrderError::persistence)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(OrderError::persistence)?;

        tracing::info!(url = %config.url, "SQLite order store opened");

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database.
    ///
    /// Every connection to `sqlite::memory:` sees its own database, so the pool
    /// is pinned to a single connection that is never recycled. That also
    /// serializes all transactions.
    pub async fn new_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(OrderError::persistence)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(OrderError::persistence)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn init_schema(&self) -> Result<()> {
        for schema in [playlists_schema(), playlist_songs_schema()] {
            sqlx::query(&schema.create_table_sql())
                .execute(&self.pool)
                .await
                .map_err(OrderError::persistence)?;

            for index_sql in schema.create_index_sql() {
                sqlx::query(&index_sql)
                    .execute(&self.pool)
                    .await
                    .map_err(OrderError::persistence)?;
            }
        }
        Ok(())
    }

    pub async fn create_container(&self, id: &ContainerId) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO playlists (id) VALUES (?)")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(OrderError::persistence)?;
        Ok(())
    }

    /// Insert a link row with a raw `sort_key` value, as legacy data would have it.
    pub async fn insert_raw(
        &self,
        container: &ContainerId,
        item: &ItemId,
        sort_key: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO playlist_songs (playlist_id, song_id, sort_key, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(container.to_string())
        .bind(item.to_string())
        .bind(sort_key)
        .bind(created_at.timestamp_micros())
        .execute(&self.pool)
        .await
        .map_err(OrderError::persistence)?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl OrderStore for SqliteStore {
    async fn begin(&self, container: &ContainerId) -> Result<Box<dyn OrderTransaction>> {
        let mut tx = self.pool.begin().await.map_err(OrderError::persistence)?;

        // A no-op write takes SQLite's write lock up front, so two transactions
        // can never both read the same max key before either writes.
        let touched = sqlx::query("UPDATE playlists SET id = id WHERE id = ?")
            .bind(container.to_string())
            .execute(&mut *tx)
            .await
            .map_err(OrderError::persistence)?;

        if touched.rows_affected() == 0 {
            return Err(OrderError::ContainerNotFound(*container));
        }

        Ok(Box::new(SqliteTransaction {
            container: *container,
            tx,
        }))
    }

    async fn containers_missing_keys(&self) -> Result<Vec<ContainerId>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT playlist_id FROM playlist_songs \
             WHERE sort_key IS NULL OR sort_key = '' \
             ORDER BY playlist_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(OrderError::persistence)?;

        ids.iter()
            .map(|id| ContainerId::from_str(id).map_err(OrderError::persistence))
            .collect()
    }
}

struct SqliteTransaction {
    container: ContainerId,
    tx: Transaction<'static, Sqlite>,
}

impl SqliteTransaction {
    fn item_from_row(&self, row: &SqliteRow) -> Result<ItemRef> {
        let song_id: String = row.try_get("song_id").map_err(OrderError::persistence)?;
        let sort_key: Option<String> = row.try_get("sort_key").map_err(OrderError::persistence)?;
        let created_at: i64 = row.try_get("created_at").map_err(OrderError::persistence)?;

        let item = ItemId::from_str(&song_id).map_err(OrderError::persistence)?;
        let key = OrderKey::from_stored(sort_key)?;
        let created_at = DateTime::<Utc>::from_timestamp_micros(created_at).ok_or_else(|| {
            OrderError::persistence(format!("invalid created_at {created_at} for song {song_id}"))
        })?;

        Ok(ItemRef::new(self.container, item, key, created_at))
    }

    async fn fetch_items(&mut self, order_by: &str) -> Result<Vec<ItemRef>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM playlist_songs WHERE playlist_id = ? ORDER BY {order_by}"
        );
        let rows = sqlx::query(&sql)
            .bind(self.container.to_string())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(OrderError::persistence)?;

        rows.iter().map(|row| self.item_from_row(row)).collect()
    }
}

#[async_trait]
impl OrderTransaction for SqliteTransaction {
    fn container(&self) -> &ContainerId {
        &self.container
    }

    async fn max_key(&mut self) -> Result<Option<OrderKey>> {
        // BINARY collation: MAX compares bytes, like OrderKey's Ord.
        let max: Option<String> = sqlx::query_scalar(
            "SELECT MAX(sort_key) FROM playlist_songs \
             WHERE playlist_id = ? AND sort_key IS NOT NULL AND sort_key <> ''",
        )
        .bind(self.container.to_string())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(OrderError::persistence)?;

        Ok(OrderKey::from_stored(max)?)
    }

    async fn item(&mut self, item: &ItemId) -> Result<Option<ItemRef>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM playlist_songs WHERE playlist_id = ? AND song_id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(self.container.to_string())
            .bind(item.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(OrderError::persistence)?;

        row.map(|row| self.item_from_row(&row)).transpose()
    }

    async fn items_by_creation_time(&mut self) -> Result<Vec<ItemRef>> {
        self.fetch_items("created_at ASC, song_id ASC").await
    }

    async fn items_in_order(&mut self) -> Result<Vec<ItemRef>> {
        self.fetch_items("COALESCE(sort_key, '') ASC, created_at ASC, song_id ASC")
            .await
    }

    async fn insert_item(&mut self, item: &ItemRef) -> Result<()> {
        if self.item(&item.item).await?.is_some() {
            return Err(OrderError::DuplicateItem {
                container: self.container,
                item: item.item,
            });
        }

        sqlx::query(
            "INSERT INTO playlist_songs (playlist_id, song_id, sort_key, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(self.container.to_string())
        .bind(item.item.to_string())
        .bind(item.key.as_ref().map(|key| key.as_str().to_string()))
        .bind(item.created_at.timestamp_micros())
        .execute(&mut *self.tx)
        .await
        .map_err(OrderError::persistence)?;
        Ok(())
    }

    async fn write_key(&mut self, item: &ItemId, key: &OrderKey) -> Result<()> {
        let result =
            sqlx::query("UPDATE playlist_songs SET sort_key = ? WHERE playlist_id = ? AND song_id = ?")
                .bind(key.as_str())
                .bind(self.container.to_string())
                .bind(item.to_string())
                .execute(&mut *self.tx)
                .await
                .map_err(OrderError::persistence)?;

        if result.rows_affected() == 0 {
            return Err(OrderError::ItemNotFound {
                container: self.container,
                item: *item,
            });
        }
        Ok(())
    }

    async fn remove_item(&mut self, item: &ItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM playlist_songs WHERE playlist_id = ? AND song_id = ?")
            .bind(self.container.to_string())
            .bind(item.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(OrderError::persistence)?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(OrderError::persistence)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(OrderError::persistence)
    }
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;
