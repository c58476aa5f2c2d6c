//! SQLite adapter via sqlx. Implements both [`MessageStore`] and
//! [`KeyDirectory`] over one pool.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};

use vn_proto::{MessageRecord, ViewUpdate};

use crate::error::StoreError;
use crate::models::{MessageRow, PublicKeyRow};
use crate::traits::{KeyDirectory, MessageStore};

const SELECT_MESSAGE: &str = "SELECT id, sender_id, receiver_id, encrypted_content, media_type, media_url, \
     is_viewed, viewed_at, view_count, is_view_once, is_disappearing, disappearing_duration, \
     expires_at, is_saved, created_at FROM messages";

/// Store handle. Cheap to clone (the pool is an Arc internally).
#[derive(Clone)]
pub struct SqliteStore {
    pub pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and run pending migrations.
    ///
    /// WAL mode is set on the connection, not in a migration: SQLite refuses
    /// to change `journal_mode` inside the transaction sqlx wraps migrations in.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        tracing::debug!(path = %db_path.display(), "message store opened");
        Ok(Self { pool })
    }

    fn rows_into_records(rows: Vec<MessageRow>) -> Result<Vec<MessageRecord>, StoreError> {
        rows.into_iter().map(MessageRow::into_record).collect()
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert(&self, record: &MessageRecord) -> Result<(), StoreError> {
        let lc = &record.lifecycle;
        let result = sqlx::query(
            "INSERT INTO messages (id, sender_id, receiver_id, encrypted_content, media_type, media_url, \
             is_viewed, viewed_at, view_count, is_view_once, is_disappearing, disappearing_duration, \
             expires_at, is_saved, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.sender_id)
        .bind(&record.receiver_id)
        .bind(&record.encrypted_content)
        .bind(record.media_type().as_str())
        .bind(record.body.media_url())
        .bind(lc.is_viewed)
        .bind(lc.viewed_at)
        .bind(i64::from(lc.view_count))
        .bind(lc.is_view_once)
        .bind(lc.is_disappearing)
        .bind(lc.disappearing_duration.map(i64::from))
        .bind(lc.expires_at)
        .bind(lc.is_saved)
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Duplicate(record.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<MessageRecord>, StoreError> {
        let row: Option<MessageRow> = sqlx::query_as(&format!("{SELECT_MESSAGE} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(MessageRow::into_record).transpose()
    }

    async fn between(&self, a: &str, b: &str) -> Result<Vec<MessageRecord>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "{SELECT_MESSAGE} WHERE (sender_id = ? AND receiver_id = ?) \
             OR (sender_id = ? AND receiver_id = ?) ORDER BY created_at ASC, id ASC"
        ))
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_all(&self.pool)
        .await?;
        Self::rows_into_records(rows)
    }

    async fn apply_view(
        &self,
        id: &str,
        expected_view_count: u32,
        update: &ViewUpdate,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE messages SET is_viewed = ?, viewed_at = ?, view_count = ?, expires_at = ? \
             WHERE id = ? AND view_count = ? AND is_viewed = ?",
        )
        .bind(update.is_viewed)
        .bind(update.viewed_at)
        .bind(i64::from(update.view_count))
        .bind(update.expires_at)
        .bind(id)
        .bind(i64::from(expected_view_count))
        .bind(update.expected_viewed)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_saved(&self, id: &str, saved: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE messages SET is_saved = ? WHERE id = ?")
            .bind(saved)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, ids: &[String]) -> Result<u64, StoreError> {
        let mut deleted = 0;
        for id in ids {
            deleted += sqlx::query("DELETE FROM messages WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?
                .rows_affected();
        }
        Ok(deleted)
    }

    async fn snapshot(&self) -> Result<Vec<MessageRecord>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(SELECT_MESSAGE).fetch_all(&self.pool).await?;
        Self::rows_into_records(rows)
    }
}

#[async_trait]
impl KeyDirectory for SqliteStore {
    async fn publish(&self, identity_id: &str, public_key: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO public_keys (identity_id, public_key, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(identity_id) DO UPDATE SET public_key = excluded.public_key, \
             updated_at = excluded.updated_at",
        )
        .bind(identity_id)
        .bind(public_key)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn public_key(&self, identity_id: &str) -> Result<Option<String>, StoreError> {
        let row: Option<PublicKeyRow> = sqlx::query_as(
            "SELECT identity_id, public_key, updated_at FROM public_keys WHERE identity_id = ?",
        )
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.public_key))
    }
}
