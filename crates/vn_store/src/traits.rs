//! Narrow interfaces to the storage collaborators.

use async_trait::async_trait;

use vn_proto::{MessageRecord, ViewUpdate};

use crate::error::StoreError;

/// Public-key directory. Only ever sees public keys.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Publish (or replace) the base64 SPKI key of `identity_id`.
    async fn publish(&self, identity_id: &str, public_key: &str) -> Result<(), StoreError>;

    async fn public_key(&self, identity_id: &str) -> Result<Option<String>, StoreError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, record: &MessageRecord) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<MessageRecord>, StoreError>;

    /// Every message exchanged between `a` and `b`, oldest first.
    async fn between(&self, a: &str, b: &str) -> Result<Vec<MessageRecord>, StoreError>;

    /// Compare-and-set: applies `update` only while the stored row still has
    /// `expected_view_count` and `update.expected_viewed`. Returns whether the
    /// row was written; a missing row is `false`.
    async fn apply_view(
        &self,
        id: &str,
        expected_view_count: u32,
        update: &ViewUpdate,
    ) -> Result<bool, StoreError>;

    /// Returns whether the row exists.
    async fn set_saved(&self, id: &str, saved: bool) -> Result<bool, StoreError>;

    /// Delete every id present; absent ids are skipped. Returns how many rows
    /// were removed.
    async fn delete(&self, ids: &[String]) -> Result<u64, StoreError>;

    /// All records, for the cleanup sweeper.
    async fn snapshot(&self) -> Result<Vec<MessageRecord>, StoreError>;
}

/// Opaque encrypted media storage keyed by path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8], mime_type: &str) -> Result<(), StoreError>;

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Returns whether a blob was removed; a missing path is not an error.
    async fn delete(&self, path: &str) -> Result<bool, StoreError>;
}
