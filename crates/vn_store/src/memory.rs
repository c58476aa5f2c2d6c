//! In-memory adapters. Cheap to clone; clones share state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use vn_proto::{MessageRecord, ViewUpdate};

use crate::error::StoreError;
use crate::traits::{BlobStore, KeyDirectory, MessageStore};

#[derive(Clone, Default)]
pub struct MemoryMessageStore {
    inner: Arc<RwLock<HashMap<String, MessageRecord>>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn insert(&self, record: &MessageRecord) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if guard.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id.clone()));
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<MessageRecord>, StoreError> {
        Ok(self.inner.read().await.get(id).cloned())
    }

    async fn between(&self, a: &str, b: &str) -> Result<Vec<MessageRecord>, StoreError> {
        let guard = self.inner.read().await;
        let mut records: Vec<MessageRecord> =
            guard.values().filter(|r| r.is_between(a, b)).cloned().collect();
        records.sort_by(|x, y| x.created_at.cmp(&y.created_at).then_with(|| x.id.cmp(&y.id)));
        Ok(records)
    }

    async fn apply_view(
        &self,
        id: &str,
        expected_view_count: u32,
        update: &ViewUpdate,
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        let Some(record) = guard.get_mut(id) else {
            return Ok(false);
        };
        let lifecycle = &mut record.lifecycle;
        if lifecycle.view_count != expected_view_count || lifecycle.is_viewed != update.expected_viewed {
            return Ok(false);
        }
        update.apply(lifecycle);
        Ok(true)
    }

    async fn set_saved(&self, id: &str, saved: bool) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        Ok(match guard.get_mut(id) {
            Some(record) => {
                record.lifecycle.is_saved = Some(saved);
                true
            }
            None => false,
        })
    }

    async fn delete(&self, ids: &[String]) -> Result<u64, StoreError> {
        let mut guard = self.inner.write().await;
        Ok(ids.iter().filter(|id| guard.remove(id.as_str()).is_some()).count() as u64)
    }

    async fn snapshot(&self) -> Result<Vec<MessageRecord>, StoreError> {
        Ok(self.inner.read().await.values().cloned().collect())
    }
}

#[derive(Clone, Default)]
pub struct MemoryKeyDirectory {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryKeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyDirectory for MemoryKeyDirectory {
    async fn publish(&self, identity_id: &str, public_key: &str) -> Result<(), StoreError> {
        self.inner.write().await.insert(identity_id.to_string(), public_key.to_string());
        Ok(())
    }

    async fn public_key(&self, identity_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.read().await.get(identity_id).cloned())
    }
}

#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<RwLock<HashMap<String, (Vec<u8>, String)>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: &[u8], mime_type: &str) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .insert(path.to_string(), (bytes.to_vec(), mime_type.to_string()));
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.read().await.get(path).map(|(bytes, _)| bytes.clone()))
    }

    async fn delete(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.remove(path).is_some())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use vn_proto::{AutoDeleteMode, Lifecycle, MessageBody};

    use super::*;

    fn record(id: &str, sender: &str, receiver: &str, offset_secs: i64) -> MessageRecord {
        let at = Utc::now() + Duration::seconds(offset_secs);
        MessageRecord {
            id: id.into(),
            sender_id: sender.into(),
            receiver_id: receiver.into(),
            encrypted_content: "opaque".into(),
            body: MessageBody::Text,
            lifecycle: Lifecycle::at_send(AutoDeleteMode::View, at),
            created_at: at,
        }
    }

    #[tokio::test]
    async fn between_is_symmetric_and_ordered() {
        let store = MemoryMessageStore::new();
        store.insert(&record("m2", "bob", "alice", 5)).await.unwrap();
        store.insert(&record("m1", "alice", "bob", 0)).await.unwrap();
        store.insert(&record("m3", "alice", "carol", 1)).await.unwrap();

        let ids: Vec<_> = store.between("alice", "bob").await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert_eq!(store.between("bob", "alice").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn apply_view_is_compare_and_set() {
        let store = MemoryMessageStore::new();
        let rec = record("m1", "alice", "bob", 0);
        store.insert(&rec).await.unwrap();

        let update = rec.lifecycle.register_view(rec.media_type(), Utc::now()).update().cloned().unwrap();
        assert!(store.apply_view("m1", 0, &update).await.unwrap());
        // Second writer computed from the same stale snapshot.
        assert!(!store.apply_view("m1", 0, &update).await.unwrap());
        assert!(!store.apply_view("missing", 0, &update).await.unwrap());
        assert_eq!(store.get("m1").await.unwrap().unwrap().lifecycle.view_count, 1);
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = MemoryMessageStore::new();
        store.insert(&record("m1", "a", "b", 0)).await.unwrap();
        assert!(matches!(store.insert(&record("m1", "a", "b", 0)).await, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn delete_skips_absent_ids() {
        let store = MemoryMessageStore::new();
        store.insert(&record("m1", "a", "b", 0)).await.unwrap();
        let n = store.delete(&["m1".into(), "nope".into()]).await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.delete(&["m1".into()]).await.unwrap(), 0);
        assert!(store.is_empty().await);
    }
}
