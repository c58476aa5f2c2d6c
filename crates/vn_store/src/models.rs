//! Database row models — these map to/from SQL rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vn_proto::{Lifecycle, MediaType, MessageBody, MessageRecord};

use crate::error::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    /// Serialised envelope, never parsed by the store.
    pub encrypted_content: String,
    pub media_type: String,
    pub media_url: Option<String>,
    pub is_viewed: bool,
    pub viewed_at: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub is_view_once: bool,
    pub is_disappearing: bool,
    /// Minutes.
    pub disappearing_duration: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_saved: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    pub fn into_record(self) -> Result<MessageRecord, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt { id: self.id.clone(), reason };

        let media_type: MediaType = self.media_type.parse().map_err(|e| corrupt(format!("{e}")))?;
        let body = MessageBody::from_parts(media_type, self.media_url.clone())
            .map_err(|e| corrupt(format!("{e}")))?;
        let view_count =
            u32::try_from(self.view_count).map_err(|_| corrupt(format!("view_count {}", self.view_count)))?;
        let disappearing_duration = self
            .disappearing_duration
            .map(u32::try_from)
            .transpose()
            .map_err(|_| corrupt("disappearing_duration out of range".into()))?;

        Ok(MessageRecord {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            encrypted_content: self.encrypted_content,
            body,
            lifecycle: Lifecycle {
                is_viewed: self.is_viewed,
                viewed_at: self.viewed_at,
                view_count,
                is_view_once: self.is_view_once,
                is_disappearing: self.is_disappearing,
                disappearing_duration,
                expires_at: self.expires_at,
                is_saved: self.is_saved,
            },
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PublicKeyRow {
    pub identity_id: String,
    /// Base64 SPKI DER.
    pub public_key: String,
    pub updated_at: DateTime<Utc>,
}
