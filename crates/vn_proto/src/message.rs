//! Message records as the message store keeps them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;
use crate::lifecycle::Lifecycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Text,
    Image,
    /// View-once photo.
    Snapshot,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Text => "text",
            MediaType::Image => "image",
            MediaType::Snapshot => "snapshot",
            MediaType::Video => "video",
        }
    }

    /// MIME type attached to decrypted media of this kind.
    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            MediaType::Text => None,
            MediaType::Image | MediaType::Snapshot => Some("image/jpeg"),
            MediaType::Video => Some("video/mp4"),
        }
    }

    pub fn is_view_once_media(&self) -> bool {
        matches!(self, MediaType::Snapshot)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MediaType::Text),
            "image" => Ok(MediaType::Image),
            "snapshot" => Ok(MediaType::Snapshot),
            "video" => Ok(MediaType::Video),
            other => Err(LifecycleError::UnknownMediaType(other.to_string())),
        }
    }
}

/// What a message carries besides its text. Media variants reference the
/// encrypted blob by path in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "media_type", rename_all = "snake_case")]
pub enum MessageBody {
    Text,
    Image { media_url: String },
    Snapshot { media_url: String },
    Video { media_url: String },
}

impl MessageBody {
    pub fn from_parts(media_type: MediaType, media_url: Option<String>) -> Result<Self, LifecycleError> {
        match (media_type, media_url) {
            (MediaType::Text, _) => Ok(MessageBody::Text),
            (MediaType::Image, Some(media_url)) => Ok(MessageBody::Image { media_url }),
            (MediaType::Snapshot, Some(media_url)) => Ok(MessageBody::Snapshot { media_url }),
            (MediaType::Video, Some(media_url)) => Ok(MessageBody::Video { media_url }),
            (media_type, None) => Err(LifecycleError::MissingMediaUrl(media_type)),
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            MessageBody::Text => MediaType::Text,
            MessageBody::Image { .. } => MediaType::Image,
            MessageBody::Snapshot { .. } => MediaType::Snapshot,
            MessageBody::Video { .. } => MediaType::Video,
        }
    }

    pub fn media_url(&self) -> Option<&str> {
        match self {
            MessageBody::Text => None,
            MessageBody::Image { media_url }
            | MessageBody::Snapshot { media_url }
            | MessageBody::Video { media_url } => Some(media_url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    /// Serialised [`crate::Envelope`].
    pub encrypted_content: String,
    #[serde(flatten)]
    pub body: MessageBody,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn media_type(&self) -> MediaType {
        self.body.media_type()
    }

    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.receiver_id == b) || (self.sender_id == b && self.receiver_id == a)
    }
}
