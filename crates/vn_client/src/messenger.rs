//! Messenger — the per-identity context object.
//!
//! Holds the local identity and handles to the three storage collaborators.
//! Every operation goes through an explicit `Messenger`; there is no global
//! "current user".
//!
//! # Views
//! Opening a message as its receiver is a view event. The resulting
//! lifecycle update is written with compare-and-set; a lost race re-reads
//! the record and re-evaluates, up to [`MAX_VIEW_ATTEMPTS`] times. Senders
//! reading their own messages never consume views.
//!
//! Content whose first view changes its lifecycle (view-once, snapshots,
//! `_view` timers not yet started) is only ever decrypted for its receiver
//! by [`Messenger::open_message`].
//!
//! # Decryption
//! Per-message failures become [`Opened::Unavailable`]; only local faults
//! (store, task join) are returned as errors, so one bad record never hides
//! the rest of a conversation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use vn_crypto::{Blob, KeyManager};
use vn_proto::codec::{self, RecipientKey};
use vn_proto::{
    AutoDeleteMode, CodecError, IdentityContext, Lifecycle, LifecycleEvent, LifecycleState, MediaType,
    MessageBody, MessageRecord, Opened,
};
use vn_store::{BlobStore, CleanupSweeper, KeyDirectory, MessageStore, SweepReport};

use crate::error::ClientError;
use crate::settings::ClientSettings;

pub const MAX_VIEW_ATTEMPTS: usize = 5;

/// One row of a decrypted conversation.
#[derive(Debug)]
pub struct ConversationEntry {
    pub record: MessageRecord,
    /// `None` for content addressed to us that is only decrypted by
    /// [`Messenger::open_message`].
    pub text: Option<Opened<String>>,
}

impl ConversationEntry {
    pub fn display_text(&self) -> Option<&str> {
        self.text.as_ref().map(|t| t.display_text())
    }
}

#[derive(Debug)]
pub enum ViewOutcome {
    Displayed {
        record: MessageRecord,
        text: Opened<String>,
        media: Option<Opened<Blob>>,
    },
    /// Repeat view of view-once content. The record is now a purge candidate.
    Blocked { record: MessageRecord },
}

/// A record pushed by the realtime collaborator, as seen by its receiver.
#[derive(Debug)]
pub struct Delivery {
    pub record: MessageRecord,
    pub state: LifecycleState,
    pub text: Option<Opened<String>>,
}

pub struct Messenger {
    identity: IdentityContext,
    messages: Arc<dyn MessageStore>,
    keys: Arc<dyn KeyDirectory>,
    blobs: Arc<dyn BlobStore>,
    settings: ClientSettings,
}

impl Messenger {
    pub fn new(
        identity: IdentityContext,
        messages: Arc<dyn MessageStore>,
        keys: Arc<dyn KeyDirectory>,
        blobs: Arc<dyn BlobStore>,
        settings: ClientSettings,
    ) -> Self {
        Self { identity, messages, keys, blobs, settings }
    }

    pub fn identity_id(&self) -> &str {
        &self.identity.identity_id
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Publish this identity's public key to the key directory.
    pub async fn publish_key(&self) -> Result<(), ClientError> {
        let public_key = KeyManager::export_public_key(&self.identity.private_key().public_key())?;
        self.keys.publish(self.identity_id(), &public_key).await?;
        tracing::info!(identity = self.identity_id(), "public key published");
        Ok(())
    }

    // ── Sending ──────────────────────────────────────────────────────────────

    pub async fn send_text(
        &self,
        receiver_id: &str,
        text: &str,
        mode: Option<AutoDeleteMode>,
    ) -> Result<MessageRecord, ClientError> {
        let recipients = self.recipients_for(receiver_id).await?;
        let policy = self.settings.send_policy.for_receiver(receiver_id);
        let sealed = codec::seal(text, None, &recipients, &policy).await?;

        let record = self.new_record(
            Uuid::new_v4().to_string(),
            receiver_id,
            sealed.encrypted_content()?,
            MessageBody::Text,
            mode,
        );
        self.messages.insert(&record).await?;
        tracing::info!(id = %record.id, receiver = receiver_id, format = ?sealed.format(), "message sent");
        Ok(record)
    }

    pub async fn send_media(
        &self,
        receiver_id: &str,
        caption: &str,
        media: &Blob,
        media_type: MediaType,
        mode: Option<AutoDeleteMode>,
    ) -> Result<MessageRecord, ClientError> {
        let mime_type = media_type
            .mime_type()
            .ok_or_else(|| ClientError::InvalidRequest("send_media needs an image, snapshot or video".into()))?;

        let recipients = self.recipients_for(receiver_id).await?;
        let policy = self.settings.send_policy.for_receiver(receiver_id);
        let sealed = codec::seal(caption, Some(media), &recipients, &policy).await?;
        let sealed_media = sealed
            .media
            .as_ref()
            .ok_or_else(|| ClientError::Codec(CodecError::MediaMissing("sealed message lost its media".into())))?;

        let id = Uuid::new_v4().to_string();
        let path = format!("{}/{id}.bin", self.identity_id());
        let body = MessageBody::from_parts(media_type, Some(path.clone()))?;
        let record = self.new_record(id, receiver_id, sealed.encrypted_content()?, body, mode);

        self.blobs.put(&path, &sealed_media.ciphertext, mime_type).await?;
        if let Err(e) = self.messages.insert(&record).await {
            if let Err(cleanup) = self.blobs.delete(&path).await {
                tracing::warn!(path = %path, error = %cleanup, "could not remove blob of unsent message");
            }
            return Err(e.into());
        }
        tracing::info!(
            id = %record.id,
            receiver = receiver_id,
            media_type = %media_type,
            bytes = media.bytes.len(),
            "media message sent"
        );
        Ok(record)
    }

    /// Receiver plus sender, so the sender can read their own history.
    ///
    /// The sender entry uses the published key when there is one, so a broken
    /// directory entry surfaces here the same way it would for the receiver.
    async fn recipients_for(&self, receiver_id: &str) -> Result<Vec<RecipientKey>, ClientError> {
        let receiver_key = self
            .keys
            .public_key(receiver_id)
            .await?
            .ok_or_else(|| ClientError::KeysNotReady(receiver_id.to_string()))?;
        let mut recipients = vec![RecipientKey::new(receiver_id, receiver_key)];

        if receiver_id != self.identity_id() {
            let own_key = match self.keys.public_key(self.identity_id()).await? {
                Some(published) => published,
                None => {
                    tracing::debug!(identity = self.identity_id(), "own key unpublished; using local copy");
                    KeyManager::export_public_key(&self.identity.private_key().public_key())?
                }
            };
            recipients.push(RecipientKey::new(self.identity_id(), own_key));
        }
        Ok(recipients)
    }

    fn new_record(
        &self,
        id: String,
        receiver_id: &str,
        encrypted_content: String,
        body: MessageBody,
        mode: Option<AutoDeleteMode>,
    ) -> MessageRecord {
        let now = Utc::now();
        MessageRecord {
            id,
            sender_id: self.identity_id().to_string(),
            receiver_id: receiver_id.to_string(),
            encrypted_content,
            body,
            lifecycle: Lifecycle::at_send(mode.unwrap_or(self.settings.auto_delete), now),
            created_at: now,
        }
    }

    // ── Reading ──────────────────────────────────────────────────────────────

    pub async fn load_conversation(&self, peer_id: &str) -> Result<Vec<ConversationEntry>, ClientError> {
        let records = self.messages.between(self.identity_id(), peer_id).await?;

        let readable: Vec<(usize, String)> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| !self.is_gated(r))
            .map(|(i, r)| (i, r.encrypted_content.clone()))
            .collect();
        let (indices, contents): (Vec<usize>, Vec<String>) = readable.into_iter().unzip();
        let mut opened: HashMap<usize, Opened<String>> =
            indices.into_iter().zip(self.decrypt_texts(contents).await?).collect();

        let entries: Vec<ConversationEntry> = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| ConversationEntry { record, text: opened.remove(&i) })
            .collect();

        let unavailable = entries
            .iter()
            .filter(|e| e.text.as_ref().is_some_and(|t| t.is_unavailable()))
            .count();
        tracing::debug!(peer = peer_id, total = entries.len(), unavailable, "conversation loaded");
        Ok(entries)
    }

    /// Deliveries from the realtime collaborator. The record is already in
    /// the store; this only decrypts it and reports where it stands.
    pub async fn ingest(&self, record: MessageRecord) -> Result<Delivery, ClientError> {
        if record.receiver_id != self.identity_id() {
            return Err(ClientError::InvalidRequest(format!(
                "message {} is not addressed to {}",
                record.id,
                self.identity_id()
            )));
        }

        let state = match record.lifecycle.state() {
            LifecycleState::Sent => LifecycleState::Sent.next(LifecycleEvent::Deliver)?,
            other => other,
        };
        let text = if self.is_gated(&record) {
            None
        } else {
            self.decrypt_texts(vec![record.encrypted_content.clone()]).await?.pop()
        };
        Ok(Delivery { record, state, text })
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    pub async fn open_message(&self, id: &str) -> Result<ViewOutcome, ClientError> {
        for _ in 0..MAX_VIEW_ATTEMPTS {
            let mut record = self.fetch_record(id).await?;
            if !self.is_receiver(&record) {
                return self.display(record).await;
            }

            let transition = record.lifecycle.register_view(record.media_type(), Utc::now());
            if let Some(update) = transition.update() {
                if !self.messages.apply_view(id, update.expected_view_count, update).await? {
                    tracing::debug!(id, "view update lost a race; re-reading");
                    continue;
                }
                update.apply(&mut record.lifecycle);
            }

            if transition.is_blocked() {
                tracing::info!(id, view_count = record.lifecycle.view_count, "repeat view refused");
                return Ok(ViewOutcome::Blocked { record });
            }
            return self.display(record).await;
        }
        Err(ClientError::ViewContention(id.to_string()))
    }

    /// Decrypt the media of message `id` without registering a view.
    ///
    /// The receiver of gated content has to go through `open_message`.
    pub async fn fetch_media(&self, id: &str) -> Result<Opened<Blob>, ClientError> {
        let record = self.fetch_record(id).await?;
        if self.is_receiver(&record) && record.lifecycle.is_blocked() {
            return Err(ClientError::ViewBlocked(id.to_string()));
        }
        if self.is_gated(&record) {
            return Err(ClientError::OpenRequired(id.to_string()));
        }
        self.open_blob(&record).await
    }

    pub async fn set_saved(&self, id: &str, saved: bool) -> Result<(), ClientError> {
        let record = self.fetch_record(id).await?;
        if !self.messages.set_saved(&record.id, saved).await? {
            return Err(ClientError::NotFound(id.to_string()));
        }
        tracing::info!(id, saved, "saved flag updated");
        Ok(())
    }

    pub async fn sweep(&self) -> Result<SweepReport, ClientError> {
        let sweeper = CleanupSweeper::new(self.settings.sweep_batch_size);
        let report = sweeper.sweep(self.messages.as_ref(), Utc::now()).await?;
        sweeper.purge_blobs(self.blobs.as_ref(), &report).await;
        Ok(report)
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    /// Fetch a record this identity takes part in.
    async fn fetch_record(&self, id: &str) -> Result<MessageRecord, ClientError> {
        self.messages
            .get(id)
            .await?
            .filter(|r| r.sender_id == self.identity_id() || r.receiver_id == self.identity_id())
            .ok_or_else(|| ClientError::NotFound(id.to_string()))
    }

    fn is_receiver(&self, record: &MessageRecord) -> bool {
        record.receiver_id == self.identity_id()
    }

    /// Addressed to us and not readable without registering a view.
    fn is_gated(&self, record: &MessageRecord) -> bool {
        let lifecycle = &record.lifecycle;
        self.is_receiver(record)
            && (lifecycle.is_view_limited(record.media_type()) || (lifecycle.is_disappearing && !lifecycle.is_viewed))
    }

    async fn display(&self, record: MessageRecord) -> Result<ViewOutcome, ClientError> {
        let text = self
            .decrypt_texts(vec![record.encrypted_content.clone()])
            .await?
            .pop()
            .ok_or_else(|| ClientError::NotFound(record.id.clone()))?;
        let media = match record.body.media_url() {
            Some(_) => Some(self.open_blob(&record).await?),
            None => None,
        };
        Ok(ViewOutcome::Displayed { record, text, media })
    }

    async fn decrypt_texts(&self, contents: Vec<String>) -> Result<Vec<Opened<String>>, ClientError> {
        if contents.is_empty() {
            return Ok(Vec::new());
        }
        let identity = self.identity.clone();
        let opened = tokio::task::spawn_blocking(move || {
            contents
                .iter()
                .map(|raw| Opened::classify(codec::open_text(raw, &identity)))
                .collect::<Result<Vec<_>, CodecError>>()
        })
        .await??;
        Ok(opened)
    }

    async fn open_blob(&self, record: &MessageRecord) -> Result<Opened<Blob>, ClientError> {
        let path = record
            .body
            .media_url()
            .ok_or_else(|| ClientError::InvalidRequest(format!("message {} carries no media", record.id)))?;

        let Some(ciphertext) = self.blobs.get(path).await? else {
            return Ok(Opened::classify(Err(CodecError::MediaMissing(path.to_string())))?);
        };

        let identity = self.identity.clone();
        let raw = record.encrypted_content.clone();
        let media_type = record.media_type();
        let result =
            tokio::task::spawn_blocking(move || codec::open_media(&raw, &ciphertext, media_type, &identity))
                .await?;
        Ok(Opened::classify(result)?)
    }
}
