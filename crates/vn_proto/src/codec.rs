//! Hybrid envelope codec.
//!
//! Seal: one ephemeral AES-256 key per message → encrypt text (and media,
//! under its own nonce) once → wrap the raw key with RSA-OAEP for every
//! recipient, sender included so sent history stays readable.
//!
//! Wrapping runs as one blocking task per recipient. The envelope is built
//! only after every wrap has succeeded, so a partial envelope can never
//! reach the store.
//!
//! Open: parse → find this identity's wrapped key → unwrap → decrypt.
//! Legacy ciphertexts are decrypted directly with the private key.

use std::collections::{BTreeMap, HashSet};

use tokio::task::JoinSet;
use zeroize::Zeroizing;

use vn_crypto::aead::{self, Blob, SealedBlob, SymmetricKey};
use vn_crypto::{CryptoError, KeyManager};

use crate::context::IdentityContext;
use crate::envelope::{Envelope, EnvelopeFormat, HybridEnvelope, LegacyCiphertext};
use crate::error::CodecError;
use crate::message::MediaType;

/// A recipient as delivered by the key directory: id plus base64 SPKI key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientKey {
    pub recipient_id: String,
    pub public_key: String,
}

impl RecipientKey {
    pub fn new(recipient_id: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self { recipient_id: recipient_id.into(), public_key: public_key.into() }
    }
}

/// What to do when the hybrid envelope cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SendPolicy {
    /// Fail the whole send, naming the recipient that broke it.
    #[default]
    Strict,
    /// Encrypt the plaintext directly for one recipient instead. Everyone
    /// else loses the message, and media cannot be carried.
    LegacyFallback { recipient_id: String },
}

#[derive(Debug, Clone)]
pub struct SealedMessage {
    pub envelope: Envelope,
    /// Media ciphertext, to be handed to the blob store.
    pub media: Option<SealedBlob>,
}

impl SealedMessage {
    pub fn format(&self) -> EnvelopeFormat {
        self.envelope.format()
    }

    pub fn encrypted_content(&self) -> Result<String, CodecError> {
        self.envelope.encode()
    }
}

// ── Seal ──────────────────────────────────────────────────────────────────────

pub async fn seal(
    text: &str,
    media: Option<&Blob>,
    recipients: &[RecipientKey],
    policy: &SendPolicy,
) -> Result<SealedMessage, CodecError> {
    let err = match seal_hybrid(text, media, recipients).await {
        Ok(sealed) => return Ok(sealed),
        Err(err) => err,
    };

    // Only a recipient whose key cannot be used is a reason to narrow.
    match policy {
        SendPolicy::Strict => Err(err),
        SendPolicy::LegacyFallback { .. } if media.is_some() => Err(err),
        SendPolicy::LegacyFallback { .. } if !matches!(err, CodecError::Recipient { .. }) => Err(err),
        SendPolicy::LegacyFallback { recipient_id } => {
            tracing::warn!(
                error = %err,
                %recipient_id,
                "hybrid envelope failed; narrowing delivery to a legacy ciphertext"
            );
            seal_legacy(text, recipients, recipient_id)
        }
    }
}

async fn seal_hybrid(
    text: &str,
    media: Option<&Blob>,
    recipients: &[RecipientKey],
) -> Result<SealedMessage, CodecError> {
    check_recipients(recipients)?;

    let key = aead::generate_aes_key();
    let (iv, content) = aead::seal_bytes(&key, aead::normalise_text(text).as_bytes())?;
    let media = media.map(|blob| aead::encrypt_blob(blob, &key)).transpose()?;
    let keys = wrap_for_all(&key, recipients).await?;

    tracing::debug!(recipients = keys.len(), has_media = media.is_some(), "sealed hybrid envelope");
    Ok(SealedMessage {
        envelope: Envelope::Hybrid(HybridEnvelope {
            iv,
            content,
            media_iv: media.as_ref().map(|m| m.iv),
            keys,
        }),
        media,
    })
}

fn check_recipients(recipients: &[RecipientKey]) -> Result<(), CodecError> {
    if recipients.is_empty() {
        return Err(CodecError::NoRecipients);
    }
    let mut seen = HashSet::new();
    for r in recipients {
        if !seen.insert(r.recipient_id.as_str()) {
            return Err(CodecError::DuplicateRecipient(r.recipient_id.clone()));
        }
    }
    Ok(())
}

async fn wrap_for_all(
    key: &SymmetricKey,
    recipients: &[RecipientKey],
) -> Result<BTreeMap<String, Vec<u8>>, CodecError> {
    let mut tasks = JoinSet::new();
    for recipient in recipients.iter().cloned() {
        let raw = Zeroizing::new(key.as_raw().to_vec());
        tasks.spawn_blocking(move || {
            let wrapped = KeyManager::import_public_key(&recipient.public_key)
                .and_then(|public_key| public_key.encrypt(&raw));
            (recipient.recipient_id, wrapped)
        });
    }

    let mut keys = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (recipient_id, wrapped) = joined.map_err(CryptoError::from)?;
        let wrapped = wrapped.map_err(|source| CodecError::Recipient {
            recipient_id: recipient_id.clone(),
            source,
        })?;
        keys.insert(recipient_id, wrapped);
    }
    Ok(keys)
}

fn seal_legacy(
    text: &str,
    recipients: &[RecipientKey],
    recipient_id: &str,
) -> Result<SealedMessage, CodecError> {
    let recipient = recipients
        .iter()
        .find(|r| r.recipient_id == recipient_id)
        .ok_or_else(|| CodecError::Recipient {
            recipient_id: recipient_id.to_string(),
            source: CryptoError::Decode("no public key supplied".into()),
        })?;
    let ciphertext = KeyManager::import_public_key(&recipient.public_key)
        .and_then(|public_key| public_key.encrypt(aead::normalise_text(text).as_bytes()))
        .map_err(|source| CodecError::Recipient {
            recipient_id: recipient_id.to_string(),
            source,
        })?;
    Ok(SealedMessage {
        envelope: Envelope::Legacy(LegacyCiphertext(ciphertext)),
        media: None,
    })
}

// ── Open ──────────────────────────────────────────────────────────────────────

pub fn open_text(encrypted_content: &str, identity: &IdentityContext) -> Result<String, CodecError> {
    let plaintext = match Envelope::parse(encrypted_content)? {
        Envelope::Hybrid(env) => {
            let key = unwrap_for(&env, identity)?;
            aead::open_bytes(&key, &env.iv, &env.content)?
        }
        Envelope::Legacy(ct) => identity.private_key().decrypt(&ct.0)?,
    };
    String::from_utf8(plaintext.to_vec())
        .map_err(|_| CodecError::Crypto(CryptoError::Decode("plaintext is not UTF-8".into())))
}

/// Decrypt the media ciphertext that belongs to `encrypted_content`.
pub fn open_media(
    encrypted_content: &str,
    ciphertext: &[u8],
    media_type: MediaType,
    identity: &IdentityContext,
) -> Result<Blob, CodecError> {
    let mime_type = media_type
        .mime_type()
        .ok_or_else(|| CodecError::Format("text messages carry no media".into()))?;
    match Envelope::parse(encrypted_content)? {
        Envelope::Hybrid(env) => {
            let key = unwrap_for(&env, identity)?;
            Ok(aead::decrypt_to_blob(ciphertext, &env.media_nonce(), &key, mime_type)?)
        }
        Envelope::Legacy(_) => Err(CodecError::Format(
            "legacy envelopes carry no media key".into(),
        )),
    }
}

fn unwrap_for(env: &HybridEnvelope, identity: &IdentityContext) -> Result<SymmetricKey, CodecError> {
    let wrapped = env
        .wrapped_key_for(&identity.identity_id)
        .ok_or_else(|| CodecError::KeyMismatch { identity_id: identity.identity_id.clone() })?;
    let raw = identity.private_key().decrypt(wrapped)?;
    Ok(SymmetricKey::from_raw(&raw)?)
}
