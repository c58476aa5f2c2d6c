use thiserror::Error;

use vn_crypto::CryptoError;

use crate::lifecycle::{LifecycleEvent, LifecycleState};

#[derive(Debug, Error)]
pub enum CodecError {
    /// Neither a hybrid envelope nor a decodable legacy ciphertext.
    #[error("Envelope format error: {0}")]
    Format(String),

    /// The envelope holds no wrapped key for this identity.
    #[error("No wrapped key for identity {identity_id}")]
    KeyMismatch { identity_id: String },

    #[error("Cannot encrypt for recipient {recipient_id}: {source}")]
    Recipient {
        recipient_id: String,
        #[source]
        source: CryptoError,
    },

    #[error("Recipient {0} listed more than once")]
    DuplicateRecipient(String),

    #[error("Envelope must have at least one recipient")]
    NoRecipients,

    /// Media declared but the encrypted blob could not be found.
    #[error("Media missing: {0}")]
    MediaMissing(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

impl CodecError {
    /// Per-message failures a conversation view can render as a placeholder.
    /// Everything else points at the local environment and is fatal.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CodecError::Format(_) | CodecError::KeyMismatch { .. } | CodecError::MediaMissing(_) => true,
            CodecError::Crypto(CryptoError::Decode(_) | CryptoError::DecryptAuth) => true,
            CodecError::Crypto(_)
            | CodecError::Recipient { .. }
            | CodecError::DuplicateRecipient(_)
            | CodecError::NoRecipients
            | CodecError::Serialisation(_) => false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Invalid lifecycle transition: {event:?} from {from:?}")]
    InvalidTransition { from: LifecycleState, event: LifecycleEvent },

    #[error("Unknown auto-delete mode: {0}")]
    UnknownMode(String),

    #[error("Unknown media type: {0}")]
    UnknownMediaType(String),

    #[error("{0:?} messages require a media_url")]
    MissingMediaUrl(crate::message::MediaType),
}
