use thiserror::Error;

use vn_crypto::CryptoError;
use vn_proto::{CodecError, LifecycleError};
use vn_store::StoreError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// A recipient has never published a public key.
    #[error("Keys not ready: {0} has not published a public key yet")]
    KeysNotReady(String),

    #[error("Cannot encrypt for {recipient_id}: {reason}. Ask them to reopen the app so their key is republished")]
    EncryptionImpossible { recipient_id: String, reason: String },

    #[error("Message not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// View-once content that has already been consumed.
    #[error("Message {0} can no longer be viewed")]
    ViewBlocked(String),

    /// Content that only `open_message` may reveal to its receiver.
    #[error("Message {0} has to be opened; fetching it would skip the view")]
    OpenRequired(String),

    /// Other writers kept changing the record between read and write.
    #[error("View of {0} lost too many compare-and-set races")]
    ViewContention(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Codec error: {0}")]
    Codec(CodecError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl From<CodecError> for ClientError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Recipient { recipient_id, source } => {
                ClientError::EncryptionImpossible { recipient_id, reason: source.to_string() }
            }
            other => ClientError::Codec(other),
        }
    }
}

impl From<tokio::task::JoinError> for ClientError {
    fn from(err: tokio::task::JoinError) -> Self {
        ClientError::Crypto(CryptoError::from(err))
    }
}
