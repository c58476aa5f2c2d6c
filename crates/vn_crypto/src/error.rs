use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Malformed text-safe encoding or a structurally invalid key.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Decryption failed (authentication tag mismatch — possible tampering)")]
    DecryptAuth,

    #[error("Background crypto task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for CryptoError {
    fn from(e: tokio::task::JoinError) -> Self {
        CryptoError::Task(e.to_string())
    }
}
