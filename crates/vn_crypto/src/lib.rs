//! vn_crypto — Vanish cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; RSA-OAEP and AES-GCM come from audited RustCrypto crates.
//! - Symmetric keys are zeroized on drop and never leave this crate unwrapped
//!   except through an explicit export.
//! - Public and private keys are distinct types, so a public key can only
//!   encrypt and a private key can only decrypt.
//!
//! # Module layout
//! - `keys`   — RSA-4096 / OAEP-SHA512 key pairs, SPKI / PKCS#8 import + export
//! - `aead`   — AES-256-GCM keys, text and blob encryption
//! - `error`  — unified error type

pub mod aead;
pub mod error;
pub mod keys;

pub use aead::{Blob, SealedBlob, SealedText, SymmetricKey};
pub use error::CryptoError;
pub use keys::{KeyManager, KeyPair, PrivateKey, PublicKey};

/// Standard base64 used for every text-safe value this workspace emits.
pub(crate) fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// Decode standard base64, mapping failures to [`CryptoError::Decode`].
pub fn decode_b64(what: &str, text: &str) -> Result<Vec<u8>, CryptoError> {
    use base64::Engine;
    b64()
        .decode(text.trim())
        .map_err(|e| CryptoError::Decode(format!("{what}: {e}")))
}

/// Encode bytes as standard base64.
pub fn encode_b64(bytes: &[u8]) -> String {
    use base64::Engine;
    b64().encode(bytes)
}
