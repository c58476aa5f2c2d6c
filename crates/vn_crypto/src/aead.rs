//! Symmetric authenticated encryption
//!
//! Uses AES-256-GCM.
//! Key size: 32 bytes.  Nonce: 12 bytes (random, fresh per call).  Tag: 16 bytes.
//!
//! A nonce is drawn from the OS RNG on every encryption and never taken from
//! the caller, so one key cannot see the same nonce twice in practice.
//! Ciphertexts carry the tag appended; the nonce travels separately as `iv`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;
use crate::{decode_b64, encode_b64};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Stand-in encrypted for empty or whitespace-only text, so an empty message
/// still produces a ciphertext and never looks like a decode failure.
pub const BLANK_PLACEHOLDER: &str = " ";

// ── Keys ──────────────────────────────────────────────────────────────────────

/// Ephemeral AES-256 key.  Drop clears memory via ZeroizeOnDrop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_raw(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::Decode(format!(
                "AES key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(raw))
    }

    pub fn as_raw(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Raw key as base64.
    pub fn export(&self) -> Zeroizing<String> {
        Zeroizing::new(encode_b64(&self.0))
    }

    pub fn import(text: &str) -> Result<Self, CryptoError> {
        let raw = Zeroizing::new(decode_b64("AES key", text)?);
        Self::from_raw(&raw)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

// ── Payload types ─────────────────────────────────────────────────────────────

/// Text ciphertext and its nonce, both base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedText {
    pub content: String,
    pub iv: String,
}

/// Binary payload with its declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl Blob {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self { bytes, mime_type: mime_type.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlob {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; NONCE_LEN],
}

// ── Byte-level primitives ─────────────────────────────────────────────────────

/// Encrypt `plaintext` under a fresh random nonce. Returns (nonce, ct+tag).
pub fn seal_bytes(
    key: &SymmetricKey,
    plaintext: &[u8],
) -> Result<([u8; NONCE_LEN], Vec<u8>), CryptoError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = key
        .cipher()
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::Encrypt("AES-GCM encryption failed".into()))?;
    let mut iv = [0u8; NONCE_LEN];
    iv.copy_from_slice(&nonce);
    Ok((iv, ciphertext))
}

pub fn open_bytes(
    key: &SymmetricKey,
    iv: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::DecryptAuth);
    }
    key.cipher()
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::DecryptAuth)
}

/// Decode a base64 nonce and check its length.
pub fn decode_iv(text: &str) -> Result<[u8; NONCE_LEN], CryptoError> {
    let bytes = decode_b64("iv", text)?;
    bytes.as_slice().try_into().map_err(|_| {
        CryptoError::Decode(format!("iv must be {NONCE_LEN} bytes, got {}", bytes.len()))
    })
}

// ── Text ──────────────────────────────────────────────────────────────────────

pub fn generate_aes_key() -> SymmetricKey {
    SymmetricKey::generate()
}

pub fn encrypt_with_aes(text: &str, key: &SymmetricKey) -> Result<SealedText, CryptoError> {
    let (iv, ct) = seal_bytes(key, normalise_text(text).as_bytes())?;
    Ok(SealedText { content: encode_b64(&ct), iv: encode_b64(&iv) })
}

pub fn decrypt_with_aes(content: &str, iv: &str, key: &SymmetricKey) -> Result<String, CryptoError> {
    let iv = decode_iv(iv)?;
    let ct = decode_b64("content", content)?;
    let plaintext = open_bytes(key, &iv, &ct)?;
    String::from_utf8(plaintext.to_vec())
        .map_err(|_| CryptoError::Decode("plaintext is not UTF-8".into()))
}

/// Blank text is replaced by [`BLANK_PLACEHOLDER`] before encryption.
pub fn normalise_text(text: &str) -> &str {
    if text.trim().is_empty() {
        BLANK_PLACEHOLDER
    } else {
        text
    }
}

// ── Blobs ─────────────────────────────────────────────────────────────────────

pub fn encrypt_blob(blob: &Blob, key: &SymmetricKey) -> Result<SealedBlob, CryptoError> {
    let (iv, ciphertext) = seal_bytes(key, &blob.bytes)?;
    Ok(SealedBlob { ciphertext, iv })
}

pub fn decrypt_to_blob(
    bytes: &[u8],
    iv: &[u8; NONCE_LEN],
    key: &SymmetricKey,
    mime_type: &str,
) -> Result<Blob, CryptoError> {
    let plaintext = open_bytes(key, iv, bytes)?;
    Ok(Blob::new(plaintext.to_vec(), mime_type))
}
