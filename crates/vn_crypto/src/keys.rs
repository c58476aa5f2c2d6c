//! Asymmetric key management
//!
//! Every identity owns one RSA `KeyPair`. The public half travels through
//! the key directory as base64 SPKI DER and is only ever used to wrap
//! per-message AES keys (or, for legacy envelopes, the plaintext itself).
//! The private half is exported as base64 PKCS#8 DER, stays on the device,
//! and only ever unwraps.
//!
//! Parameters: 4096-bit modulus by default, OAEP padding, SHA-512 for both
//! the OAEP hash and MGF1. Anything under 2048 bits is rejected on import.
//!
//! Keys are never rotated or versioned. A message stays readable only while
//! the private key that it was wrapped for is retained.

use std::fmt;

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::{decode_b64, encode_b64};

pub const DEFAULT_MODULUS_BITS: usize = 4096;
pub const MIN_MODULUS_BITS: usize = 2048;

/// SHA-512 output length, used to compute the OAEP payload limit.
const OAEP_HASH_LEN: usize = 64;

fn oaep() -> Oaep {
    Oaep::new::<Sha512>()
}

// ── Key newtypes ──────────────────────────────────────────────────────────────

/// Encrypt-only half of a key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// RSA-OAEP encrypt `plaintext`. Used to wrap raw AES keys and to build
    /// legacy single-recipient ciphertexts.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let limit = self.max_plaintext_len();
        if plaintext.len() > limit {
            return Err(CryptoError::Encrypt(format!(
                "payload of {} bytes exceeds the OAEP limit of {limit}",
                plaintext.len()
            )));
        }
        self.0
            .encrypt(&mut OsRng, oaep(), plaintext)
            .map_err(|e| CryptoError::Encrypt(e.to_string()))
    }

    pub fn modulus_bits(&self) -> usize {
        self.0.size() * 8
    }

    /// Largest payload a single OAEP block can carry with this key.
    pub fn max_plaintext_len(&self) -> usize {
        self.0.size().saturating_sub(2 * OAEP_HASH_LEN + 2)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("modulus_bits", &self.modulus_bits())
            .finish()
    }
}

/// Decrypt-only half of a key pair. The inner key zeroizes itself on drop.
#[derive(Clone)]
pub struct PrivateKey(RsaPrivateKey);

impl PrivateKey {
    /// RSA-OAEP decrypt. Any padding or integrity failure is reported as
    /// [`CryptoError::DecryptAuth`]; the caller cannot tell a wrong key from
    /// a tampered ciphertext.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        self.0
            .decrypt(oaep(), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::DecryptAuth)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(RsaPublicKey::from(&self.0))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

// ── Key manager ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct KeyManager {
    modulus_bits: usize,
}

impl Default for KeyManager {
    fn default() -> Self {
        Self { modulus_bits: DEFAULT_MODULUS_BITS }
    }
}

impl KeyManager {
    pub fn new(modulus_bits: usize) -> Result<Self, CryptoError> {
        if modulus_bits < MIN_MODULUS_BITS {
            return Err(CryptoError::KeyGeneration(format!(
                "modulus of {modulus_bits} bits is below the {MIN_MODULUS_BITS}-bit minimum"
            )));
        }
        Ok(Self { modulus_bits })
    }

    pub fn modulus_bits(&self) -> usize {
        self.modulus_bits
    }

    /// Generate a fresh key pair. CPU-bound; prefer
    /// [`KeyManager::generate_key_pair_async`] from async code.
    pub fn generate_key_pair(&self) -> Result<KeyPair, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, self.modulus_bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        tracing::debug!(bits = self.modulus_bits, "generated RSA key pair");
        Ok(KeyPair {
            public_key: PublicKey(public),
            private_key: PrivateKey(private),
        })
    }

    /// Same as [`KeyManager::generate_key_pair`], on tokio's blocking pool.
    pub async fn generate_key_pair_async(&self) -> Result<KeyPair, CryptoError> {
        let manager = *self;
        tokio::task::spawn_blocking(move || manager.generate_key_pair()).await?
    }

    /// Base64 SPKI DER.
    pub fn export_public_key(key: &PublicKey) -> Result<String, CryptoError> {
        let der = key
            .0
            .to_public_key_der()
            .map_err(|e| CryptoError::Decode(format!("SPKI export: {e}")))?;
        Ok(encode_b64(der.as_bytes()))
    }

    /// Base64 PKCS#8 DER, in a buffer that is wiped on drop.
    pub fn export_private_key(key: &PrivateKey) -> Result<Zeroizing<String>, CryptoError> {
        let der = key
            .0
            .to_pkcs8_der()
            .map_err(|e| CryptoError::Decode(format!("PKCS#8 export: {e}")))?;
        Ok(Zeroizing::new(encode_b64(der.as_bytes())))
    }

    pub fn import_public_key(text: &str) -> Result<PublicKey, CryptoError> {
        let der = decode_b64("public key", text)?;
        let key = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| CryptoError::Decode(format!("SPKI: {e}")))?;
        let key = PublicKey(key);
        check_modulus(key.modulus_bits())?;
        Ok(key)
    }

    pub fn import_private_key(text: &str) -> Result<PrivateKey, CryptoError> {
        let der = Zeroizing::new(decode_b64("private key", text)?);
        let key = RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| CryptoError::Decode(format!("PKCS#8: {e}")))?;
        key.validate()
            .map_err(|e| CryptoError::Decode(format!("PKCS#8: {e}")))?;
        check_modulus(key.size() * 8)?;
        Ok(PrivateKey(key))
    }
}

fn check_modulus(bits: usize) -> Result<(), CryptoError> {
    if bits < MIN_MODULUS_BITS {
        return Err(CryptoError::Decode(format!(
            "RSA modulus of {bits} bits is below the {MIN_MODULUS_BITS}-bit minimum"
        )));
    }
    Ok(())
}
