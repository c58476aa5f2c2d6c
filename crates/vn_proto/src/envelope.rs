//! Encrypted message envelope — what the message store keeps in
//! `encrypted_content`.
//!
//! Two shapes exist on the wire:
//!
//! ```text
//! hybrid  {"v":"h1","iv":b64,"content":b64,"media_iv"?:b64,"keys":{id:b64,..}}
//! legacy  b64(RSA-OAEP(plaintext))            -- no JSON, one recipient
//! ```
//!
//! Negotiation is structural: a string that parses as JSON *and* carries
//! `v = "h1"` with `keys`, `content` and `iv` is hybrid. Any other string
//! is treated as legacy. Old records therefore stay readable without a
//! migration step. Once a string is classified as hybrid it is validated
//! in full; a broken hybrid envelope never falls through to legacy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use vn_crypto::aead::{decode_iv, NONCE_LEN};
use vn_crypto::{decode_b64, encode_b64, CryptoError};

use crate::error::CodecError;

pub const HYBRID_VERSION: &str = "h1";

/// Serde shape of a hybrid envelope.
#[derive(Debug, Serialize, Deserialize)]
struct WireHybrid {
    v: String,
    iv: String,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    media_iv: Option<String>,
    keys: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeFormat {
    Hybrid,
    Legacy,
}

/// Validated hybrid envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridEnvelope {
    pub iv: [u8; NONCE_LEN],
    /// AES-GCM ciphertext (with tag) of the text body.
    pub content: Vec<u8>,
    pub media_iv: Option<[u8; NONCE_LEN]>,
    /// RSA-OAEP wrapped AES key per recipient id.
    pub keys: BTreeMap<String, Vec<u8>>,
}

impl HybridEnvelope {
    pub fn wrapped_key_for(&self, identity_id: &str) -> Option<&[u8]> {
        self.keys.get(identity_id).map(Vec::as_slice)
    }

    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// Nonce for the attached media; older envelopes reused the text nonce.
    pub fn media_nonce(&self) -> [u8; NONCE_LEN] {
        self.media_iv.unwrap_or(self.iv)
    }
}

/// Bare RSA-OAEP ciphertext of the plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyCiphertext(pub Vec<u8>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Hybrid(HybridEnvelope),
    Legacy(LegacyCiphertext),
}

impl Envelope {
    pub fn parse(raw: &str) -> Result<Self, CodecError> {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) if has_hybrid_shape(&value) => {
                let wire: WireHybrid = serde_json::from_value(value)
                    .map_err(|e| CodecError::Format(format!("hybrid envelope: {e}")))?;
                Ok(Envelope::Hybrid(validate(wire)?))
            }
            // Not JSON, or JSON of some other shape: the whole string is a
            // legacy ciphertext.
            Ok(_) | Err(_) => parse_legacy(raw),
        }
    }

    pub fn format(&self) -> EnvelopeFormat {
        match self {
            Envelope::Hybrid(_) => EnvelopeFormat::Hybrid,
            Envelope::Legacy(_) => EnvelopeFormat::Legacy,
        }
    }

    /// Serialise for `encrypted_content`.
    pub fn encode(&self) -> Result<String, CodecError> {
        match self {
            Envelope::Hybrid(env) => {
                let wire = WireHybrid {
                    v: HYBRID_VERSION.to_string(),
                    iv: encode_b64(&env.iv),
                    content: encode_b64(&env.content),
                    media_iv: env.media_iv.map(|iv| encode_b64(&iv)),
                    keys: env
                        .keys
                        .iter()
                        .map(|(id, wrapped)| (id.clone(), encode_b64(wrapped)))
                        .collect(),
                };
                Ok(serde_json::to_string(&wire)?)
            }
            Envelope::Legacy(ct) => Ok(encode_b64(&ct.0)),
        }
    }
}

fn has_hybrid_shape(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    obj.get("v").and_then(Value::as_str) == Some(HYBRID_VERSION)
        && obj.get("keys").is_some_and(Value::is_object)
        && obj.get("content").is_some_and(Value::is_string)
        && obj.get("iv").is_some_and(Value::is_string)
}

fn validate(wire: WireHybrid) -> Result<HybridEnvelope, CodecError> {
    if wire.keys.is_empty() {
        return Err(CodecError::Format("hybrid envelope has no recipients".into()));
    }
    let iv = decode_iv(&wire.iv).map_err(format_error)?;
    let content = decode_b64("content", &wire.content).map_err(format_error)?;
    if content.is_empty() {
        return Err(CodecError::Format("hybrid envelope has empty content".into()));
    }
    let media_iv = wire
        .media_iv
        .as_deref()
        .map(decode_iv)
        .transpose()
        .map_err(format_error)?;

    let mut keys = BTreeMap::new();
    for (id, wrapped) in wire.keys {
        let bytes = decode_b64("wrapped key", &wrapped).map_err(format_error)?;
        if bytes.is_empty() {
            return Err(CodecError::Format(format!("empty wrapped key for {id}")));
        }
        keys.insert(id, bytes);
    }

    Ok(HybridEnvelope { iv, content, media_iv, keys })
}

fn parse_legacy(raw: &str) -> Result<Envelope, CodecError> {
    let bytes = decode_b64("legacy ciphertext", raw).map_err(format_error)?;
    if bytes.is_empty() {
        return Err(CodecError::Format("empty ciphertext".into()));
    }
    Ok(Envelope::Legacy(LegacyCiphertext(bytes)))
}

fn format_error(e: CryptoError) -> CodecError {
    CodecError::Format(e.to_string())
}
