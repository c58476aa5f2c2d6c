//! The identity a caller is acting as.

use vn_crypto::PrivateKey;

/// Local identity id plus its private key. Passed explicitly to every open
/// operation; nothing in this workspace caches it globally.
#[derive(Debug, Clone)]
pub struct IdentityContext {
    pub identity_id: String,
    private_key: PrivateKey,
}

impl IdentityContext {
    pub fn new(identity_id: impl Into<String>, private_key: PrivateKey) -> Self {
        Self { identity_id: identity_id.into(), private_key }
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}
