//! One decryption policy for text and media alike.
//!
//! - success           → `Ok(Opened::Plain(value))`
//! - per-message fault → `Ok(Opened::Unavailable(reason))`, shown as an inert placeholder
//! - local fault       → `Err(error)`, surfaced to the caller
//!
//! Which errors count as per-message faults is decided by
//! [`CodecError::is_recoverable`].

use crate::error::CodecError;

pub const UNAVAILABLE_PLACEHOLDER: &str = "🔒 Message unavailable";

#[derive(Debug)]
pub enum Opened<T> {
    Plain(T),
    Unavailable(CodecError),
}

impl<T> Opened<T> {
    pub fn classify(result: Result<T, CodecError>) -> Result<Self, CodecError> {
        match result {
            Ok(value) => Ok(Opened::Plain(value)),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "message could not be opened; showing placeholder");
                Ok(Opened::Unavailable(e))
            }
            Err(e) => Err(e),
        }
    }

    pub fn plain(&self) -> Option<&T> {
        match self {
            Opened::Plain(value) => Some(value),
            Opened::Unavailable(_) => None,
        }
    }

    pub fn into_plain(self) -> Option<T> {
        match self {
            Opened::Plain(value) => Some(value),
            Opened::Unavailable(_) => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Opened::Unavailable(_))
    }
}

impl Opened<String> {
    pub fn display_text(&self) -> &str {
        match self {
            Opened::Plain(text) => text,
            Opened::Unavailable(_) => UNAVAILABLE_PLACEHOLDER,
        }
    }
}

#[cfg(test)]
mod tests {
    use vn_crypto::CryptoError;

    use super::*;

    #[test]
    fn recoverable_errors_become_placeholders() {
        let opened: Opened<String> =
            Opened::classify(Err(CodecError::KeyMismatch { identity_id: "eve".into() })).unwrap();
        assert!(opened.is_unavailable());
        assert_eq!(opened.display_text(), UNAVAILABLE_PLACEHOLDER);

        let opened: Opened<String> =
            Opened::classify(Err(CodecError::Crypto(CryptoError::DecryptAuth))).unwrap();
        assert!(opened.is_unavailable());
    }

    #[test]
    fn local_faults_stay_errors() {
        let result: Result<Opened<String>, _> =
            Opened::classify(Err(CodecError::Crypto(CryptoError::Task("join".into()))));
        assert!(result.is_err());
    }

    #[test]
    fn success_passes_through() {
        let opened = Opened::classify(Ok("hi".to_string())).unwrap();
        assert_eq!(opened.display_text(), "hi");
        assert_eq!(opened.into_plain().as_deref(), Some("hi"));
    }
}
