//! vn_proto — Wire envelope, message records and lifecycle rules for Vanish
//!
//! # Modules
//! - `envelope`  — Hybrid (`v = "h1"`) and legacy envelope variants, parsed and validated
//! - `codec`     — Seal for N recipients / open for the local identity
//! - `context`   — The local identity a message is opened as
//! - `message`   — Message records as the message store keeps them
//! - `lifecycle` — Auto-delete modes, view-once and expiry rules
//! - `outcome`   — Success / placeholder / fatal classification for decryption
//! - `error`     — Codec and lifecycle errors

pub mod codec;
pub mod context;
pub mod envelope;
pub mod error;
pub mod lifecycle;
pub mod message;
pub mod outcome;

pub use codec::{RecipientKey, SealedMessage, SendPolicy};
pub use context::IdentityContext;
pub use envelope::{Envelope, EnvelopeFormat, HybridEnvelope, LegacyCiphertext};
pub use error::{CodecError, LifecycleError};
pub use lifecycle::{AutoDeleteMode, Lifecycle, LifecycleEvent, LifecycleState, ViewTransition, ViewUpdate};
pub use message::{MediaType, MessageBody, MessageRecord};
pub use outcome::{Opened, UNAVAILABLE_PLACEHOLDER};
