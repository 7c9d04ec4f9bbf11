//! Workflow webhook relay for voicehook.
//!
//! Sends caller text to an externally configured workflow webhook (n8n or
//! anything speaking the same envelope) and turns whatever it answers into a
//! canonical [`voicehook_types::Reply`].
//!
//! The relay deliberately distinguishes two kinds of failure. A webhook that
//! answers with an error status still produces a reply describing the error,
//! so the conversation can continue. A webhook that cannot be reached at all
//! is reported as [`WebhookError::Network`].

pub mod error;
pub mod normalize;
pub mod relay;

pub use error::WebhookError;
pub use normalize::{classify, normalize, ReplyShape, FALLBACK_KEYS};
pub use relay::{validate_webhook_url, WebhookClient, WebhookConfig};
