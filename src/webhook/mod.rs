pub mod filter;
pub mod payload;
pub mod signature;

pub use filter::should_process;
pub use payload::{PayloadError, WebhookPayload};
pub use signature::SignatureVerifier;

/// Header carrying the HMAC-SHA256 signature of the body.
pub const HEADER_SIGNATURE: &str = "x-hub-signature-256";
/// Header carrying the event type (e.g. "pull_request").
pub const HEADER_EVENT: &str = "x-github-event";
/// Header carrying GitHub's unique delivery id.
pub const HEADER_DELIVERY: &str = "x-github-delivery";
