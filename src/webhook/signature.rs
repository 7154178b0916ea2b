//! GitHub webhook signature verification using HMAC-SHA256.
//!
//! GitHub signs each delivery body with the webhook's shared secret and sends
//! the result in `X-Hub-Signature-256` as `sha256=<lowercase hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "sha256=";

/// Computes the header value GitHub would send for `payload`.
///
/// HMAC accepts keys of any length, so this is `None` only if the MAC
/// implementation rejects the key.
pub fn expected_signature_header(secret: &[u8], payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload);
    Some(format!("{PREFIX}{}", hex::encode(mac.finalize().into_bytes())))
}

/// Checks `provided` against the expected `sha256=<hex>` value in constant time.
///
/// Returns `false` for a missing, malformed or mismatched header; never panics.
pub fn verify_signature(secret: &[u8], payload: &[u8], provided: Option<&str>) -> bool {
    let Some(provided) = provided else {
        return false;
    };
    let Some(expected) = expected_signature_header(secret, payload) else {
        return false;
    };
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Verifier bound to the configured secret.
///
/// Built once at startup. Without a secret it is in disabled mode and accepts
/// every delivery; the server logs that as degraded security.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Option<Vec<u8>>,
}

impl SignatureVerifier {
    pub fn new(secret: Option<&[u8]>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(<[u8]>::to_vec),
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self { secret: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify(&self, payload: &[u8], provided: Option<&str>) -> bool {
        match &self.secret {
            Some(secret) => verify_signature(secret, payload, provided),
            None => true,
        }
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
