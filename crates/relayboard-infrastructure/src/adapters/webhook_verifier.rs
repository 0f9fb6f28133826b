//! HMAC-SHA256 webhook signature verification (spec §4.4 step 3).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use relayboard_domain::ports::WebhookVerifier;

type HmacSha256 = Hmac<Sha256>;

/// Verifies webhook signatures with a shared secret, hex-encoded HMAC-SHA256.
///
/// If no secret is configured, [`verify`](Self::verify) always returns
/// `true` — the caller is expected to have already logged a warning at
/// startup (spec §4.4: "If no secret is configured, logs a warning but proceeds").
pub struct HmacWebhookVerifier {
    secret: Option<Vec<u8>>,
}

impl HmacWebhookVerifier {
    /// Construct a verifier over the configured shared secret, if any.
    #[must_use]
    pub fn new(secret: Option<String>) -> Self {
        Self { secret: secret.map(String::into_bytes) }
    }
}

impl WebhookVerifier for HmacWebhookVerifier {
    fn verify(&self, payload: &[u8], signature: &str) -> bool {
        let Some(secret) = &self.secret else {
            return true;
        };
        let Ok(expected_bytes) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
            return false;
        };
        mac.update(payload);
        mac.verify_slice(&expected_bytes).is_ok()
    }
}
