//! Webhook signature verification
//!
//! The gateway signs each webhook delivery with HMAC-SHA256 over the raw
//! request body, hex-encoded in the `X-Gateway-Signature` header. The check
//! runs before the body is parsed, so forged payloads never reach the
//! reconciler.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use domain_invoicing::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Verifies webhook signatures against a shared secret
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Checks the hex-encoded HMAC-SHA256 signature over `payload`
    ///
    /// Comparison happens inside `verify_slice`, which is constant-time.
    pub fn verify(&self, payload: &[u8], signature: &str) -> Result<(), SignatureError> {
        let expected = hex::decode(signature)
            .map_err(|_| SignatureError("signature is not valid hex".to_string()))?;

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| SignatureError(format!("bad signing key: {e}")))?;
        mac.update(payload);
        mac.verify_slice(&expected)
            .map_err(|_| SignatureError("signature mismatch".to_string()))
    }

    /// Computes the signature this verifier would accept for `payload`
    pub fn sign(&self, payload: &[u8]) -> Result<String, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| SignatureError(format!("bad signing key: {e}")))?;
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_own_signature() {
        let verifier = WebhookVerifier::new("whsec_secret");
        let body = br#"{"intent_id":"pi_1","status":"succeeded"}"#;

        let signature = verifier.sign(body).unwrap();
        assert!(verifier.verify(body, &signature).is_ok());
    }

    #[test]
    fn test_rejects_tampered_body() {
        let verifier = WebhookVerifier::new("whsec_secret");
        let signature = verifier.sign(b"original").unwrap();

        assert!(verifier.verify(b"tampered", &signature).is_err());
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let body = b"payload";
        let signature = WebhookVerifier::new("whsec_a").sign(body).unwrap();

        assert!(WebhookVerifier::new("whsec_b").verify(body, &signature).is_err());
    }

    #[test]
    fn test_rejects_non_hex_signature() {
        let verifier = WebhookVerifier::new("whsec_secret");
        assert!(verifier.verify(b"payload", "not-hex!").is_err());
    }
}
