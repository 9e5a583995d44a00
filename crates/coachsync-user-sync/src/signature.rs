//! HMAC-SHA256 webhook signatures.
//!
//! The digest is computed over the exact request bytes. The header carries
//! it as lowercase hex, either bare or as `sha256=<hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header prefix accepted in front of the hex digest.
const PREFIX: &str = "sha256=";

/// Why a webhook signature was refused.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    /// No signature header was sent.
    #[error("missing webhook signature")]
    Missing,
    /// The header is not a hex digest.
    #[error("malformed webhook signature")]
    Malformed,
    /// The digest does not match the body.
    #[error("webhook signature mismatch")]
    Mismatch,
}

/// Computes the hex signature of `body`.
#[must_use]
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    hex::encode(mac(secret, body).finalize().into_bytes())
}

/// Checks `header` against the digest of `body`. The comparison runs in
/// constant time.
///
/// # Errors
///
/// Returns `SignatureError` when the header is absent, undecodable, or
/// does not match.
pub fn verify_signature(
    secret: &[u8],
    body: &[u8],
    header: Option<&str>,
) -> Result<(), SignatureError> {
    let header = header.map(str::trim).filter(|h| !h.is_empty());
    let header = header.ok_or(SignatureError::Missing)?;
    let digest = header.strip_prefix(PREFIX).unwrap_or(header);
    let expected = hex::decode(digest).map_err(|_| SignatureError::Malformed)?;
    mac(secret, body)
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

fn mac(secret: &[u8], body: &[u8]) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(body);
    mac
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test";
    const BODY: &[u8] = br#"{"eventId":"evt-1","eventType":"user.updated"}"#;

    #[test]
    fn test_bare_hex_signature_verifies() {
        let signature = sign(SECRET, BODY);

        assert_eq!(signature.len(), 64);
        assert_eq!(verify_signature(SECRET, BODY, Some(&signature)), Ok(()));
    }

    #[test]
    fn test_prefixed_signature_verifies() {
        let header = format!("sha256={}", sign(SECRET, BODY));

        assert_eq!(verify_signature(SECRET, BODY, Some(&header)), Ok(()));
    }

    #[test]
    fn test_single_changed_body_byte_is_rejected() {
        let signature = sign(SECRET, BODY);
        let mut tampered = BODY.to_vec();
        tampered[3] ^= 0x01;

        assert_eq!(
            verify_signature(SECRET, &tampered, Some(&signature)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let signature = sign(b"another-secret", BODY);

        assert_eq!(
            verify_signature(SECRET, BODY, Some(&signature)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_missing_or_blank_signature_is_rejected() {
        assert_eq!(verify_signature(SECRET, BODY, None), Err(SignatureError::Missing));
        assert_eq!(
            verify_signature(SECRET, BODY, Some("  ")),
            Err(SignatureError::Missing)
        );
    }

    #[test]
    fn test_non_hex_signature_is_malformed() {
        assert_eq!(
            verify_signature(SECRET, BODY, Some("sha256=not-hex")),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn test_truncated_digest_is_rejected() {
        let signature = sign(SECRET, BODY);

        assert_eq!(
            verify_signature(SECRET, BODY, Some(&signature[..32])),
            Err(SignatureError::Mismatch)
        );
    }
}
