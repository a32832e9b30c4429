//! Discourse webhook signature verification using HMAC-SHA256.
//!
//! Discourse signs each delivery body with the shared webhook secret and sends
//! the result in `X-Discourse-Event-Signature` as `sha256=<hex>`. Verification
//! runs before the body is parsed.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Discourse-Event-Signature";

/// Why a delivery failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFailure {
    /// No shared secret is configured, so nothing can be verified.
    MissingSecret,
    MissingHeader,
    /// The header is malformed or does not match the body.
    Mismatch,
}

/// Decodes a `sha256=<hex>` header into raw signature bytes.
///
/// Returns `None` for a missing prefix, another algorithm or invalid hex.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    hex::decode(header.trim().strip_prefix("sha256=")?).ok()
}

/// HMAC-SHA256 of `payload` under `secret`.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats signature bytes as a header value.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Checks a delivery body against its signature header.
///
/// The checks run in a fixed order (secret, header, digest) so every rejection
/// carries exactly one cause. The digest comparison is constant-time.
pub fn verify_delivery(
    payload: &[u8],
    signature_header: Option<&str>,
    secret: Option<&str>,
) -> Result<(), SignatureFailure> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or(SignatureFailure::MissingSecret)?;
    let header = signature_header
        .filter(|h| !h.trim().is_empty())
        .ok_or(SignatureFailure::MissingHeader)?;
    let expected = parse_signature_header(header).ok_or(SignatureFailure::Mismatch)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureFailure::Mismatch)?;
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureFailure::Mismatch)
}
