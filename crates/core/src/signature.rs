//! Webhook signature verification using HMAC-SHA256.
//!
//! Meta signs webhook deliveries with a shared app secret and puts the
//! digest in the `X-Hub-Signature-256` header as `sha256=<hex>`. This is the
//! first gate on the inbound path: an invalid signature rejects the request
//! before the body is parsed.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SHA256_DIGEST_LEN: usize = 32;

/// Parses a `sha256=<hex>` header value into raw digest bytes.
///
/// Returns `None` for any other shape: missing prefix, a different
/// algorithm tag, or invalid hex.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_digest = header.strip_prefix("sha256=")?;
    hex::decode(hex_digest).ok()
}

/// Computes the HMAC-SHA256 digest of `payload` under `secret`. Used by
/// tests to build valid headers.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a digest as a provider-style header value, `sha256=<hex>`.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Verifies a webhook delivery against the raw, unparsed request body.
///
/// Fails closed: a missing header, an empty secret, a malformed header, or
/// a digest of the wrong length all return `false` without reaching the
/// constant-time comparison. The comparison itself goes through the HMAC
/// library's constant-time verify.
pub fn verify_signature(raw_body: &[u8], signature_header: Option<&str>, app_secret: &str) -> bool {
    let Some(header) = signature_header else {
        return false;
    };
    if app_secret.is_empty() {
        return false;
    }

    let Some(received) = parse_signature_header(header) else {
        return false;
    };
    // Length mismatch short-circuits before the constant-time compare.
    if received.len() != SHA256_DIGEST_LEN {
        return false;
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&received).is_ok()
}

#[cfg(test)]
mod tests {
    use super::{
        compute_signature, format_signature_header, parse_signature_header, verify_signature,
    };

    fn header_for(payload: &[u8], secret: &str) -> String {
        format_signature_header(&compute_signature(payload, secret.as_bytes()))
    }

    #[test]
    fn valid_signature_verifies() {
        let payload = br#"{"object":"instagram","entry":[]}"#;
        let header = header_for(payload, "app-secret");
        assert!(verify_signature(payload, Some(&header), "app-secret"));
    }

    #[test]
    fn flipping_a_body_byte_fails_verification() {
        let payload = b"please send demo info";
        let header = header_for(payload, "app-secret");
        assert!(!verify_signature(b"please send demo infO", Some(&header), "app-secret"));
    }

    #[test]
    fn flipping_a_header_byte_fails_verification() {
        let payload = b"payload";
        let mut header = header_for(payload, "app-secret");
        let tampered = if header.ends_with('0') { 'f' } else { '0' };
        header.pop();
        header.push(tampered);
        assert!(!verify_signature(payload, Some(&header), "app-secret"));
    }

    #[test]
    fn sha1_headers_always_fail() {
        let payload = b"payload";
        let digest = compute_signature(payload, b"app-secret");
        let header = format!("sha1={}", hex::encode(digest));
        assert!(!verify_signature(payload, Some(&header), "app-secret"));
    }

    #[test]
    fn missing_header_and_empty_secret_fail_closed() {
        let payload = b"payload";
        let header = header_for(payload, "");
        assert!(!verify_signature(payload, None, "app-secret"));
        assert!(!verify_signature(payload, Some(&header), ""));
    }

    #[test]
    fn truncated_digest_fails_before_comparison() {
        let payload = b"payload";
        let full = header_for(payload, "app-secret");
        let truncated = &full[..full.len() - 8];
        assert!(!verify_signature(payload, Some(truncated), "app-secret"));
    }

    #[test]
    fn malformed_headers_never_parse() {
        assert_eq!(parse_signature_header(""), None);
        assert_eq!(parse_signature_header("sha256=zz"), None);
        assert_eq!(parse_signature_header("abcdef"), None);
        assert_eq!(parse_signature_header("sha1=abcdef"), None);
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let payload = b"payload";
        let header = header_for(payload, "app-secret");
        assert!(!verify_signature(payload, Some(&header), "other-secret"));
    }
}
