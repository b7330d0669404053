//! Anti-forgery nonces for the consent flow
//!
//! The `state` nonce ties a callback to the flow that produced the
//! authorization URL (CSRF protection). The PKCE verifier/challenge pair
//! (RFC 7636, S256) additionally binds the code exchange to this process, so
//! an intercepted authorization code is useless on its own.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Random `state` value for one authorization attempt.
///
/// 32 random bytes, URL-safe base64 without padding (43 characters).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Random PKCE code verifier.
///
/// 64 random bytes encode to 86 characters, inside RFC 7636's 43-128 range.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

fn is_url_safe(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Constant-shape comparison of the returned `state` with the expected one.
pub fn state_matches(expected: &str, received: Option<&str>) -> bool {
    match received {
        Some(received) if is_url_safe(received) => {
            let (a, b) = (expected.as_bytes(), received.as_bytes());
            a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
        }
        _ => false,
    }
}
