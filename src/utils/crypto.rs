// Cryptographic utilities for generating secure tokens

use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;

/// Generate a cryptographically secure CSRF state token
///
/// 24 bytes (192 bits) of entropy from the OS-seeded thread RNG, comfortably
/// above the 128-bit floor required to make the token infeasible to guess.
/// Base64URL encoding keeps it safe to round-trip through the provider's
/// `state` query parameter.
///
/// # Returns
///
/// A base64url-encoded string representing 24 bytes of cryptographically
/// secure random data
#[must_use]
pub fn generate_state_token() -> String {
    let mut nonce = [0u8; 24]; // 192 bits of entropy
    rand::rng().fill_bytes(&mut nonce);
    general_purpose::URL_SAFE_NO_PAD.encode(nonce)
}

/// Constant-time byte-string equality
///
/// Used for CSRF state comparison so a mismatch position does not leak
/// through response timing. Length difference short-circuits; the lengths of
/// state tokens are public anyway.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
