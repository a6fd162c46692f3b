//! PKCE material and provider reference generation.
//!
//! The code verifier/challenge pair follows RFC 7636: a high-entropy
//! verifier kept server-side per tenant, and its S256 challenge sent in the
//! authorization URL.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

/// Alphabet used for idempotency keys and external references.
const REFERENCE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Generate a fresh PKCE code verifier: 64 random bytes from the OS CSPRNG,
/// base64 URL-safe encoded without padding.
pub fn generate_code_verifier() -> String {
    let mut bytes = [0u8; 64];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Derive the S256 code challenge for a verifier.
///
/// Deterministic: base64-url-nopad of the SHA-256 digest of the verifier's
/// ASCII bytes.
pub fn derive_code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Generate a random reference over `[A-Za-z0-9_-]`.
///
/// Used for order idempotency keys and external references (64 chars at
/// call sites), so a retried provider request never creates a duplicate.
pub fn generate_reference(len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..REFERENCE_ALPHABET.len());
            REFERENCE_ALPHABET[idx] as char
        })
        .collect()
}
