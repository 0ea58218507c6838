//! PKCE primitives: random URL-safe tokens and the S256 challenge.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngExt;
use sha2::{Digest, Sha256};

/// The URL-safe base64 alphabet, also used directly for random tokens.
const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Length of `state` and `verifier` tokens in characters.
pub const TOKEN_LEN: usize = 128;

/// Generate a 128-character random string over the URL-safe alphabet.
/// Used for both the OAuth `state` and the PKCE verifier.
pub fn random_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; TOKEN_LEN] = rng.random();
    bytes
        .iter()
        .map(|byte| ALPHABET[(byte % 64) as usize] as char)
        .collect()
}

/// S256 code challenge: base64url (no padding) of SHA-256 of the verifier.
pub fn challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
