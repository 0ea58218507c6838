//! Provider secret bootstrap.
//!
//! The secret identifies this bridge instance to lichess independently of
//! any user's bearer token. It is generated once and then reused for the
//! life of the installation.

use anyhow::Result;
use rand::RngExt;

use crate::consts::SECRET_KEY;
use crate::store::Store;

/// Return the persisted provider secret, generating and storing one on
/// first run. Never regenerates an existing value.
pub fn ensure_secret(store: &Store) -> Result<String> {
    if let Some(secret) = store.get(SECRET_KEY)? {
        return Ok(secret);
    }

    let mut rng = rand::rng();
    let bytes: [u8; 64] = rng.random();
    let secret = hex::encode_upper(bytes);
    store.set(SECRET_KEY, &secret)?;
    Ok(secret)
}
