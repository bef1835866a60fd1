use anyhow::{
    Error,
    Result,
};
use base64::Engine;
use hmac::Mac;

use crate::core::{
    error::ProtocolError,
    types::Dictionary,
};

/// Derives the signing key from a secret, as configured by the challenge.
///
/// Salted challenges use PBKDF2-HMAC-SHA256, and the key is the base64 encoding of the derived
/// bytes.
pub fn derive_key(secret: &str, salt: &str, iterations: u32, key_len: usize) -> String {
    let mut key = vec![0u8; key_len];
    pbkdf2::pbkdf2_hmac::<sha2::Sha256>(secret.as_bytes(), salt.as_bytes(), iterations, &mut key);
    base64::prelude::BASE64_STANDARD.encode(key)
}

/// Signs a challenge string with the given key.
pub fn sign(key: &[u8], challenge: &str) -> Result<String> {
    let mut mac = hmac::Hmac::<sha2::Sha256>::new_from_slice(key)
        .map_err(|err| Error::msg(format!("invalid signing key: {err}")))?;
    mac.update(challenge.as_bytes());
    Ok(base64::prelude::BASE64_STANDARD.encode(mac.finalize().into_bytes()))
}

/// Produces the AUTHENTICATE signature for a wampcra CHALLENGE.
pub fn sign_challenge(secret: &str, extra: &Dictionary) -> Result<String> {
    let challenge = extra
        .get("challenge")
        .and_then(|value| value.as_str())
        .ok_or_else(|| ProtocolError::new("wampcra challenge is missing the challenge string"))?;
    let key = match extra.get("salt").and_then(|value| value.as_str()) {
        Some(salt) => {
            let iterations = extra
                .get("iterations")
                .and_then(|value| value.as_integer())
                .and_then(|value| u32::try_from(value).ok())
                .ok_or_else(|| ProtocolError::new("salted wampcra challenge has no iterations"))?;
            let key_len = extra
                .get("keylen")
                .and_then(|value| value.as_integer())
                .and_then(|value| usize::try_from(value).ok())
                .ok_or_else(|| ProtocolError::new("salted wampcra challenge has no keylen"))?;
            derive_key(secret, salt, iterations, key_len)
        }
        None => secret.to_owned(),
    };
    sign(key.as_bytes(), challenge)
}
