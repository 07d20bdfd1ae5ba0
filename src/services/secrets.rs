use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use secrecy::SecretString;

const APP_KEY_BYTES: usize = 32;
const HASHIDS_SALT_LENGTH: usize = 20;

/// Alphanumeric password of exactly `length` characters.
pub fn generate_password(length: usize) -> SecretString {
    let password: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    SecretString::from(password)
}

/// Application encryption key in the `base64:` form the panel expects.
pub fn generate_app_key() -> SecretString {
    let mut key = [0u8; APP_KEY_BYTES];
    OsRng.fill_bytes(&mut key);
    SecretString::from(format!("base64:{}", STANDARD.encode(key)))
}

pub fn generate_hashids_salt() -> SecretString {
    generate_password(HASHIDS_SALT_LENGTH)
}
