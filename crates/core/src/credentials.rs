//! Salted password hashing for demo-grade login.
//!
//! Stored form: `sha256$<salt-hex>$<digest-hex>` where the digest covers `salt || password`.

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;
const GENERATED_SECRET_LEN: usize = 32;

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    hash_with_salt(password, &hex::encode(salt))
}

/// Random hex signing secret for processes started without a configured one.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; GENERATED_SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(scheme), Some(salt), Some(expected)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != SCHEME {
        return false;
    }

    let candidate = hash_with_salt(password, salt);
    let Some((_, actual)) = candidate.rsplit_once('$') else {
        return false;
    };
    actual.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn hash_with_salt(password: &str, salt_hex: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt_hex.as_bytes());
    hasher.update(password.as_bytes());
    format!("{SCHEME}${salt_hex}${}", hex::encode(hasher.finalize()))
}
