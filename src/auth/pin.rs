//! PIN hashing.
//!
//! Stored form is `hex(salt):hex(key)` with PBKDF2-HMAC-SHA1. Existing
//! records in the remote store use exactly these parameters, so they cannot
//! change without a migration.

use rand::RngCore;
use sha1::Sha1;
use subtle::ConstantTimeEq;

const ITERATIONS: u32 = 10_000;
const KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;

/// Hash a PIN with a fresh random salt.
pub fn hash_pin(pin: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    hash_with_salt(pin, &salt)
}

/// Check a PIN against a stored hash. Malformed hashes never verify.
pub fn verify_pin(pin: &str, stored: &str) -> bool {
    let Some((salt_hex, key_hex)) = stored.trim().split_once(':') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(key_hex)) else {
        return false;
    };
    if salt.is_empty() || expected.len() != KEY_LEN {
        return false;
    }

    let derived = derive_key(pin, &salt);
    constant_time_compare(&derived, &expected)
}

fn hash_with_salt(pin: &str, salt: &[u8]) -> String {
    let key = derive_key(pin, salt);
    format!("{}:{}", hex::encode(salt), hex::encode(key))
}

fn derive_key(pin: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha1>(pin.as_bytes(), salt, ITERATIONS, &mut key);
    key
}

/// Perform constant-time byte comparison.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
