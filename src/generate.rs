//! Credential generators.
//!
//! All values come from the operating system's CSPRNG ([`OsRng`]). If the OS
//! source cannot be read, `OsRng` panics and the process aborts; there is no
//! fallback to a weaker generator.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

/// Width of the random part of an API key, in bytes (64 hex characters).
pub const API_KEY_BYTES: usize = 32;

/// Generates a password of exactly `length` characters from `[A-Za-z0-9]`.
///
/// The alphabet excludes every separator and reserved character, so the value
/// is safe inside connection strings, URLs and shell variables.
///
/// # Example
///
/// ```
/// use keyrotor::generate::generate_password;
///
/// let password = generate_password(25);
/// assert_eq!(password.len(), 25);
/// assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
/// ```
pub fn generate_password(length: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Generates `bytes` random bytes and returns them hex-encoded.
pub fn generate_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Generates an API key of the form `<prefix>_<64 hex chars>`.
///
/// # Example
///
/// ```
/// use keyrotor::generate::generate_api_key;
///
/// let key = generate_api_key("n8n");
/// assert!(key.starts_with("n8n_"));
/// assert_eq!(key.len(), "n8n_".len() + 64);
/// ```
pub fn generate_api_key(prefix: &str) -> String {
    format!("{}_{}", prefix, generate_hex(API_KEY_BYTES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_password_length_and_alphabet() {
        for n in 1..=64 {
            for _ in 0..8 {
                let password = generate_password(n);
                assert_eq!(password.chars().count(), n);
                assert!(
                    password.chars().all(|c| c.is_ascii_alphanumeric()),
                    "unexpected character in {:?}",
                    password
                );
            }
        }
    }

    #[test]
    fn test_password_zero_length() {
        assert_eq!(generate_password(0), "");
    }

    #[test]
    fn test_passwords_do_not_repeat() {
        let sample: HashSet<String> = (0..10_000).map(|_| generate_password(32)).collect();
        assert_eq!(sample.len(), 10_000);
    }

    #[test]
    fn test_api_key_format() {
        let key = generate_api_key("whk");
        let (prefix, random) = key.split_once('_').unwrap();
        assert_eq!(prefix, "whk");
        assert_eq!(random.len(), 64);
        assert!(random.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_api_keys_differ() {
        assert_ne!(generate_api_key("n8n"), generate_api_key("n8n"));
    }

    #[test]
    fn test_generate_hex() {
        let value = generate_hex(16);
        assert_eq!(value.len(), 32);
        assert!(hex::decode(&value).is_ok());
    }
}
