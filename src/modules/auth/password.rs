use pbkdf2::pbkdf2;
use rand::Rng;
use std::io;
use std::num::NonZeroU32;
use thiserror::Error;

use crate::HmacSha256;

const HASH_SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Iteration count used when nothing else is configured
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Password strength failures reported to the inbound layer
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password must be at least 8 characters long")]
    TooShort,
    #[error("password must contain an uppercase letter")]
    NoUppercase,
    #[error("password must contain a lowercase letter")]
    NoLowercase,
    #[error("password must contain a number")]
    NoNumber,
    #[error("password must contain a special character")]
    NoSpecialChar,
}

/// One-way transformation of plaintext passwords into storable hashes
pub trait CredentialHasher {
    fn hash(&self, plaintext: &str) -> String;

    /// Check a plaintext against a hash produced by [`CredentialHasher::hash`]
    fn verify(&self, plaintext: &str, hash: &str) -> bool;
}

/// Salted PBKDF2-HMAC-SHA256.
///
/// Hashes are self-describing: `pbkdf2-sha256$<iterations>$<salt>$<key>`,
/// salt and key hex encoded, so changing the configured iteration count
/// does not invalidate stored hashes.
#[derive(Debug, Clone)]
pub struct Pbkdf2Hasher {
    iterations: NonZeroU32,
}

impl Pbkdf2Hasher {
    pub fn new(iterations: NonZeroU32) -> Self {
        Self { iterations }
    }

    /// Build from a raw count, falling back to the default for zero
    pub fn with_iterations(iterations: u32) -> Self {
        let iterations = NonZeroU32::new(iterations)
            .or_else(|| NonZeroU32::new(DEFAULT_ITERATIONS))
            .unwrap_or(NonZeroU32::MIN);
        Self { iterations }
    }
}

impl Default for Pbkdf2Hasher {
    fn default() -> Self {
        Self::with_iterations(DEFAULT_ITERATIONS)
    }
}

impl CredentialHasher for Pbkdf2Hasher {
    fn hash(&self, plaintext: &str) -> String {
        let salt = generate_random_salt();
        let key = derive_key(plaintext, &salt, self.iterations.get());
        format!(
            "{}${}${}${}",
            HASH_SCHEME,
            self.iterations,
            hex::encode(&salt),
            hex::encode(key)
        )
    }

    fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let mut parts = hash.split('$');
        let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return false;
        };

        if scheme != HASH_SCHEME {
            return false;
        }
        let Ok(iterations) = iterations.parse::<u32>() else {
            return false;
        };
        if iterations == 0 {
            return false;
        }
        let (Ok(salt), Ok(expected)) = (hex::decode(salt), hex::decode(expected)) else {
            return false;
        };
        if expected.len() != KEY_LEN {
            return false;
        }

        let actual = derive_key(plaintext, &salt, iterations);
        constant_time_eq(&actual, &expected)
    }
}

/// Generate a random salt for PBKDF2
fn generate_random_salt() -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..SALT_LEN).map(|_| rng.gen()).collect()
}

/// Derive a 32-byte key from the password using PBKDF2
fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut key = vec![0u8; KEY_LEN];
    pbkdf2::<HmacSha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Function to validate password strength
pub fn validate_password(password: &str) -> Result<(), PasswordError> {
    if password.chars().count() < 8 {
        return Err(PasswordError::TooShort);
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(PasswordError::NoUppercase);
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(PasswordError::NoLowercase);
    }
    if !password.chars().any(|c| c.is_numeric()) {
        return Err(PasswordError::NoNumber);
    }
    if !password
        .chars()
        .any(|c| "!@#$%^&*()_+-=[]{}|;:,.<>?".contains(c))
    {
        return Err(PasswordError::NoSpecialChar);
    }
    Ok(())
}

/// Helper function to read a password without echoing it
pub fn read_password() -> io::Result<String> {
    rpassword::read_password()
}
