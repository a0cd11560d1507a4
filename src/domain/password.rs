//! Password value object.
//!
//! Every store adapter hashes through this type, so credentials are
//! salted Argon2 hashes no matter which backend persists them.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::config::MIN_PASSWORD_LENGTH;
use crate::errors::{AppError, AppResult};

/// Salted Argon2 hash ready for storage.
#[derive(Clone)]
pub struct Password {
    hash: String,
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

impl Password {
    /// Check the strength rule and hash `plain_text`.
    pub fn new(plain_text: &str) -> AppResult<Self> {
        Self::check_strength(plain_text)?;
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plain_text.as_bytes(), &salt)
            .map_err(|e| AppError::internal(format!("Password hash failed: {}", e)))?
            .to_string();
        Ok(Self { hash })
    }

    /// Reject passwords below the minimum length without hashing them.
    pub fn check_strength(plain_text: &str) -> AppResult<()> {
        if plain_text.chars().count() < MIN_PASSWORD_LENGTH as usize {
            return Err(AppError::validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        Ok(())
    }

    /// Wrap a hash loaded from a store.
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }

    pub fn into_string(self) -> String {
        self.hash
    }

    /// Malformed hashes, including legacy plaintext values, never verify.
    pub fn verify(&self, plain_text: &str) -> bool {
        PasswordHash::new(&self.hash).is_ok_and(|parsed| {
            Argon2::default()
                .verify_password(plain_text.as_bytes(), &parsed)
                .is_ok()
        })
    }
}

/// Hash used when the account does not exist, so a failed login costs the
/// same as a wrong password.
pub(crate) const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$ZHVtbXlzYWx0MTIzNDU2$4P1l4Xb0o2jV3m9tFJv7qfHkYHjJz6YqgcYrFz1N0yA";

/// Verify a password for a possibly missing user in constant-ish time.
pub(crate) fn verify_for(user_hash: Option<&str>, plain_text: &str) -> bool {
    let stored = Password::from_hash(user_hash.unwrap_or(DUMMY_HASH));
    let valid = stored.verify(plain_text);
    user_hash.is_some() && valid
}
