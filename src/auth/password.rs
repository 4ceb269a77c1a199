//! Password hash verification
//!
//! Stored hashes are bcrypt (`$2a$`, `$2b$`, `$2y$`) or argon2 PHC strings
//! (`$argon2id$...`). A presented password is only ever compared by running
//! the stored hash's own algorithm over it; nothing shorter than the full
//! hash output takes part in the decision.

use super::AuthError;
use argon2::{
    password_hash::{
        self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2,
};

const ARGON2_ALGORITHMS: [&str; 3] = ["argon2id", "argon2i", "argon2d"];

/// Verify `password` against a stored hash
///
/// Returns `Ok(false)` on mismatch and an error when the stored hash is
/// malformed or of an unknown algorithm.
pub fn verify_password(password: &[u8], hash: &str) -> Result<bool, AuthError> {
    if password.is_empty() {
        return Err(AuthError::EmptyCredential);
    }

    if hash.starts_with("$argon2") {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AuthError::Hash(format!("invalid argon2 hash: {}", e)))?;
        if !ARGON2_ALGORITHMS.contains(&parsed.algorithm.as_str()) || parsed.hash.is_none() {
            return Err(AuthError::Hash("invalid argon2 hash: missing output".into()));
        }
        match Argon2::default().verify_password(password, &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::Hash(format!("invalid argon2 hash: {}", e))),
        }
    } else if hash.starts_with("$2") {
        bcrypt::verify(password, hash).map_err(|e| AuthError::Hash(e.to_string()))
    } else {
        Err(AuthError::Hash("unsupported hash format".into()))
    }
}

/// Hash a password with bcrypt at the given cost
pub fn hash_bcrypt(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost).map_err(|e| AuthError::Hash(e.to_string()))
}

/// Hash a password with argon2id and a random salt
pub fn hash_argon2(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}
