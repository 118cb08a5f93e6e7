use anyhow::{Result, anyhow};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use sha2::{Digest, Sha256};

/// Hash a credential with Argon2id and a fresh salt, in PHC string format.
pub fn hash_credential(credential: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(credential.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("hashing credential: {e}"))
}

/// Check `credential` against a PHC string from [`hash_credential`].
/// A malformed stored hash never verifies.
pub fn verify_credential(credential: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .is_ok_and(|hash| Argon2::default().verify_password(credential.as_bytes(), &hash).is_ok())
}

/// The part of a `user:password` credential that stored hashes are looked up by.
/// Credentials without a user part share the empty identity.
pub fn credential_identity(credential: &str) -> &str {
    credential.split_once(':').map_or("", |(user, _)| user)
}

/// Hex SHA-256 of a credential. Deterministic, so it can key in-memory
/// lookups; never stored.
pub fn credential_digest(credential: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credential.as_bytes());
    hex::encode(hasher.finalize())
}
