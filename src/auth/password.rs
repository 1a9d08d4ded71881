//! One-way hashing of principal secrets with Argon2id.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

#[derive(thiserror::Error, Debug)]
pub enum PasswordError {
    #[error("failed to hash secret: {0}")]
    HashingFailed(String),

    #[error("failed to verify secret: {0}")]
    VerificationFailed(String),

    #[error("invalid secret hash format: {0}")]
    InvalidHashFormat(String),
}

/// Hash a secret into a PHC string suitable for storage, using a random salt.
///
/// # Errors
///
/// Returns [`PasswordError::HashingFailed`] if hashing fails.
pub fn hash_secret(secret: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
}

/// Check a secret against a stored PHC hash.
///
/// # Errors
///
/// Returns [`PasswordError::InvalidHashFormat`] if `hash` isn't a PHC string and
/// [`PasswordError::VerificationFailed`] if verification fails for a reason other than a
/// mismatch.
pub fn verify_secret(secret: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed =
        PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHashFormat(e.to_string()))?;
    match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
    }
}

/// Check that `hash` is a PHC string, without verifying anything against it.
///
/// # Errors
///
/// Returns [`PasswordError::InvalidHashFormat`] if it isn't.
pub fn check_hash_format(hash: &str) -> Result<(), PasswordError> {
    PasswordHash::new(hash)
        .map(|_| ())
        .map_err(|e| PasswordError::InvalidHashFormat(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_salted_argon2id() {
        let first = hash_secret("s3cret").unwrap();
        let second = hash_secret("s3cret").unwrap();
        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);
    }

    #[test]
    fn verifies_matching_secret_only() {
        let hash = hash_secret("s3cret").unwrap();
        assert!(verify_secret("s3cret", &hash).unwrap());
        assert!(!verify_secret("S3cret", &hash).unwrap());
    }

    #[test]
    fn rejects_malformed_hash() {
        assert!(matches!(
            verify_secret("s3cret", "plaintext"),
            Err(PasswordError::InvalidHashFormat(_))
        ));
        assert!(check_hash_format("plaintext").is_err());
        assert!(check_hash_format(&hash_secret("s3cret").unwrap()).is_ok());
    }
}
