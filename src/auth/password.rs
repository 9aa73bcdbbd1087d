//! Password hashing and verification using Argon2
//!
//! Account passwords are stored as argon2id PHC strings in `userdatas`.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::IrrigationError;

/// Hash a password with a fresh salt, returning the PHC string
pub fn hash_password(password: &str) -> Result<String, IrrigationError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| IrrigationError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored hash
///
/// A malformed stored hash is an internal error, not a mismatch.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, IrrigationError> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| IrrigationError::Internal(format!("Stored password hash is malformed: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Check a login attempt, mapping a mismatch to `Auth("Invalid password")`
pub fn check_credentials(password: &str, stored: &str) -> Result<(), IrrigationError> {
    if verify_password(password, stored)? {
        Ok(())
    } else {
        Err(IrrigationError::Auth("Invalid password".into()))
    }
}
