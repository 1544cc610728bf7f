//! Password credential verification

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use tracing::debug;

use super::types::AuthenticatedUser;
use crate::database::UserDatabase;
use crate::error::{Result, UserError};

/// Hash a plaintext password with argon2 and a fresh salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| UserError::PasswordHash(e.to_string()))?;

    Ok(hash.to_string())
}

/// Verify a plaintext password against the stored hash
pub fn verify_hash(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| UserError::PasswordHash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Verify a username/password pair against the principal database.
///
/// Returns `Ok(None)` for unknown usernames and wrong passwords alike;
/// the caller cannot distinguish the two cases.
pub async fn verify_password(
    db: &UserDatabase,
    username: &str,
    password: &str,
) -> Result<Option<AuthenticatedUser>> {
    let Some(stored_hash) = db.password_hash_for(username).await? else {
        debug!("Credential check for unknown username");
        return Ok(None);
    };

    if !verify_hash(password, &stored_hash)? {
        debug!("Credential check failed for username: {}", username);
        return Ok(None);
    }

    db.find_by_username(username).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("hunter2!").unwrap();
        assert!(verify_hash("hunter2!", &hash).unwrap());
        assert!(!verify_hash("hunter3!", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }
}
