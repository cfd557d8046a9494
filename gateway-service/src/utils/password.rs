use argon2::{
    password_hash::{
        rand_core::OsRng, Error as PasswordHashError, PasswordHash,
        PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Argon2,
};

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Password hashing capability used by login, reset and registration.
pub trait PasswordHasher: Send + Sync {
    /// Produce a self-describing PHC hash string with a fresh salt.
    fn hash(&self, password: &Password) -> Result<String, anyhow::Error>;

    /// Ok(false) on mismatch; Err only when the stored hash is unusable.
    fn verify(&self, password: &Password, hash: &str) -> Result<bool, anyhow::Error>;
}

/// Argon2id with the crate's default parameters.
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &Password) -> Result<String, anyhow::Error> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = Argon2::default()
            .hash_password(password.as_str().as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();

        Ok(password_hash)
    }

    fn verify(&self, password: &Password, hash: &str) -> Result<bool, anyhow::Error> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

        // argon2 compares digests in constant time
        match Argon2::default().verify_password(password.as_str().as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(PasswordHashError::Password) => Ok(false),
            Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = Argon2Hasher.hash(&password).expect("Failed to hash password");

        assert!(hash.starts_with("$argon2"));
    }

    #[test]
    fn test_verify_password_correct() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = Argon2Hasher.hash(&password).expect("Failed to hash password");

        assert!(Argon2Hasher.verify(&password, &hash).unwrap());
    }

    #[test]
    fn test_verify_password_incorrect() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = Argon2Hasher.hash(&password).expect("Failed to hash password");

        let wrong_password = Password::new("wrongPassword".to_string());
        assert!(!Argon2Hasher.verify(&wrong_password, &hash).unwrap());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash1 = Argon2Hasher.hash(&password).expect("Failed to hash password");
        let hash2 = Argon2Hasher.hash(&password).expect("Failed to hash password");

        assert_ne!(hash1, hash2);
        assert!(Argon2Hasher.verify(&password, &hash1).unwrap());
        assert!(Argon2Hasher.verify(&password, &hash2).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        let password = Password::new("whatever".to_string());
        assert!(Argon2Hasher.verify(&password, "not-a-phc-string").is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let password = Password::new("hunter2hunter2".to_string());
        assert_eq!(format!("{:?}", password), "Password(***)");
    }
}
