//! Argon2id password hashing.

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use rand::rngs::OsRng;

use crate::config::{Argon2Config, PasswordConfig};
use crate::error::{AppError, AppResult};

fn hasher(config: &Argon2Config) -> AppResult<Argon2<'static>> {
    let params = Params::new(
        config.memory_cost,
        config.time_cost,
        config.parallelism,
        None,
    )
    .map_err(|e| AppError::PasswordHash(format!("Invalid Argon2 parameters: {}", e)))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Check a candidate password against the configured length bounds.
pub fn validate_password(password: &str, config: &PasswordConfig) -> AppResult<()> {
    let length = password.chars().count();
    if length < config.min_length {
        return Err(AppError::validation(
            "password",
            format!(
                "Password must be at least {} characters long",
                config.min_length
            ),
        ));
    }
    if length > config.max_length {
        return Err(AppError::validation(
            "password",
            format!(
                "Password must be at most {} characters long",
                config.max_length
            ),
        ));
    }
    Ok(())
}

/// Hash a plaintext password with Argon2id using a random salt.
pub fn hash_password(password: &str, config: &Argon2Config) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = hasher(config)?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::PasswordHash(format!("Failed to hash password: {}", e)))?;

    Ok(password_hash.to_string())
}

/// Verify a plaintext password against an Argon2 hash string.
///
/// The parameters are read from the hash itself, so hashes made under older
/// settings keep verifying.
pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::PasswordHash(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Argon2Config {
        Argon2Config {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("hunter22", &fast()).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }

    #[test]
    fn test_garbage_hash_is_an_error() {
        assert!(verify_password("x", "not-a-hash").is_err());
    }

    #[test]
    fn test_length_bounds() {
        let config = PasswordConfig::default();
        assert!(validate_password("12345", &config).is_err());
        assert!(validate_password("123456", &config).is_ok());
        assert!(validate_password(&"a".repeat(129), &config).is_err());
    }
}
