/// Password hashing using Argon2id
///
/// Parameters: 64 MB memory, 3 passes, 4 lanes, 32-byte output. Hashes are
/// stored in PHC string format, so verification reads the parameters back
/// from the stored hash.
///
/// # Example
///
/// ```
/// use tourbook_shared::auth::password::{hash_password, verify_password};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Tr4vel!ng")?;
/// assert!(verify_password("Tr4vel!ng", &hash)?);
/// assert!(!verify_password("wrong", &hash)?);
/// # Ok(())
/// # }
/// ```

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder, Version,
};

/// Minimum password length in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Error type for password operations
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashError(String),

    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),

    /// Password fails the strength policy
    #[error("{0}")]
    TooWeak(String),

    /// Password and confirmation differ
    #[error("Passwords are not the same")]
    Mismatch,
}

/// Hashes a password with Argon2id (m=65536, t=3, p=4)
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let params = ParamsBuilder::new()
        .m_cost(65536)
        .t_cost(3)
        .p_cost(4)
        .output_len(32)
        .build()
        .map_err(|e| PasswordError::HashError(format!("Invalid parameters: {}", e)))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashError(format!("Hash generation failed: {}", e)))?;

    Ok(password_hash.to_string())
}

/// Verifies a password against a PHC hash in constant time
///
/// `Ok(false)` for a wrong password; `Err` only when the hash is unusable.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| PasswordError::InvalidHash(format!("Failed to parse hash: {}", e)))?;
    if parsed_hash.hash.is_none() {
        return Err(PasswordError::InvalidHash("Hash has no output".to_string()));
    }

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(format!("Verification failed: {}", e))),
    }
}

/// Checks the password policy: at least 8 characters with an uppercase
/// letter, a lowercase letter, a digit and a special character
///
/// ```
/// use tourbook_shared::auth::password::validate_password_strength;
///
/// assert!(validate_password_strength("MyP@ssw0rd!").is_ok());
/// assert!(validate_password_strength("Password123").is_err());
/// ```
pub fn validate_password_strength(password: &str) -> Result<(), PasswordError> {
    let weak = |msg: &str| Err(PasswordError::TooWeak(msg.to_string()));

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return weak("Password must be at least 8 characters long");
    }
    if !password.chars().any(char::is_uppercase) {
        return weak("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(char::is_lowercase) {
        return weak("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(char::is_numeric) {
        return weak("Password must contain at least one digit");
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return weak("Password must contain at least one special character");
    }

    Ok(())
}

/// Validates a new password and its confirmation
pub fn validate_new_password(password: &str, confirm: &str) -> Result<(), PasswordError> {
    if password != confirm {
        return Err(PasswordError::Mismatch);
    }

    validate_password_strength(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password() {
        let hash = hash_password("test_password_123").expect("Hash should succeed");

        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("v=19"));
        assert!(hash.contains("m=65536"));
        assert!(hash.contains("t=3"));
        assert!(hash.contains("p=4"));
    }

    #[test]
    fn test_hash_password_produces_different_salts() {
        let hash1 = hash_password("same_password").expect("Hash 1 should succeed");
        let hash2 = hash_password("same_password").expect("Hash 2 should succeed");
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password("correct_password").expect("Hash should succeed");

        assert!(verify_password("correct_password", &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
        assert!(!verify_password("", &hash).unwrap());
    }

    #[test]
    fn test_verify_password_invalid_hash() {
        assert!(verify_password("password", "invalid_hash").is_err());
        assert!(verify_password("password", "$argon2id$invalid").is_err());
    }

    #[test]
    fn test_verify_password_hash_without_output() {
        let err = verify_password("password", "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHQ")
            .unwrap_err();
        assert!(matches!(err, PasswordError::InvalidHash(_)));
    }

    #[test]
    fn test_validate_password_strength() {
        for password in ["MyP@ssw0rd!", "Str0ng!Pass", "C0mpl3x#Pwd"] {
            assert!(
                validate_password_strength(password).is_ok(),
                "Password '{}' should be valid",
                password
            );
        }

        let cases = [
            ("Sh0rt!", "at least 8 characters"),
            ("lowercase1!", "uppercase letter"),
            ("UPPERCASE1!", "lowercase letter"),
            ("NoDigits!", "digit"),
            ("NoSpecial123", "special character"),
        ];
        for (password, expected) in cases {
            let err = validate_password_strength(password).unwrap_err();
            assert!(err.to_string().contains(expected), "{}: {}", password, err);
        }
    }

    #[test]
    fn test_validate_new_password() {
        assert!(validate_new_password("MyP@ssw0rd!", "MyP@ssw0rd!").is_ok());
        assert!(matches!(
            validate_new_password("MyP@ssw0rd!", "MyP@ssw0rd?"),
            Err(PasswordError::Mismatch)
        ));
        assert!(matches!(
            validate_new_password("weak", "weak"),
            Err(PasswordError::TooWeak(_))
        ));
    }
}
