/// Authentication and authorization utilities
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and the password policy
/// - [`jwt`]: HS256 session tokens
/// - [`authorization`]: role restriction and ownership checks
///
/// # Example
///
/// ```no_run
/// use tourbook_shared::auth::password::{hash_password, verify_password};
/// use tourbook_shared::auth::jwt::{create_token, Claims};
/// use chrono::Duration;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Sup3r$ecret")?;
/// assert!(verify_password("Sup3r$ecret", &hash)?);
///
/// let claims = Claims::new(Uuid::new_v4(), Duration::days(90));
/// let token = create_token(&claims, "secret-key-with-at-least-32-bytes!")?;
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod password;
