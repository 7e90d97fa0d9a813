/// Role-based authorization checks
///
/// Routes declare the roles they accept; [`require_role`] is the check
/// behind the `restrict_to` middleware. [`require_owner_or_admin`] covers
/// resources a user may only change when they own them.
///
/// # Example
///
/// ```
/// use tourbook_shared::auth::authorization::require_role;
/// use tourbook_shared::models::user::Role;
///
/// const TOUR_MANAGERS: &[Role] = &[Role::Admin, Role::LeadGuide];
///
/// assert!(require_role(Role::LeadGuide, TOUR_MANAGERS).is_ok());
/// assert!(require_role(Role::Guide, TOUR_MANAGERS).is_err());
/// ```

use uuid::Uuid;

use crate::models::user::Role;

/// Error type for authorization checks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    /// Role not in the allowed set
    #[error("You do not have permission to perform this action")]
    RoleNotAllowed { role: Role },

    /// Caller neither owns the resource nor is an admin
    #[error("You can only modify your own {0}")]
    NotOwner(&'static str),
}

/// Allows the request only if `role` is one of `allowed`
pub fn require_role(role: Role, allowed: &[Role]) -> Result<(), AuthzError> {
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(AuthzError::RoleNotAllowed { role })
    }
}

/// Allows admins and the resource owner
pub fn require_owner_or_admin(
    user_id: Uuid,
    role: Role,
    owner_id: Uuid,
    resource: &'static str,
) -> Result<(), AuthzError> {
    if role == Role::Admin || user_id == owner_id {
        Ok(())
    } else {
        Err(AuthzError::NotOwner(resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_role() {
        assert!(require_role(Role::Admin, &[Role::Admin]).is_ok());
        assert!(require_role(Role::User, &[Role::User, Role::Admin]).is_ok());

        // authenticated, but not in the allowed set
        assert_eq!(
            require_role(Role::Admin, &[Role::User]),
            Err(AuthzError::RoleNotAllowed { role: Role::Admin })
        );
        assert!(require_role(Role::User, &[]).is_err());
    }

    #[test]
    fn test_require_owner_or_admin() {
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(require_owner_or_admin(owner, Role::User, owner, "review").is_ok());
        assert!(require_owner_or_admin(other, Role::Admin, owner, "review").is_ok());

        let err = require_owner_or_admin(other, Role::User, owner, "review").unwrap_err();
        assert_eq!(err.to_string(), "You can only modify your own review");
    }
}
