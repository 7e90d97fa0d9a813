/// User model
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY,
///     name VARCHAR(255) NOT NULL,
///     email VARCHAR(255) NOT NULL,
///     photo VARCHAR(255) NOT NULL DEFAULT 'default.jpg',
///     role TEXT NOT NULL DEFAULT 'user',
///     password_hash TEXT NOT NULL,
///     password_changed_at TIMESTAMPTZ,
///     active BOOLEAN NOT NULL DEFAULT TRUE,
///     created_at TIMESTAMPTZ NOT NULL,
///     updated_at TIMESTAMPTZ NOT NULL,
///     CONSTRAINT users_email_key UNIQUE (email)
/// );
/// ```
///
/// Emails are stored lowercase. The password hash and password change
/// timestamp never appear in serialized output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::Postgres;
use sqlx::query_builder::Separated;
use uuid::Uuid;
use validator::Validate;

use crate::query::{Column, ColumnKind};
use crate::repository::{Entity, PgEntity, UniqueKey};

/// Photo assigned to users who haven't uploaded one
pub const DEFAULT_PHOTO: &str = "default.jpg";

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[default]
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User account
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    pub name: String,

    /// Lowercased, unique
    pub email: String,

    /// Photo file name
    pub photo: String,

    pub role: Role,

    /// Argon2id hash
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Set whenever the password changes; tokens issued earlier are rejected
    #[serde(skip_serializing)]
    pub password_changed_at: Option<DateTime<Utc>>,

    /// `false` once the user deactivates their account
    pub active: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub photo: Option<String>,
    pub role: Role,

    /// Argon2id password hash (NOT plaintext password!)
    pub password_hash: String,
}

/// Partial update for a user
///
/// The password fields are never read from request bodies; they are set
/// only by the password change flow.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(length(min = 1, max = 255, message = "Name must not be empty"))]
    pub name: Option<String>,

    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,

    pub photo: Option<String>,

    pub role: Option<Role>,

    pub active: Option<bool>,

    #[serde(skip_deserializing)]
    pub password_hash: Option<String>,

    #[serde(skip_deserializing)]
    pub password_changed_at: Option<DateTime<Utc>>,
}

/// Normalizes an email address for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    /// Whether the password changed after a token issued at `issued_at`
    /// (seconds since the epoch)
    pub fn changed_password_after(&self, issued_at: i64) -> bool {
        self.password_changed_at
            .map(|changed| changed.timestamp() > issued_at)
            .unwrap_or(false)
    }
}

impl Entity for User {
    type Create = CreateUser;
    type Patch = UpdateUser;

    const NAME: &'static str = "user";
    const TABLE: &'static str = "users";

    const COLUMNS: &'static [Column] = &[
        Column::new("id", ColumnKind::Uuid),
        Column::new("name", ColumnKind::Text),
        Column::new("email", ColumnKind::Text),
        Column::new("photo", ColumnKind::Text),
        Column::new("role", ColumnKind::Text),
        Column::new("active", ColumnKind::Bool),
        Column::new("created_at", ColumnKind::Timestamp),
        Column::new("updated_at", ColumnKind::Timestamp),
    ];

    const UNIQUE_KEYS: &'static [UniqueKey] = &[UniqueKey {
        constraint: "users_email_key",
        fields: &["email"],
    }];

    fn id(&self) -> Uuid {
        self.id
    }

    fn build(data: CreateUser, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: data.name.trim().to_string(),
            email: normalize_email(&data.email),
            photo: data.photo.unwrap_or_else(|| DEFAULT_PHOTO.to_string()),
            role: data.role,
            password_hash: data.password_hash,
            password_changed_at: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, patch: UpdateUser, now: DateTime<Utc>) {
        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(email) = patch.email {
            self.email = normalize_email(&email);
        }
        if let Some(photo) = patch.photo {
            self.photo = photo;
        }
        if let Some(role) = patch.role {
            self.role = role;
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        if let Some(password_hash) = patch.password_hash {
            self.password_hash = password_hash;
        }
        if let Some(changed_at) = patch.password_changed_at {
            self.password_changed_at = Some(changed_at);
        }
        self.updated_at = now;
    }
}

impl PgEntity for User {
    const FIELDS: &'static [&'static str] = &[
        "id",
        "name",
        "email",
        "photo",
        "role",
        "password_hash",
        "password_changed_at",
        "active",
        "created_at",
        "updated_at",
    ];

    fn push_values(&self, values: &mut Separated<'_, '_, Postgres, &'static str>) {
        values
            .push_bind(self.id)
            .push_bind(self.name.clone())
            .push_bind(self.email.clone())
            .push_bind(self.photo.clone())
            .push_bind(self.role)
            .push_bind(self.password_hash.clone())
            .push_bind(self.password_changed_at)
            .push_bind(self.active)
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_user() -> CreateUser {
        CreateUser {
            name: " Laura Wilson ".to_string(),
            email: "Laura@Example.COM".to_string(),
            photo: None,
            role: Role::User,
            password_hash: "$argon2id$v=19$stub".to_string(),
        }
    }

    #[test]
    fn test_build_normalizes_and_defaults() {
        let now = Utc::now();
        let user = User::build(create_user(), now);

        assert_eq!(user.name, "Laura Wilson");
        assert_eq!(user.email, "laura@example.com");
        assert_eq!(user.photo, DEFAULT_PHOTO);
        assert!(user.active);
        assert!(user.password_changed_at.is_none());
        assert_eq!(user.created_at, now);
    }

    #[test]
    fn test_serialization_hides_password_fields() {
        let user = User::build(create_user(), Utc::now());
        let json = serde_json::to_value(&user).unwrap();

        assert!(json.get("password_hash").is_none());
        assert!(json.get("password_changed_at").is_none());
        assert_eq!(json["role"], "user");
        assert_eq!(json["active"], true);
    }

    #[test]
    fn test_role_serde_uses_kebab_case() {
        assert_eq!(serde_json::to_string(&Role::LeadGuide).unwrap(), "\"lead-guide\"");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
        assert_eq!(Role::Guide.to_string(), "guide");
    }

    #[test]
    fn test_update_body_cannot_set_password() {
        let patch: UpdateUser = serde_json::from_str(
            r#"{"name":"New","password_hash":"x","password_changed_at":"2025-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(patch.name.as_deref(), Some("New"));
        assert!(patch.password_hash.is_none());
        assert!(patch.password_changed_at.is_none());
    }

    #[test]
    fn test_changed_password_after() {
        let mut user = User::build(create_user(), Utc::now());
        let issued_at = Utc::now().timestamp();
        assert!(!user.changed_password_after(issued_at));

        let later = Utc::now() + Duration::seconds(10);
        user.apply(
            UpdateUser {
                password_hash: Some("new".to_string()),
                password_changed_at: Some(later),
                ..Default::default()
            },
            later,
        );
        assert!(user.changed_password_after(issued_at));
        assert_eq!(user.password_hash, "new");
        assert!(!user.changed_password_after(later.timestamp() + 1));
    }
}
