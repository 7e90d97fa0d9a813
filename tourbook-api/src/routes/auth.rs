/// Authentication endpoints
///
/// Signup, login and logout are public; the remaining endpoints run behind
/// `protect` and act on the current user.
///
/// # Endpoints
///
/// - `POST /api/v1/users/signup` - Create an account (role is always `user`)
/// - `POST /api/v1/users/login` - Exchange credentials for a session token
/// - `GET /api/v1/users/logout` - Overwrite the session cookie
/// - `PATCH /api/v1/users/update-my-password` - Change password, re-issue token
/// - `GET /api/v1/users/me` - Current user
/// - `PATCH /api/v1/users/update-me` - Change name, email or photo
/// - `DELETE /api/v1/users/delete-me` - Deactivate the account
///
/// Signup, login and password changes answer with
/// `{"status": "success", "token": ..., "data": {"user": ...}}` and set an
/// HttpOnly `jwt` cookie holding the same token.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tourbook_shared::{
    auth::{jwt, password},
    models::user::{normalize_email, CreateUser, Role, UpdateUser, User},
    query::{Filter, FilterValue},
};
use tracing::info;
use validator::Validate;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extractors::{extract_json, extract_validated_json},
    middleware::auth::{session_cookie, CurrentUser},
    routes::factory::success,
};

/// Signup request
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 255, message = "Please tell us your name!"))]
    pub name: String,

    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,

    pub password: String,

    pub password_confirm: String,
}

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub password: String,
}

/// Password change request
#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub password_current: String,
    pub password: String,
    pub password_confirm: String,
}

/// Fields a user may change about themselves
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateMeRequest {
    #[validate(length(min = 1, max = 255, message = "Name must not be empty"))]
    pub name: Option<String>,

    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,

    #[validate(length(min = 1, message = "Photo must not be empty"))]
    pub photo: Option<String>,
}

const PASSWORD_FIELDS: &[&str] = &["password", "password_confirm", "password_current"];

fn session_header(state: &AppState, value: &str, max_age_secs: i64) -> ApiResult<HeaderValue> {
    let cookie = session_cookie(value, max_age_secs, state.config.api.production);

    HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| ApiError::InternalError(format!("Invalid cookie value: {}", e)))
}

/// Issues a token for `user` and builds the session response
fn send_token(state: &AppState, user: &User, status: StatusCode) -> ApiResult<Response> {
    let jwt_config = &state.config.jwt;
    let claims = jwt::Claims::new(user.id, Duration::days(jwt_config.expires_in_days));
    let token = jwt::create_token(&claims, &jwt_config.secret)?;

    let cookie = session_header(
        state,
        &token,
        Duration::days(jwt_config.cookie_expires_in_days).num_seconds(),
    )?;

    let body = json!({
        "status": "success",
        "token": token,
        "data": { "user": user },
    });

    Ok((status, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

async fn find_active_by_email(state: &AppState, email: &str) -> ApiResult<Option<User>> {
    Ok(state
        .repos
        .users
        .find_first(vec![
            Filter::eq("email", FilterValue::Text(normalize_email(email))),
            Filter::eq("active", FilterValue::Bool(true)),
        ])
        .await?)
}

/// Signup endpoint
///
/// # Errors
///
/// - `409 Conflict`: email already exists
/// - `422 Unprocessable Entity`: invalid fields, weak or unconfirmed password
pub async fn signup(
    State(state): State<AppState>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let req = extract_validated_json(body)?;
    password::validate_new_password(&req.password, &req.password_confirm)?;

    let password_hash = password::hash_password(&req.password)?;

    let user = state
        .repos
        .users
        .insert(CreateUser {
            name: req.name,
            email: req.email,
            photo: None,
            role: Role::User,
            password_hash,
        })
        .await?;

    info!(user_id = %user.id, "User signed up");
    send_token(&state, &user, StatusCode::CREATED)
}

/// Login endpoint
///
/// # Errors
///
/// - `400 Bad Request`: email or password missing
/// - `401 Unauthorized`: unknown email, inactive user or wrong password
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let req = extract_json(body)?;
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Please provide email and password!".to_string(),
        ));
    }

    let invalid = || ApiError::Unauthorized("Incorrect email or password".to_string());

    let user = find_active_by_email(&state, &req.email)
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        return Err(invalid());
    }

    send_token(&state, &user, StatusCode::OK)
}

/// Logout endpoint
///
/// Replaces the session cookie with a short-lived placeholder.
pub async fn logout(State(state): State<AppState>) -> ApiResult<Response> {
    let cookie = session_header(&state, "loggedout", 10)?;
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "status": "success" })),
    )
        .into_response())
}

/// Password change endpoint
///
/// Tokens issued before the change stop working; the response carries a
/// fresh one.
pub async fn update_my_password(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    body: Result<Json<UpdatePasswordRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let req = extract_json(body)?;

    if !password::verify_password(&req.password_current, &user.password_hash)? {
        return Err(ApiError::Unauthorized(
            "Your current password is wrong.".to_string(),
        ));
    }
    password::validate_new_password(&req.password, &req.password_confirm)?;

    // One second back so the token issued below is not older than the change
    let changed_at = Utc::now() - Duration::seconds(1);

    let patch = UpdateUser {
        password_hash: Some(password::hash_password(&req.password)?),
        password_changed_at: Some(changed_at),
        ..Default::default()
    };
    let updated = state
        .repos
        .users
        .update(user.id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("No user found with that ID".to_string()))?;

    info!(user_id = %updated.id, "Password changed");
    send_token(&state, &updated, StatusCode::OK)
}

/// Current user
pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<Value> {
    success(user)
}

/// Updates the current user's profile
///
/// Only name, email and photo are applied; other fields are ignored.
///
/// # Errors
///
/// - `400 Bad Request`: body contains password fields
/// - `409 Conflict`: email already taken
pub async fn update_me(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let fields = extract_json(body)?;

    if PASSWORD_FIELDS.iter().any(|f| fields.contains_key(*f)) {
        return Err(ApiError::BadRequest(
            "This route is not for password updates. Please use /update-my-password.".to_string(),
        ));
    }

    let req: UpdateMeRequest = serde_json::from_value(Value::Object(fields))
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?;
    req.validate()?;

    let patch = UpdateUser {
        name: req.name,
        email: req.email,
        photo: req.photo,
        ..Default::default()
    };
    let updated = state
        .repos
        .users
        .update(user.id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("No user found with that ID".to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "data": { "user": updated },
    })))
}

/// Deactivates the current user
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<StatusCode> {
    let patch = UpdateUser {
        active: Some(false),
        ..Default::default()
    };
    state.repos.users.update(user.id, patch).await?;

    info!(user_id = %user.id, "User deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_me_ignores_unknown_fields() {
        let req: UpdateMeRequest =
            serde_json::from_value(json!({ "name": "Leo", "role": "admin" })).unwrap();
        assert_eq!(req.name.as_deref(), Some("Leo"));
        assert!(req.email.is_none());
    }

    #[test]
    fn test_signup_request_validation() {
        let req = SignupRequest {
            name: String::new(),
            email: "not-an-email".to_string(),
            password: "P@ssw0rd!".to_string(),
            password_confirm: "P@ssw0rd!".to_string(),
        };
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("email"));
    }
}
