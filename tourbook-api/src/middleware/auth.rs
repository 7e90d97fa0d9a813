/// Authentication and role middleware
///
/// [`protect`] resolves the session token (Bearer header first, then the
/// `jwt` cookie) to an active user and stores it as a [`CurrentUser`]
/// request extension. [`restrict_to`] must run after it and rejects users
/// whose role isn't listed.
///
/// # Example
///
/// ```no_run
/// use axum::{middleware, routing::get, Router};
/// use tourbook_api::{app::AppState, middleware::auth};
/// use tourbook_shared::models::user::Role;
///
/// fn admin_routes(state: AppState) -> Router<AppState> {
///     Router::new()
///         .route("/", get(|| async { "admins only" }))
///         .route_layer(middleware::from_fn(auth::restrict_to(&[Role::Admin])))
///         .route_layer(middleware::from_fn_with_state(state, auth::protect))
/// }
/// ```

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use cookie::{time::Duration, Cookie, SameSite};
use std::future::Future;
use std::pin::Pin;
use tourbook_shared::{
    auth::{authorization::require_role, jwt},
    models::user::{Role, User},
};
use tracing::debug;

use crate::{app::AppState, error::ApiError};

/// Name of the session cookie
pub const TOKEN_COOKIE: &str = "jwt";

/// The authenticated user of the request
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Session token from `Authorization: Bearer` or the `jwt` cookie
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == TOKEN_COOKIE && !c.value().is_empty())
        .map(|c| c.value().to_string())
}

/// Session cookie carrying `value`, marked `Secure` when `secure` is set
pub fn session_cookie(value: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, value.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(max_age_secs))
        .secure(secure)
        .build()
}

/// Resolves a token to the user it was issued for
///
/// Fails if the token is invalid or expired, the user no longer exists
/// or is inactive, or the password changed after the token was issued.
pub async fn authenticate(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = jwt::validate_token(token, &state.config.jwt.secret)?;

    let user = state
        .repos
        .users
        .find_by_id(claims.sub)
        .await?
        .filter(|user| user.active)
        .ok_or_else(|| {
            ApiError::Unauthorized(
                "The user belonging to this token no longer exists.".to_string(),
            )
        })?;

    if user.changed_password_after(claims.iat) {
        debug!(user_id = %user.id, "Rejected token issued before password change");
        return Err(ApiError::Unauthorized(
            "User recently changed password! Please log in again.".to_string(),
        ));
    }

    Ok(user)
}

/// Requires a valid session and attaches [`CurrentUser`]
pub async fn protect(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(req.headers()).ok_or_else(|| {
        ApiError::Unauthorized("You are not logged in! Please log in to get access.".to_string())
    })?;

    let user = authenticate(&state, &token).await?;
    req.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(req).await)
}

async fn check_role(roles: &'static [Role], req: Request, next: Next) -> Result<Response, ApiError> {
    let current = req
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| ApiError::Unauthorized("You are not logged in! Please log in to get access.".to_string()))?;

    require_role(current.0.role, roles)?;

    Ok(next.run(req).await)
}

/// Creates a middleware closure that only lets `roles` through
pub fn restrict_to(
    roles: &'static [Role],
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Result<Response, ApiError>> + Send>> + Clone {
    move |req, next| Box::pin(check_role(roles, req, next))
}
