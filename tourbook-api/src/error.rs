/// Error handling for the API server
///
/// All handlers return `Result<T, ApiError>`, which converts to a JSON error
/// body and the matching HTTP status. Library errors are converted with
/// `From` impls so handlers can use `?` throughout.
///
/// # Example
///
/// ```no_run
/// use tourbook_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::{json, Value};
///
/// async fn handler(found: bool) -> ApiResult<Json<Value>> {
///     if !found {
///         return Err(ApiError::NotFound("No tour found with that ID".to_string()));
///     }
///     Ok(Json(json!({ "status": "success" })))
/// }
/// ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tourbook_shared::{
    auth::{authorization::AuthzError, jwt::JwtError, password::PasswordError},
    checkout::ReconcileError,
    payments::PaymentError,
    query::QueryError,
    repository::RepoError,
};
use validator::{ValidationErrors, ValidationErrorsKind};

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409) - e.g., duplicate email, second review of a tour
    Conflict(String),

    /// Unprocessable entity (422) - validation errors
    ValidationError(Vec<ValidationErrorDetail>),

    /// Bad gateway (502) - payment provider failure
    ExternalService(String),

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503)
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

impl ValidationErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// Single-field validation failure
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail::new(field, message)])
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::ExternalService(msg) => write!(f, "External service error: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::ExternalService(msg) => {
                tracing::error!("External service error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "external_service_error",
                    "The payment provider could not process the request".to_string(),
                    None,
                )
            }
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg,
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

fn collect_details(prefix: &str, errors: &ValidationErrors, out: &mut Vec<ValidationErrorDetail>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value ({})", error.code));
                    out.push(ValidationErrorDetail::new(path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_details(&path, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_details(&format!("{}[{}]", path, index), nested, out);
                }
            }
        }
    }
}

/// Convert validator errors to API errors
impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut details = Vec::new();
        collect_details("", &errors, &mut details);
        details.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(details)
    }
}

/// Convert repository errors to API errors
impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Conflict(constraint) => ApiError::Conflict(conflict_message(&constraint)),
            RepoError::InvalidReference(constraint) => ApiError::invalid(
                reference_field(&constraint),
                "Referenced record does not exist",
            ),
            RepoError::CheckViolation(constraint) => {
                ApiError::invalid(constraint, "Value violates a data constraint")
            }
            RepoError::Database(e) => ApiError::InternalError(format!("Database error: {}", e)),
            RepoError::Storage(msg) => ApiError::InternalError(format!("Storage error: {}", msg)),
        }
    }
}

fn conflict_message(constraint: &str) -> String {
    match constraint {
        "users_email_key" => "Email already exists".to_string(),
        "tours_name_key" | "tours_slug_key" => "A tour with that name already exists".to_string(),
        "reviews_tour_id_user_id_key" => "You have already reviewed this tour".to_string(),
        "bookings_checkout_session_id_key" => {
            "A booking for this checkout session already exists".to_string()
        }
        other => format!("Duplicate value violates {}", other),
    }
}

fn reference_field(constraint: &str) -> String {
    if constraint.contains("tour_id") {
        "tour_id".to_string()
    } else if constraint.contains("user_id") {
        "user_id".to_string()
    } else {
        constraint.to_string()
    }
}

/// Convert list query errors to API errors
impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        let field = match &err {
            QueryError::UnknownField(name) => name.clone(),
            QueryError::UnknownOperator(_) => "operator".to_string(),
            QueryError::InvalidValue { field, .. } => field.clone(),
            QueryError::InvalidPagination { param, .. } => param.to_string(),
        };
        ApiError::invalid(field, err.to_string())
    }
}

/// Convert authorization errors to API errors
impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

/// Convert password errors to API errors
impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooWeak(msg) => ApiError::invalid("password", msg),
            PasswordError::Mismatch => ApiError::invalid("password_confirm", err.to_string()),
            other => ApiError::InternalError(format!("Password operation failed: {}", other)),
        }
    }
}

/// Convert JWT errors to API errors
impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::CreateError(msg) => ApiError::InternalError(msg),
            JwtError::Expired => {
                ApiError::Unauthorized("Your token has expired! Please log in again.".to_string())
            }
            JwtError::InvalidIssuer | JwtError::ValidationError(_) => {
                ApiError::Unauthorized("Invalid token. Please log in again!".to_string())
            }
        }
    }
}

/// Convert payment provider errors to API errors
impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Signature(e) => ApiError::BadRequest(format!("Webhook error: {}", e)),
            other => ApiError::ExternalService(other.to_string()),
        }
    }
}

/// Convert reconciliation errors to API errors
impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Repository(e) => e.into(),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}
