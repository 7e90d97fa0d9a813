//! # Request extraction helpers
//!
//! Handlers take `Result<Json<T>, JsonRejection>` and unwrap it through
//! these helpers so malformed bodies and invalid values surface as
//! [`ApiError`] responses instead of axum's plain-text rejections.

use axum::extract::rejection::JsonRejection;
use axum::Json;
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;

/// Extract a JSON body, mapping deserialization errors to [`ApiError::BadRequest`].
///
/// ```ignore
/// async fn handler(body: Result<Json<T>, JsonRejection>) -> ApiResult<...> {
///     let req = extract_json(body)?;
/// }
/// ```
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| ApiError::BadRequest(err.body_text()))
}

/// Extract a JSON body and run its `validator` rules.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, ApiError> {
    let value = extract_json(result)?;
    value.validate()?;
    Ok(value)
}

/// Parses a path id, rejecting malformed ids with 400
pub fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid id: {}", raw)))
}
