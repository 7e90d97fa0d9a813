/// Booking endpoints
///
/// # Endpoints
///
/// - `GET /api/v1/bookings/checkout-session/:id` - Start a checkout for a tour
/// - `GET /api/v1/bookings/mine` - Bookings of the current user
/// - `GET|POST /api/v1/bookings`, `GET|PATCH|DELETE /api/v1/bookings/:id` -
///   Administration through the CRUD factory
///
/// Bookings from customers are only created by the checkout webhook.

use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tourbook_shared::{
    checkout::build_checkout_request,
    models::{
        booking::{Booking, CreateBooking, UpdateBooking},
        tour::Tour,
    },
    query::{Filter, FilterValue},
    repository::Repository,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extractors::parse_id,
    middleware::auth::CurrentUser,
    routes::factory::{find_visible, list_documents, success_list, to_document, Resource},
};

#[async_trait]
impl Resource for Booking {
    fn repo(state: &AppState) -> Arc<dyn Repository<Self>> {
        state.repos.bookings.clone()
    }

    async fn expand(state: &AppState, booking: &Self, mut document: Value) -> ApiResult<Value> {
        let tour = state
            .repos
            .tours
            .find_by_id(booking.tour_id)
            .await?
            .map(|tour| json!({ "id": tour.id, "name": tour.name, "slug": tour.slug }));
        let user = match state.repos.users.find_by_id(booking.user_id).await? {
            Some(user) => to_document(&user)?,
            None => Value::Null,
        };

        if let Value::Object(map) = &mut document {
            map.insert("tour".to_string(), tour.unwrap_or(Value::Null));
            map.insert("user".to_string(), user);
        }
        Ok(document)
    }

    async fn check_create(state: &AppState, data: &CreateBooking) -> ApiResult<()> {
        check_references(state, Some(data.tour_id), Some(data.user_id)).await
    }

    async fn check_update(state: &AppState, _current: &Self, patch: &UpdateBooking) -> ApiResult<()> {
        check_references(state, patch.tour_id, patch.user_id).await
    }
}

/// Rejects tour or user ids with no matching record
async fn check_references(
    state: &AppState,
    tour_id: Option<Uuid>,
    user_id: Option<Uuid>,
) -> ApiResult<()> {
    if let Some(id) = tour_id {
        if state.repos.tours.find_by_id(id).await?.is_none() {
            return Err(ApiError::invalid("tour_id", "No tour found with that ID"));
        }
    }
    if let Some(id) = user_id {
        if state.repos.users.find_by_id(id).await?.is_none() {
            return Err(ApiError::invalid("user_id", "No user found with that ID"));
        }
    }
    Ok(())
}

/// Creates a provider checkout session for a tour
///
/// Nothing is stored; the booking is recorded when the provider reports
/// the paid session to the webhook.
///
/// # Errors
///
/// - `404 Not Found`: unknown or secret tour
/// - `502 Bad Gateway`: the provider rejected the request
pub async fn get_checkout_session(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(tour_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let tour = find_visible::<Tour>(&state, parse_id(&tour_id)?).await?;

    let request = build_checkout_request(&tour, &user.email, &state.config.api.public_url);
    let session = state.payments.create_checkout_session(&request).await?;

    info!(
        session_id = %session.id,
        tour_id = %tour.id,
        user_id = %user.id,
        "Checkout session created"
    );

    Ok(Json(json!({
        "status": "success",
        "session": session,
    })))
}

/// Bookings of the current user
pub async fn my_bookings(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let scope = vec![Filter::eq("user_id", FilterValue::Uuid(user.id))];
    let documents = list_documents::<Booking>(&state, &params, scope).await?;
    Ok(success_list(documents))
}
