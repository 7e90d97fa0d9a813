/// Review endpoints
///
/// The author of a review is always the authenticated user; bodies cannot
/// choose it. Users may only change their own reviews, admins any. Every
/// create, update and delete recomputes the reviewed tour's rating average
/// and quantity.
///
/// # Endpoints
///
/// - `GET|POST /api/v1/reviews`
/// - `GET|PATCH|DELETE /api/v1/reviews/:id`
/// - `GET|POST /api/v1/tours/:id/reviews` - Reviews of one tour

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tourbook_shared::{
    auth::authorization::require_owner_or_admin,
    models::{
        review::{rating_summary, CreateReview, Review, UpdateReview},
        tour::{Tour, UpdateTour},
    },
    query::{Filter, FilterValue, ListQuery},
    repository::Repository,
};
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extractors::{extract_json, extract_validated_json, parse_id},
    middleware::auth::CurrentUser,
    routes::factory::{
        self, delete_by_id, insert, list_documents, success, success_list, update_by_id, Resource,
    },
};

/// Review body; the author comes from the session
#[derive(Debug, Deserialize)]
pub struct ReviewInput {
    pub review: String,
    pub rating: i32,

    /// Required unless the tour is in the path
    pub tour_id: Option<Uuid>,
}

/// Recomputes a tour's rating statistics from its reviews
pub async fn sync_tour_ratings(state: &AppState, tour_id: Uuid) -> ApiResult<()> {
    let reviews = state
        .repos
        .reviews
        .find_many(&ListQuery::all().filter(Filter::eq("tour_id", FilterValue::Uuid(tour_id))))
        .await?;
    let (average, quantity) = rating_summary(&reviews);

    let patch = UpdateTour {
        ratings_average: Some(average),
        ratings_quantity: Some(quantity),
        ..Default::default()
    };
    if state.repos.tours.update(tour_id, patch).await?.is_none() {
        debug!(tour_id = %tour_id, "Reviewed tour no longer exists");
    }

    Ok(())
}

#[async_trait]
impl Resource for Review {
    fn repo(state: &AppState) -> Arc<dyn Repository<Self>> {
        state.repos.reviews.clone()
    }

    async fn expand(state: &AppState, review: &Self, mut document: Value) -> ApiResult<Value> {
        let author = state
            .repos
            .users
            .find_by_id(review.user_id)
            .await?
            .map(|user| json!({ "id": user.id, "name": user.name, "photo": user.photo }));

        if let Value::Object(map) = &mut document {
            map.insert("user".to_string(), author.unwrap_or(Value::Null));
        }
        Ok(document)
    }

    async fn check_create(state: &AppState, data: &CreateReview) -> ApiResult<()> {
        if state.repos.tours.find_by_id(data.tour_id).await?.is_none() {
            return Err(ApiError::invalid("tour_id", "No tour found with that ID"));
        }
        Ok(())
    }

    async fn after_change(state: &AppState, review: &Self) -> ApiResult<()> {
        sync_tour_ratings(state, review.tour_id).await
    }
}

async fn create_review(
    state: &AppState,
    user: &CurrentUser,
    input: ReviewInput,
    tour_id: Option<Uuid>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let tour_id = tour_id
        .or(input.tour_id)
        .ok_or_else(|| ApiError::invalid("tour_id", "Review must belong to a tour."))?;

    let data = CreateReview {
        review: input.review,
        rating: input.rating,
        tour_id,
        user_id: user.0.id,
    };
    data.validate()?;

    let created = insert::<Review>(state, data).await?;
    Ok((StatusCode::CREATED, success(created)))
}

/// `POST /api/v1/reviews`
pub async fn create_one(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    body: Result<Json<ReviewInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let input = extract_json(body)?;
    create_review(&state, &user, input, None).await
}

/// `POST /api/v1/tours/:id/reviews`
pub async fn create_for_tour(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(tour_id): Path<String>,
    body: Result<Json<ReviewInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let tour_id = parse_id(&tour_id)?;
    if state.repos.tours.find_by_id(tour_id).await?.is_none() {
        return Err(factory::not_found::<Tour>());
    }

    let input = extract_json(body)?;
    create_review(&state, &user, input, Some(tour_id)).await
}

/// `GET /api/v1/tours/:id/reviews`
pub async fn list_for_tour(
    State(state): State<AppState>,
    Path(tour_id): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let scope = vec![Filter::eq("tour_id", FilterValue::Uuid(parse_id(&tour_id)?))];
    let documents = list_documents::<Review>(&state, &params, scope).await?;
    Ok(success_list(documents))
}

async fn owned_review(state: &AppState, user: &CurrentUser, id: Uuid) -> ApiResult<Review> {
    let review = state
        .repos
        .reviews
        .find_by_id(id)
        .await?
        .ok_or_else(factory::not_found::<Review>)?;

    require_owner_or_admin(user.0.id, user.0.role, review.user_id, "reviews")?;
    Ok(review)
}

/// `PATCH /api/v1/reviews/:id`
pub async fn update_one(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    body: Result<Json<UpdateReview>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    owned_review(&state, &user, id).await?;

    let patch = extract_validated_json(body)?;
    let updated = update_by_id::<Review>(&state, id, patch).await?;
    Ok(success(updated))
}

/// `DELETE /api/v1/reviews/:id`
pub async fn delete_one(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    owned_review(&state, &user, id).await?;

    delete_by_id::<Review>(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
