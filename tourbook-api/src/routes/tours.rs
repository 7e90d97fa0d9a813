/// Tour endpoints
///
/// CRUD goes through the factory; this module adds the tour-specific
/// hooks (secret tours are hidden, guides must exist, discounts stay below
/// the price) and the aggregate endpoints.
///
/// # Endpoints
///
/// - `GET /api/v1/tours/top-5-cheap` - Best rated, cheapest five tours
/// - `GET /api/v1/tours/tour-stats` - Statistics per difficulty
/// - `GET /api/v1/tours/monthly-plan/:year` - Tour starts per month

use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use tourbook_shared::{
    models::{
        booking::Booking,
        review::Review,
        tour::{monthly_plan as plan_for_year, tour_stats as stats_for, Tour, UpdateTour},
        user::User,
    },
    query::{Filter, FilterValue, ListQuery},
    repository::Repository,
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::factory::{delete_where, list_documents, success, success_list, to_document, Resource},
};

/// Query applied by the top-5-cheap alias
const TOP_CHEAP_PARAMS: &[(&str, &str)] = &[
    ("limit", "5"),
    ("sort", "-ratings_average,price"),
    ("fields", "name,price,ratings_average,summary,difficulty"),
];

async fn check_guides(state: &AppState, guides: &[Uuid]) -> ApiResult<()> {
    for guide in guides {
        if state.repos.users.find_by_id(*guide).await?.is_none() {
            return Err(ApiError::invalid(
                "guides",
                format!("No user found with id {}", guide),
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl Resource for Tour {
    fn repo(state: &AppState) -> Arc<dyn Repository<Self>> {
        state.repos.tours.clone()
    }

    fn default_scope() -> Vec<Filter> {
        vec![Filter::eq("secret_tour", FilterValue::Bool(false))]
    }

    async fn expand(state: &AppState, tour: &Self, mut document: Value) -> ApiResult<Value> {
        let mut guides: Vec<User> = Vec::with_capacity(tour.guides.len());
        for id in &tour.guides {
            if let Some(user) = state.repos.users.find_by_id(*id).await? {
                guides.push(user);
            }
        }

        let reviews: Vec<Review> = state
            .repos
            .reviews
            .find_many(&ListQuery::all().filter(Filter::eq("tour_id", FilterValue::Uuid(tour.id))))
            .await?;

        if let Value::Object(map) = &mut document {
            map.insert("guides".to_string(), to_document(&guides)?);
            map.insert("reviews".to_string(), to_document(&reviews)?);
        }
        Ok(document)
    }

    async fn check_create(state: &AppState, data: &Self::Create) -> ApiResult<()> {
        check_guides(state, &data.guides).await
    }

    async fn check_update(state: &AppState, current: &Self, patch: &UpdateTour) -> ApiResult<()> {
        let mut candidate = current.clone();
        if let Some(price) = patch.price {
            candidate.price = price;
        }
        if patch.price_discount.is_some() {
            candidate.price_discount = patch.price_discount;
        }
        if !candidate.discount_is_valid() {
            return Err(ApiError::invalid(
                "price_discount",
                "Discount price should be below regular price",
            ));
        }

        match &patch.guides {
            Some(guides) => check_guides(state, guides).await,
            None => Ok(()),
        }
    }

    async fn before_delete(state: &AppState, tour: &Self) -> ApiResult<()> {
        let owned_by = Filter::eq("tour_id", FilterValue::Uuid(tour.id));
        let reviews = delete_where::<Review>(state, owned_by.clone()).await?;
        let bookings = delete_where::<Booking>(state, owned_by).await?;

        debug!(
            tour_id = %tour.id,
            reviews = reviews.len(),
            bookings = bookings.len(),
            "Removed records of deleted tour"
        );
        Ok(())
    }
}

/// Top five tours by rating, then price
///
/// Caller filters still apply; the alias fixes limit, sort and fields.
pub async fn top_5_cheap(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let mut params: Vec<(String, String)> = params
        .into_iter()
        .filter(|(key, _)| !TOP_CHEAP_PARAMS.iter().any(|(alias, _)| alias == key))
        .collect();
    params.extend(
        TOP_CHEAP_PARAMS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    );

    let documents = list_documents::<Tour>(&state, &params, Vec::new()).await?;
    Ok(success_list(documents))
}

async fn visible_tours(state: &AppState) -> ApiResult<Vec<Tour>> {
    let query = ListQuery::all().scoped(Tour::default_scope());
    Ok(state.repos.tours.find_many(&query).await?)
}

/// Statistics per difficulty over well-rated tours
pub async fn tour_stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let tours = visible_tours(&state).await?;
    Ok(success(stats_for(&tours)))
}

/// Tour starts per month of the given year
pub async fn monthly_plan(
    State(state): State<AppState>,
    Path(year): Path<String>,
) -> ApiResult<Json<Value>> {
    let year: i32 = year
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid year: {}", year)))?;

    let tours = visible_tours(&state).await?;
    Ok(success(plan_for_year(&tours, year)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_cheap_alias_fields_are_tour_columns() {
        let params: Vec<(String, String)> = TOP_CHEAP_PARAMS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let query = ListQuery::parse(<Tour as tourbook_shared::repository::Entity>::COLUMNS, &params).unwrap();
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.sort.len(), 2);
        assert!(query.sort[0].descending);
    }
}
