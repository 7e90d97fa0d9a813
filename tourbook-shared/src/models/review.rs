/// Review model
///
/// A user may review a tour once (`reviews_tour_id_user_id_key`). Every
/// review change recomputes the tour's rating statistics via
/// [`rating_summary`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::Postgres;
use sqlx::query_builder::Separated;
use uuid::Uuid;
use validator::Validate;

use super::tour::{round_rating, DEFAULT_RATING};
use crate::query::{Column, ColumnKind};
use crate::repository::{Entity, PgEntity, UniqueKey};

/// Review of a tour by a user
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub review: String,

    /// 1..=5
    pub rating: i32,

    pub tour_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateReview {
    #[validate(length(min = 1, message = "Review can not be empty"))]
    pub review: String,

    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,

    pub tour_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateReview {
    #[validate(length(min = 1, message = "Review can not be empty"))]
    pub review: Option<String>,

    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i32>,
}

/// Rating average (rounded to one decimal) and count for a tour's reviews
///
/// A tour without reviews falls back to the default rating.
pub fn rating_summary(reviews: &[Review]) -> (f64, i32) {
    if reviews.is_empty() {
        return (DEFAULT_RATING, 0);
    }

    let total: i64 = reviews.iter().map(|r| i64::from(r.rating)).sum();
    let average = total as f64 / reviews.len() as f64;
    let count = i32::try_from(reviews.len()).unwrap_or(i32::MAX);

    (round_rating(average), count)
}

impl Entity for Review {
    type Create = CreateReview;
    type Patch = UpdateReview;

    const NAME: &'static str = "review";
    const TABLE: &'static str = "reviews";

    const COLUMNS: &'static [Column] = &[
        Column::new("id", ColumnKind::Uuid),
        Column::new("review", ColumnKind::Text),
        Column::new("rating", ColumnKind::Number),
        Column::new("tour_id", ColumnKind::Uuid),
        Column::new("user_id", ColumnKind::Uuid),
        Column::new("created_at", ColumnKind::Timestamp),
        Column::new("updated_at", ColumnKind::Timestamp),
    ];

    const UNIQUE_KEYS: &'static [UniqueKey] = &[UniqueKey {
        constraint: "reviews_tour_id_user_id_key",
        fields: &["tour_id", "user_id"],
    }];

    fn id(&self) -> Uuid {
        self.id
    }

    fn build(data: CreateReview, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            review: data.review.trim().to_string(),
            rating: data.rating,
            tour_id: data.tour_id,
            user_id: data.user_id,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, patch: UpdateReview, now: DateTime<Utc>) {
        if let Some(review) = patch.review {
            self.review = review.trim().to_string();
        }
        if let Some(rating) = patch.rating {
            self.rating = rating;
        }
        self.updated_at = now;
    }
}

impl PgEntity for Review {
    const FIELDS: &'static [&'static str] = &[
        "id",
        "review",
        "rating",
        "tour_id",
        "user_id",
        "created_at",
        "updated_at",
    ];

    fn push_values(&self, values: &mut Separated<'_, '_, Postgres, &'static str>) {
        values
            .push_bind(self.id)
            .push_bind(self.review.clone())
            .push_bind(self.rating)
            .push_bind(self.tour_id)
            .push_bind(self.user_id)
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}
