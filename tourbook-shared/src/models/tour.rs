/// Tour model
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tours (
///     id UUID PRIMARY KEY,
///     name VARCHAR(40) NOT NULL,
///     slug VARCHAR(255) NOT NULL,
///     duration INTEGER NOT NULL,
///     max_group_size INTEGER NOT NULL,
///     difficulty TEXT NOT NULL,
///     ratings_average DOUBLE PRECISION NOT NULL DEFAULT 4.5,
///     ratings_quantity INTEGER NOT NULL DEFAULT 0,
///     price DOUBLE PRECISION NOT NULL,
///     price_discount DOUBLE PRECISION,
///     summary TEXT NOT NULL,
///     description TEXT,
///     image_cover VARCHAR(255) NOT NULL,
///     images TEXT[] NOT NULL DEFAULT '{}',
///     start_dates TIMESTAMPTZ[] NOT NULL DEFAULT '{}',
///     guides UUID[] NOT NULL DEFAULT '{}',
///     secret_tour BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL,
///     updated_at TIMESTAMPTZ NOT NULL
/// );
/// ```
///
/// The slug is derived from the name on create and on rename. Secret tours
/// are hidden from list queries by the HTTP layer's default scope.
///
/// The aggregate reports (`tour_stats`, `monthly_plan`) are computed over
/// loaded tours so they behave the same on every backend.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::Postgres;
use sqlx::query_builder::Separated;
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::query::{Column, ColumnKind};
use crate::repository::{Entity, PgEntity, UniqueKey};

/// Rating assigned to tours without reviews
pub const DEFAULT_RATING: f64 = 4.5;

/// Threshold used by [`tour_stats`]
pub const STATS_MIN_RATING: f64 = 4.5;

/// Tour difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Difficult => "difficult",
        }
    }
}

/// Tour
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    pub slug: String,

    /// Length in days
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: Difficulty,

    /// Rounded to one decimal
    pub ratings_average: f64,
    pub ratings_quantity: i32,

    /// Major currency units
    pub price: f64,
    pub price_discount: Option<f64>,

    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    pub start_dates: Vec<DateTime<Utc>>,

    /// User ids of the guides leading this tour
    pub guides: Vec<Uuid>,

    pub secret_tour: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a tour
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_create_discount"))]
pub struct CreateTour {
    #[validate(length(min = 10, max = 40, message = "A tour name must have between 10 and 40 characters"))]
    pub name: String,

    #[validate(range(min = 1, message = "A tour must have a duration"))]
    pub duration: i32,

    #[validate(range(min = 1, message = "A tour must have a group size"))]
    pub max_group_size: i32,

    pub difficulty: Difficulty,

    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1.0 and 5.0"))]
    pub ratings_average: Option<f64>,

    #[validate(range(min = 0.0, message = "A tour price cannot be negative"))]
    pub price: f64,

    pub price_discount: Option<f64>,

    #[validate(length(min = 1, message = "A tour must have a summary"))]
    pub summary: String,

    pub description: Option<String>,

    #[validate(length(min = 1, message = "A tour must have a cover image"))]
    pub image_cover: String,

    #[serde(default)]
    pub images: Vec<String>,

    #[serde(default)]
    pub start_dates: Vec<DateTime<Utc>>,

    #[serde(default)]
    pub guides: Vec<Uuid>,

    pub secret_tour: Option<bool>,
}

/// Partial update for a tour
///
/// A discount sent together with a price must be below it; the stored pair
/// is checked again by [`Tour::discount_is_valid`].
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[validate(schema(function = "validate_update_discount"))]
pub struct UpdateTour {
    #[validate(length(min = 10, max = 40, message = "A tour name must have between 10 and 40 characters"))]
    pub name: Option<String>,

    #[validate(range(min = 1, message = "A tour must have a duration"))]
    pub duration: Option<i32>,

    #[validate(range(min = 1, message = "A tour must have a group size"))]
    pub max_group_size: Option<i32>,

    pub difficulty: Option<Difficulty>,

    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1.0 and 5.0"))]
    pub ratings_average: Option<f64>,

    #[validate(range(min = 0, message = "Ratings quantity cannot be negative"))]
    pub ratings_quantity: Option<i32>,

    #[validate(range(min = 0.0, message = "A tour price cannot be negative"))]
    pub price: Option<f64>,

    pub price_discount: Option<f64>,

    #[validate(length(min = 1, message = "A tour must have a summary"))]
    pub summary: Option<String>,

    pub description: Option<String>,

    #[validate(length(min = 1, message = "A tour must have a cover image"))]
    pub image_cover: Option<String>,

    pub images: Option<Vec<String>>,

    pub start_dates: Option<Vec<DateTime<Utc>>>,

    pub guides: Option<Vec<Uuid>>,

    pub secret_tour: Option<bool>,
}

fn discount_error() -> ValidationError {
    let mut err = ValidationError::new("price_discount");
    err.message = Some("Discount price should be below regular price".into());
    err
}

fn validate_create_discount(tour: &CreateTour) -> Result<(), ValidationError> {
    match tour.price_discount {
        Some(discount) if discount >= tour.price || discount < 0.0 => Err(discount_error()),
        _ => Ok(()),
    }
}

fn validate_update_discount(tour: &UpdateTour) -> Result<(), ValidationError> {
    match (tour.price, tour.price_discount) {
        (_, Some(discount)) if discount < 0.0 => Err(discount_error()),
        (Some(price), Some(discount)) if discount >= price => Err(discount_error()),
        _ => Ok(()),
    }
}

/// URL slug for a tour name: lowercase ASCII alphanumerics joined by `-`
///
/// # Example
///
/// ```
/// use tourbook_shared::models::tour::slugify;
///
/// assert_eq!(slugify("The Forest Hiker"), "the-forest-hiker");
/// assert_eq!(slugify("  Wine & Dine: Tuscany!  "), "wine-dine-tuscany");
/// ```
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Rounds a rating to one decimal (4.666 -> 4.7)
pub fn round_rating(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl Tour {
    /// Whether the stored discount is below the price
    pub fn discount_is_valid(&self) -> bool {
        self.price_discount
            .map(|discount| discount >= 0.0 && discount < self.price)
            .unwrap_or(true)
    }

    /// Duration in weeks
    pub fn duration_weeks(&self) -> f64 {
        f64::from(self.duration) / 7.0
    }
}

impl Entity for Tour {
    type Create = CreateTour;
    type Patch = UpdateTour;

    const NAME: &'static str = "tour";
    const TABLE: &'static str = "tours";

    const COLUMNS: &'static [Column] = &[
        Column::new("id", ColumnKind::Uuid),
        Column::new("name", ColumnKind::Text),
        Column::new("slug", ColumnKind::Text),
        Column::new("duration", ColumnKind::Number),
        Column::new("max_group_size", ColumnKind::Number),
        Column::new("difficulty", ColumnKind::Text),
        Column::new("ratings_average", ColumnKind::Number),
        Column::new("ratings_quantity", ColumnKind::Number),
        Column::new("price", ColumnKind::Number),
        Column::new("price_discount", ColumnKind::Number),
        Column::new("summary", ColumnKind::Text),
        Column::new("secret_tour", ColumnKind::Bool),
        Column::new("created_at", ColumnKind::Timestamp),
        Column::new("updated_at", ColumnKind::Timestamp),
    ];

    const UNIQUE_KEYS: &'static [UniqueKey] = &[
        UniqueKey {
            constraint: "tours_name_key",
            fields: &["name"],
        },
        UniqueKey {
            constraint: "tours_slug_key",
            fields: &["slug"],
        },
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    fn build(data: CreateTour, now: DateTime<Utc>) -> Self {
        let name = data.name.trim().to_string();

        Self {
            id: Uuid::new_v4(),
            slug: slugify(&name),
            name,
            duration: data.duration,
            max_group_size: data.max_group_size,
            difficulty: data.difficulty,
            ratings_average: round_rating(data.ratings_average.unwrap_or(DEFAULT_RATING)),
            ratings_quantity: 0,
            price: data.price,
            price_discount: data.price_discount,
            summary: data.summary.trim().to_string(),
            description: data.description.map(|d| d.trim().to_string()),
            image_cover: data.image_cover,
            images: data.images,
            start_dates: data.start_dates,
            guides: data.guides,
            secret_tour: data.secret_tour.unwrap_or(false),
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, patch: UpdateTour, now: DateTime<Utc>) {
        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
            self.slug = slugify(&self.name);
        }
        if let Some(duration) = patch.duration {
            self.duration = duration;
        }
        if let Some(max_group_size) = patch.max_group_size {
            self.max_group_size = max_group_size;
        }
        if let Some(difficulty) = patch.difficulty {
            self.difficulty = difficulty;
        }
        if let Some(ratings_average) = patch.ratings_average {
            self.ratings_average = round_rating(ratings_average);
        }
        if let Some(ratings_quantity) = patch.ratings_quantity {
            self.ratings_quantity = ratings_quantity;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(price_discount) = patch.price_discount {
            self.price_discount = Some(price_discount);
        }
        if let Some(summary) = patch.summary {
            self.summary = summary.trim().to_string();
        }
        if let Some(description) = patch.description {
            self.description = Some(description.trim().to_string());
        }
        if let Some(image_cover) = patch.image_cover {
            self.image_cover = image_cover;
        }
        if let Some(images) = patch.images {
            self.images = images;
        }
        if let Some(start_dates) = patch.start_dates {
            self.start_dates = start_dates;
        }
        if let Some(guides) = patch.guides {
            self.guides = guides;
        }
        if let Some(secret_tour) = patch.secret_tour {
            self.secret_tour = secret_tour;
        }
        self.updated_at = now;
    }
}

impl PgEntity for Tour {
    const FIELDS: &'static [&'static str] = &[
        "id",
        "name",
        "slug",
        "duration",
        "max_group_size",
        "difficulty",
        "ratings_average",
        "ratings_quantity",
        "price",
        "price_discount",
        "summary",
        "description",
        "image_cover",
        "images",
        "start_dates",
        "guides",
        "secret_tour",
        "created_at",
        "updated_at",
    ];

    fn push_values(&self, values: &mut Separated<'_, '_, Postgres, &'static str>) {
        values
            .push_bind(self.id)
            .push_bind(self.name.clone())
            .push_bind(self.slug.clone())
            .push_bind(self.duration)
            .push_bind(self.max_group_size)
            .push_bind(self.difficulty)
            .push_bind(self.ratings_average)
            .push_bind(self.ratings_quantity)
            .push_bind(self.price)
            .push_bind(self.price_discount)
            .push_bind(self.summary.clone())
            .push_bind(self.description.clone())
            .push_bind(self.image_cover.clone())
            .push_bind(self.images.clone())
            .push_bind(self.start_dates.clone())
            .push_bind(self.guides.clone())
            .push_bind(self.secret_tour)
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}

/// Per-difficulty statistics over well-rated tours
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DifficultyStats {
    /// Upper-cased difficulty ("EASY")
    pub difficulty: String,
    pub num_tours: usize,
    /// Sum of ratings quantities
    pub num_ratings: i64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// Statistics for tours rated at least [`STATS_MIN_RATING`], grouped by
/// difficulty and sorted by average price
pub fn tour_stats(tours: &[Tour]) -> Vec<DifficultyStats> {
    let mut groups: BTreeMap<Difficulty, Vec<&Tour>> = BTreeMap::new();
    for tour in tours.iter().filter(|t| t.ratings_average >= STATS_MIN_RATING) {
        groups.entry(tour.difficulty).or_default().push(tour);
    }

    let mut stats: Vec<DifficultyStats> = groups
        .into_iter()
        .map(|(difficulty, group)| {
            let count = group.len() as f64;
            let prices = group.iter().map(|t| t.price);

            DifficultyStats {
                difficulty: difficulty.as_str().to_uppercase(),
                num_tours: group.len(),
                num_ratings: group.iter().map(|t| i64::from(t.ratings_quantity)).sum(),
                avg_rating: group.iter().map(|t| t.ratings_average).sum::<f64>() / count,
                avg_price: prices.clone().sum::<f64>() / count,
                min_price: prices.clone().fold(f64::INFINITY, f64::min),
                max_price: prices.fold(f64::NEG_INFINITY, f64::max),
            }
        })
        .collect();

    stats.sort_by(|a, b| a.avg_price.total_cmp(&b.avg_price));
    stats
}

/// Tour starts in one month of a year
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyPlan {
    /// 1 = January
    pub month: u32,
    pub num_tour_starts: usize,
    pub tours: Vec<String>,
}

/// Tour starts per month of `year`, busiest month first, at most 12 entries
pub fn monthly_plan(tours: &[Tour], year: i32) -> Vec<MonthlyPlan> {
    let mut months: BTreeMap<u32, Vec<String>> = BTreeMap::new();

    for tour in tours {
        for start in tour.start_dates.iter().filter(|d| d.year() == year) {
            months.entry(start.month()).or_default().push(tour.name.clone());
        }
    }

    let mut plan: Vec<MonthlyPlan> = months
        .into_iter()
        .map(|(month, tours)| MonthlyPlan {
            month,
            num_tour_starts: tours.len(),
            tours,
        })
        .collect();

    plan.sort_by(|a, b| b.num_tour_starts.cmp(&a.num_tour_starts).then(a.month.cmp(&b.month)));
    plan.truncate(12);
    plan
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn sample_create() -> CreateTour {
        CreateTour {
            name: "The Forest Hiker".to_string(),
            duration: 5,
            max_group_size: 25,
            difficulty: Difficulty::Easy,
            ratings_average: None,
            price: 397.0,
            price_discount: None,
            summary: "Breathtaking hike through the Canadian Banff National Park".to_string(),
            description: None,
            image_cover: "tour-1-cover.jpg".to_string(),
            images: vec!["tour-1-1.jpg".to_string()],
            start_dates: vec![],
            guides: vec![],
            secret_tour: None,
        }
    }

    pub(crate) fn sample_tour() -> Tour {
        Tour::build(sample_create(), Utc::now())
    }

    fn tour(name: &str, difficulty: Difficulty, rating: f64, price: f64) -> Tour {
        let mut tour = sample_tour();
        tour.name = name.to_string();
        tour.difficulty = difficulty;
        tour.ratings_average = rating;
        tour.ratings_quantity = 3;
        tour.price = price;
        tour
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("The Forest Hiker"), "the-forest-hiker");
        assert_eq!(slugify("--The   Sea  Explorer--"), "the-sea-explorer");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_build_defaults() {
        let tour = sample_tour();
        assert_eq!(tour.slug, "the-forest-hiker");
        assert_eq!(tour.ratings_average, DEFAULT_RATING);
        assert_eq!(tour.ratings_quantity, 0);
        assert!(!tour.secret_tour);
        assert!((tour.duration_weeks() - 5.0 / 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rename_updates_slug() {
        let mut tour = sample_tour();
        tour.apply(
            UpdateTour {
                name: Some("The Snow Adventurer".to_string()),
                ratings_average: Some(4.666),
                ..Default::default()
            },
            Utc::now(),
        );
        assert_eq!(tour.slug, "the-snow-adventurer");
        assert_eq!(tour.ratings_average, 4.7);
    }

    #[test]
    fn test_create_validation() {
        assert!(sample_create().validate().is_ok());

        let short_name = CreateTour {
            name: "Short".to_string(),
            ..sample_create()
        };
        assert!(short_name.validate().is_err());

        let bad_discount = CreateTour {
            price_discount: Some(500.0),
            ..sample_create()
        };
        assert!(bad_discount.validate().is_err());

        let bad_rating = CreateTour {
            ratings_average: Some(5.5),
            ..sample_create()
        };
        assert!(bad_rating.validate().is_err());
    }

    #[test]
    fn test_update_validation() {
        let patch = UpdateTour {
            price: Some(100.0),
            price_discount: Some(150.0),
            ..Default::default()
        };
        assert!(patch.validate().is_err());

        let patch = UpdateTour {
            price_discount: Some(50.0),
            ..Default::default()
        };
        assert!(patch.validate().is_ok());
    }

    #[test]
    fn test_tour_stats_groups_by_difficulty() {
        let tours = vec![
            tour("Easy One Tour", Difficulty::Easy, 4.8, 400.0),
            tour("Easy Two Tour", Difficulty::Easy, 4.6, 200.0),
            tour("Hard One Tour", Difficulty::Difficult, 4.9, 1000.0),
            tour("Low Rated Tour", Difficulty::Medium, 3.0, 50.0),
        ];

        let stats = tour_stats(&tours);
        assert_eq!(stats.len(), 2);

        assert_eq!(stats[0].difficulty, "EASY");
        assert_eq!(stats[0].num_tours, 2);
        assert_eq!(stats[0].num_ratings, 6);
        assert_eq!(stats[0].avg_price, 300.0);
        assert_eq!(stats[0].min_price, 200.0);
        assert_eq!(stats[0].max_price, 400.0);
        assert!((stats[0].avg_rating - 4.7).abs() < 1e-9);

        assert_eq!(stats[1].difficulty, "DIFFICULT");
    }

    #[test]
    fn test_monthly_plan() {
        let date = |y, m, d| Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap();

        let mut a = tour("Tour Alpha Route", Difficulty::Easy, 4.5, 100.0);
        a.start_dates = vec![date(2021, 3, 1), date(2021, 7, 1), date(2022, 3, 1)];
        let mut b = tour("Tour Beta Route", Difficulty::Easy, 4.5, 100.0);
        b.start_dates = vec![date(2021, 7, 10)];

        let plan = monthly_plan(&[a, b], 2021);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].month, 7);
        assert_eq!(plan[0].num_tour_starts, 2);
        assert_eq!(plan[0].tours, vec!["Tour Alpha Route", "Tour Beta Route"]);
        assert_eq!(plan[1].month, 3);

        assert!(monthly_plan(&[], 2021).is_empty());
    }
}
