/// Domain models
///
/// Each model implements [`crate::repository::Entity`] (document semantics)
/// and [`crate::repository::PgEntity`] (column mapping).
///
/// - `user`: accounts, roles and credentials
/// - `tour`: tours plus the stats and monthly plan reports
/// - `review`: one review per (tour, user), rating summary
/// - `booking`: paid bookings, keyed by checkout session when reconciled
///
/// # Example
///
/// ```
/// use tourbook_shared::models::tour::{CreateTour, Difficulty, Tour};
/// use tourbook_shared::repository::Entity;
///
/// let tour = Tour::build(
///     CreateTour {
///         name: "The Sea Explorer".to_string(),
///         duration: 7,
///         max_group_size: 15,
///         difficulty: Difficulty::Medium,
///         ratings_average: None,
///         price: 497.0,
///         price_discount: None,
///         summary: "Exploring the jaw-dropping US east coast".to_string(),
///         description: None,
///         image_cover: "tour-2-cover.jpg".to_string(),
///         images: vec![],
///         start_dates: vec![],
///         guides: vec![],
///         secret_tour: None,
///     },
///     chrono::Utc::now(),
/// );
/// assert_eq!(tour.slug, "the-sea-explorer");
/// ```

pub mod booking;
pub mod review;
pub mod tour;
pub mod user;
