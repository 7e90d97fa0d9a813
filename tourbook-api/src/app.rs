/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tourbook_api::{app::AppState, config::Config};
/// use tourbook_shared::{payments::stripe::StripeClient, repository::Repositories};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let payments = Arc::new(StripeClient::new(config.stripe.clone())?);
/// let state = AppState::new(Repositories::postgres(pool), payments, config);
/// let app = tourbook_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::ApiError,
    middleware::{
        auth::{protect, restrict_to},
        security::SecurityHeadersLayer,
    },
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, Uri},
    middleware,
    routing::{delete, get, patch, post, MethodRouter},
    Router,
};
use std::sync::Arc;
use tourbook_shared::{
    models::{
        booking::Booking,
        review::Review,
        tour::Tour,
        user::{Role, User},
    },
    payments::PaymentProvider,
    repository::Repositories,
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Largest accepted JSON body on the REST API
pub const API_BODY_LIMIT: usize = 10 * 1024;

const ADMIN: &[Role] = &[Role::Admin];
const STAFF: &[Role] = &[Role::Admin, Role::LeadGuide];
const GUIDES: &[Role] = &[Role::Admin, Role::LeadGuide, Role::Guide];
const REVIEWERS: &[Role] = &[Role::User];
const REVIEW_EDITORS: &[Role] = &[Role::User, Role::Admin];

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Entity repositories
    pub repos: Repositories,

    /// Checkout sessions and webhook verification
    pub payments: Arc<dyn PaymentProvider>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates new application state
    pub fn new(repos: Repositories, payments: Arc<dyn PaymentProvider>, config: Config) -> Self {
        Self {
            repos,
            payments,
            config: Arc::new(config),
        }
    }
}

/// Requires a session
fn protected(state: &AppState, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn_with_state(state.clone(), protect))
}

/// Requires a session whose role is in `roles`
fn restricted(
    state: &AppState,
    roles: &'static [Role],
    route: MethodRouter<AppState>,
) -> MethodRouter<AppState> {
    protected(state, route.route_layer(middleware::from_fn(restrict_to(roles))))
}

async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("Can't find {} on this server!", uri.path()))
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET  /health
/// ├── POST /webhook-checkout                 # signed provider events
/// └── /api/v1/
///     ├── /tours                             # GET | POST (admin, lead-guide)
///     │   ├── /top-5-cheap, /tour-stats
///     │   ├── /monthly-plan/:year            # admin, lead-guide, guide
///     │   ├── /:id                           # GET | PATCH, DELETE (admin, lead-guide)
///     │   └── /:id/reviews                   # GET | POST (user)
///     ├── /users
///     │   ├── /signup, /login, /logout
///     │   ├── /me, /update-me, /delete-me, /update-my-password
///     │   └── /, /:id                        # admin
///     ├── /reviews, /reviews/:id             # session required
///     └── /bookings
///         ├── /checkout-session/:id, /mine   # session required
///         └── /, /:id                        # admin, lead-guide
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. Compression
/// 3. CORS (tower-http CorsLayer)
/// 4. Security headers
/// 5. Authentication and role checks (per route)
pub fn build_router(state: AppState) -> Router {
    use crate::routes::{auth, bookings, factory, health, reviews, tours, webhook};

    let s = &state;

    let tour_routes = Router::new()
        .route(
            "/",
            get(factory::get_all::<Tour>)
                .merge(restricted(s, STAFF, post(factory::create_one::<Tour>))),
        )
        .route("/top-5-cheap", get(tours::top_5_cheap))
        .route("/tour-stats", get(tours::tour_stats))
        .route(
            "/monthly-plan/:year",
            restricted(s, GUIDES, get(tours::monthly_plan)),
        )
        .route(
            "/:id",
            get(factory::get_one::<Tour>).merge(restricted(
                s,
                STAFF,
                patch(factory::update_one::<Tour>).delete(factory::delete_one::<Tour>),
            )),
        )
        .route(
            "/:id/reviews",
            protected(s, get(reviews::list_for_tour))
                .merge(restricted(s, REVIEWERS, post(reviews::create_for_tour))),
        );

    let user_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/logout", get(auth::logout))
        .route(
            "/update-my-password",
            protected(s, patch(auth::update_my_password)),
        )
        .route("/me", protected(s, get(auth::me)))
        .route("/update-me", protected(s, patch(auth::update_me)))
        .route("/delete-me", protected(s, delete(auth::delete_me)))
        .route("/", restricted(s, ADMIN, get(factory::get_all::<User>)))
        .route(
            "/:id",
            restricted(
                s,
                ADMIN,
                get(factory::get_one::<User>)
                    .patch(factory::update_one::<User>)
                    .delete(factory::delete_one::<User>),
            ),
        );

    let review_routes = Router::new()
        .route(
            "/",
            protected(s, get(factory::get_all::<Review>))
                .merge(restricted(s, REVIEWERS, post(reviews::create_one))),
        )
        .route(
            "/:id",
            protected(s, get(factory::get_one::<Review>)).merge(restricted(
                s,
                REVIEW_EDITORS,
                patch(reviews::update_one).delete(reviews::delete_one),
            )),
        );

    let booking_routes = Router::new()
        .route(
            "/checkout-session/:id",
            protected(s, get(bookings::get_checkout_session)),
        )
        .route("/mine", protected(s, get(bookings::my_bookings)))
        .route(
            "/",
            restricted(
                s,
                STAFF,
                get(factory::get_all::<Booking>).post(factory::create_one::<Booking>),
            ),
        )
        .route(
            "/:id",
            restricted(
                s,
                STAFF,
                get(factory::get_one::<Booking>)
                    .patch(factory::update_one::<Booking>)
                    .delete(factory::delete_one::<Booking>),
            ),
        );

    let v1_routes = Router::new()
        .nest("/tours", tour_routes)
        .nest("/users", user_routes)
        .nest("/reviews", review_routes)
        .nest("/bookings", booking_routes)
        .layer(DefaultBodyLimit::max(API_BODY_LIMIT));

    // Configure CORS based on environment
    let cors = if state.config.cors_allows_any() {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    let production = state.config.api.production;

    // The webhook needs the raw body for signature verification
    Router::new()
        .route("/health", get(health::health_check))
        .route("/webhook-checkout", post(webhook::webhook_checkout))
        .nest("/api/v1", v1_routes)
        .fallback(route_not_found)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(SecurityHeadersLayer::new(production))
        .with_state(state)
}
