/// Checkout sessions and webhook reconciliation
///
/// Booking a tour is a two-step flow: [`build_checkout_request`] describes
/// the hosted payment page for a tour (nothing is stored), and once the
/// provider reports a paid session, [`reconcile_checkout`] turns it into a
/// booking.
///
/// Reconciliation is keyed by the provider's session id. A session that
/// already produced a booking is reported as [`ReconcileOutcome::AlreadyRecorded`],
/// and a duplicate delivery racing the first one loses on the unique
/// `checkout_session_id` index, which is reported the same way. Two
/// separate purchases of the same tour by the same user at the same price
/// remain two bookings.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::booking::{Booking, CreateBooking};
use crate::models::tour::Tour;
use crate::models::user::normalize_email;
use crate::payments::{CheckoutSession, CheckoutSessionRequest, LineItem};
use crate::query::{Filter, FilterValue};
use crate::repository::{RepoError, Repositories};

/// Currency of every checkout
pub const CURRENCY: &str = "usd";

/// Price in minor units (cents), rounded to the nearest unit
pub fn unit_amount(price: f64) -> i64 {
    (price * 100.0).round() as i64
}

/// Describes the checkout page for `tour`, paid by `customer_email`
///
/// `public_url` is the externally visible base URL used for the redirect
/// targets and the product image.
pub fn build_checkout_request(
    tour: &Tour,
    customer_email: &str,
    public_url: &str,
) -> CheckoutSessionRequest {
    let base = public_url.trim_end_matches('/');

    CheckoutSessionRequest {
        success_url: format!("{base}/my-tours"),
        cancel_url: format!("{base}/tour/{}", tour.slug),
        customer_email: customer_email.to_string(),
        client_reference_id: tour.id.to_string(),
        line_items: vec![LineItem {
            name: format!("{} Tour", tour.name),
            description: tour.summary.clone(),
            images: vec![format!("{base}/img/tours/{}", tour.image_cover)],
            unit_amount: unit_amount(tour.price),
            currency: CURRENCY.to_string(),
            quantity: 1,
        }],
    }
}

/// Why a completed session produced no booking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotPaid,
    MissingEmail,
    MissingTourReference,
    MissingAmount,
    UnknownUser(String),
    UnknownTour(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotPaid => write!(f, "session is not paid"),
            SkipReason::MissingEmail => write!(f, "session has no customer email"),
            SkipReason::MissingTourReference => write!(f, "session has no client reference id"),
            SkipReason::MissingAmount => write!(f, "session has no amount"),
            SkipReason::UnknownUser(email) => write!(f, "no active user with email {email}"),
            SkipReason::UnknownTour(reference) => write!(f, "no tour with id {reference}"),
        }
    }
}

/// Result of reconciling one session
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    Created(Booking),
    AlreadyRecorded(Booking),
    Skipped(SkipReason),
}

/// Error type for reconciliation
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepoError),

    /// The unique index rejected the insert but the winning row is gone
    #[error("Booking for session {0} conflicted but could not be loaded")]
    LostConflict(String),
}

async fn booking_for_session(
    repos: &Repositories,
    session_id: &str,
) -> Result<Option<Booking>, RepoError> {
    repos
        .bookings
        .find_first(vec![Filter::eq(
            "checkout_session_id",
            FilterValue::Text(session_id.to_string()),
        )])
        .await
}

/// Records the booking for a completed checkout session
///
/// Sessions that aren't paid, lack data or reference unknown users/tours
/// are skipped. Safe to call repeatedly for the same session.
pub async fn reconcile_checkout(
    repos: &Repositories,
    session: &CheckoutSession,
) -> Result<ReconcileOutcome, ReconcileError> {
    if !session.is_paid() {
        return Ok(ReconcileOutcome::Skipped(SkipReason::NotPaid));
    }

    let Some(email) = session.email() else {
        return Ok(ReconcileOutcome::Skipped(SkipReason::MissingEmail));
    };
    let Some(reference) = session.client_reference_id.as_deref() else {
        return Ok(ReconcileOutcome::Skipped(SkipReason::MissingTourReference));
    };
    let Some(amount_total) = session.amount_total else {
        return Ok(ReconcileOutcome::Skipped(SkipReason::MissingAmount));
    };

    if let Some(existing) = booking_for_session(repos, &session.id).await? {
        debug!(session_id = %session.id, booking_id = %existing.id, "Session already reconciled");
        return Ok(ReconcileOutcome::AlreadyRecorded(existing));
    }

    let tour = match Uuid::parse_str(reference) {
        Ok(tour_id) => repos.tours.find_by_id(tour_id).await?,
        Err(_) => None,
    };
    let Some(tour) = tour else {
        return Ok(ReconcileOutcome::Skipped(SkipReason::UnknownTour(
            reference.to_string(),
        )));
    };

    let user = repos
        .users
        .find_first(vec![
            Filter::eq("email", FilterValue::Text(normalize_email(email))),
            Filter::eq("active", FilterValue::Bool(true)),
        ])
        .await?;
    let Some(user) = user else {
        return Ok(ReconcileOutcome::Skipped(SkipReason::UnknownUser(
            email.to_string(),
        )));
    };

    let created = repos
        .bookings
        .insert(CreateBooking {
            tour_id: tour.id,
            user_id: user.id,
            price: amount_total as f64 / 100.0,
            paid: true,
            checkout_session_id: Some(session.id.clone()),
        })
        .await;

    match created {
        Ok(booking) => {
            info!(
                session_id = %session.id,
                booking_id = %booking.id,
                tour_id = %tour.id,
                user_id = %user.id,
                "Booking created from checkout session"
            );
            Ok(ReconcileOutcome::Created(booking))
        }
        Err(RepoError::Conflict(constraint)) => {
            warn!(session_id = %session.id, constraint = %constraint, "Concurrent delivery for session");
            booking_for_session(repos, &session.id)
                .await?
                .map(ReconcileOutcome::AlreadyRecorded)
                .ok_or_else(|| ReconcileError::LostConflict(session.id.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tour::tests::sample_create;
    use crate::models::user::{CreateUser, Role};
    use crate::query::ListQuery;
    use crate::repository::Entity;
    use serde_json::Map;

    async fn seed(repos: &Repositories) -> (Tour, String) {
        let tour = repos.tours.insert(sample_create()).await.unwrap();
        let user = repos
            .users
            .insert(CreateUser {
                name: "Jonas".to_string(),
                email: "jonas@example.com".to_string(),
                photo: None,
                role: Role::User,
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        (tour, user.email)
    }

    fn paid_session(tour: &Tour, email: &str) -> CheckoutSession {
        CheckoutSession {
            id: format!("cs_test_{}", Uuid::new_v4().simple()),
            url: None,
            client_reference_id: Some(tour.id.to_string()),
            customer_email: Some(email.to_string()),
            amount_total: Some(unit_amount(tour.price)),
            payment_status: Some("paid".to_string()),
            extra: Map::new(),
        }
    }

    #[test]
    fn test_unit_amount_rounds() {
        assert_eq!(unit_amount(397.0), 39700);
        assert_eq!(unit_amount(19.99), 1999);
        assert_eq!(unit_amount(0.125), 13);
    }

    #[test]
    fn test_build_checkout_request() {
        let tour = Tour::build(sample_create(), chrono::Utc::now());
        let request = build_checkout_request(&tour, "jonas@example.com", "https://tours.example.com/");

        assert_eq!(request.success_url, "https://tours.example.com/my-tours");
        assert_eq!(request.cancel_url, "https://tours.example.com/tour/the-forest-hiker");
        assert_eq!(request.client_reference_id, tour.id.to_string());
        assert_eq!(request.customer_email, "jonas@example.com");

        let item = &request.line_items[0];
        assert_eq!(item.name, "The Forest Hiker Tour");
        assert_eq!(item.unit_amount, 39700);
        assert_eq!(item.currency, "usd");
        assert_eq!(item.quantity, 1);
        assert_eq!(
            item.images,
            vec!["https://tours.example.com/img/tours/tour-1-cover.jpg"]
        );
    }

    #[tokio::test]
    async fn test_reconcile_creates_booking_once() {
        let repos = Repositories::in_memory();
        let (tour, email) = seed(&repos).await;
        let session = paid_session(&tour, &email);

        let first = reconcile_checkout(&repos, &session).await.unwrap();
        let ReconcileOutcome::Created(booking) = first else {
            panic!("expected a new booking, got {:?}", first);
        };
        assert_eq!(booking.tour_id, tour.id);
        assert_eq!(booking.price, 397.0);
        assert!(booking.paid);
        assert_eq!(booking.checkout_session_id.as_deref(), Some(session.id.as_str()));

        let second = reconcile_checkout(&repos, &session).await.unwrap();
        assert!(matches!(second, ReconcileOutcome::AlreadyRecorded(ref b) if b.id == booking.id));

        let all = repos.bookings.find_many(&ListQuery::all()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_sessions_make_distinct_bookings() {
        let repos = Repositories::in_memory();
        let (tour, email) = seed(&repos).await;

        reconcile_checkout(&repos, &paid_session(&tour, &email)).await.unwrap();
        reconcile_checkout(&repos, &paid_session(&tour, &email)).await.unwrap();

        let all = repos.bookings.find_many(&ListQuery::all()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_skips_unpaid_and_unknown() {
        let repos = Repositories::in_memory();
        let (tour, email) = seed(&repos).await;

        let mut unpaid = paid_session(&tour, &email);
        unpaid.payment_status = Some("unpaid".to_string());
        assert!(matches!(
            reconcile_checkout(&repos, &unpaid).await.unwrap(),
            ReconcileOutcome::Skipped(SkipReason::NotPaid)
        ));

        let stranger = paid_session(&tour, "nobody@example.com");
        assert!(matches!(
            reconcile_checkout(&repos, &stranger).await.unwrap(),
            ReconcileOutcome::Skipped(SkipReason::UnknownUser(_))
        ));

        let mut bad_tour = paid_session(&tour, &email);
        bad_tour.client_reference_id = Some("not-a-tour".to_string());
        assert!(matches!(
            reconcile_checkout(&repos, &bad_tour).await.unwrap(),
            ReconcileOutcome::Skipped(SkipReason::UnknownTour(_))
        ));

        let mut no_email = paid_session(&tour, &email);
        no_email.customer_email = None;
        assert!(matches!(
            reconcile_checkout(&repos, &no_email).await.unwrap(),
            ReconcileOutcome::Skipped(SkipReason::MissingEmail)
        ));

        let all = repos.bookings.find_many(&ListQuery::all()).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_email_lookup_is_case_insensitive() {
        let repos = Repositories::in_memory();
        let (tour, _) = seed(&repos).await;

        let outcome = reconcile_checkout(&repos, &paid_session(&tour, "Jonas@Example.com"))
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Created(_)));
    }
}
