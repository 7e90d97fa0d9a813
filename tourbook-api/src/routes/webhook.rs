/// Payment provider webhook
///
/// # Endpoint
///
/// ```text
/// POST /webhook-checkout
/// Stripe-Signature: t=<unix>,v1=<hex hmac-sha256>
/// ```
///
/// The raw body is verified against the signature header before it is
/// parsed. Unverified deliveries get `400` and are not processed. Every
/// verified event is acknowledged with `200 {"received": true}`; a
/// `checkout.session.completed` event is reconciled into a booking first,
/// and failures while doing so are logged rather than returned, since the
/// provider can't act on them.

use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use bytes::Bytes;
use serde_json::{json, Value};
use tourbook_shared::{
    checkout::{reconcile_checkout, ReconcileOutcome},
    payments::{PaymentError, WebhookEvent, CHECKOUT_SESSION_COMPLETED},
};
use tracing::{debug, error, info, warn};

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

/// Signature header sent with every delivery
pub const SIGNATURE_HEADER: &str = "stripe-signature";

fn webhook_error(message: impl std::fmt::Display) -> ApiError {
    ApiError::BadRequest(format!("Webhook error: {}", message))
}

async fn handle_event(state: &AppState, event: &WebhookEvent) {
    if event.event_type != CHECKOUT_SESSION_COMPLETED {
        debug!(event_id = %event.id, event_type = %event.event_type, "Ignoring webhook event");
        return;
    }

    let session = match event.checkout_session() {
        Ok(session) => session,
        Err(e) => {
            warn!(event_id = %event.id, error = %e, "Checkout event carries no usable session");
            return;
        }
    };

    match reconcile_checkout(&state.repos, &session).await {
        Ok(ReconcileOutcome::Created(booking)) => info!(
            event_id = %event.id,
            session_id = %session.id,
            booking_id = %booking.id,
            "Booking recorded"
        ),
        Ok(ReconcileOutcome::AlreadyRecorded(booking)) => info!(
            event_id = %event.id,
            session_id = %session.id,
            booking_id = %booking.id,
            "Duplicate delivery, booking already recorded"
        ),
        Ok(ReconcileOutcome::Skipped(reason)) => warn!(
            event_id = %event.id,
            session_id = %session.id,
            reason = %reason,
            "No booking created for checkout session"
        ),
        Err(e) => error!(
            event_id = %event.id,
            session_id = %session.id,
            error = %e,
            "Failed to reconcile checkout session"
        ),
    }
}

/// Webhook handler
pub async fn webhook_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        warn!("Webhook delivery without signature header");
        return Err(webhook_error("missing Stripe-Signature header"));
    };

    let event = match state.payments.construct_event(&body, signature) {
        Ok(event) => event,
        Err(e @ (PaymentError::Signature(_) | PaymentError::InvalidPayload(_))) => {
            warn!(error = %e, "Rejected webhook delivery");
            return Err(webhook_error(e));
        }
        Err(e) => {
            error!(error = %e, "Webhook verification failed");
            return Err(webhook_error(e));
        }
    };

    info!(event_id = %event.id, event_type = %event.event_type, "Webhook event received");
    handle_event(&state, &event).await;

    Ok(Json(json!({ "received": true })))
}
