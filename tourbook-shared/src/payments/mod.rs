/// Payment provider integration
///
/// The provider is an opaque collaborator reached through two operations:
/// creating a hosted checkout session, and turning a signed webhook
/// delivery into a verified event. [`PaymentProvider`] abstracts both so the
/// HTTP layer can run against [`stripe::StripeClient`] in production and
/// [`mock::MockPaymentProvider`] in tests.
///
/// - `signature`: `Stripe-Signature` header parsing and HMAC verification
/// - `stripe`: HTTP client for the checkout sessions API
/// - `mock`: in-process provider recording requests

pub mod mock;
pub mod signature;
pub mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use signature::SignatureError;

/// Event type emitted when a customer completes checkout
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// Payment status of a settled checkout session
pub const PAYMENT_STATUS_PAID: &str = "paid";

/// Error type for payment provider operations
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// Transport failure talking to the provider
    #[error("Payment provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider rejected the request
    #[error("Payment provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    /// Webhook signature did not verify
    #[error("{0}")]
    Signature(#[from] SignatureError),

    /// Webhook body or provider response is not the expected JSON
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// One line of a checkout session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItem {
    pub name: String,
    pub description: String,
    pub images: Vec<String>,

    /// Minor currency units (cents)
    pub unit_amount: i64,

    /// ISO currency code, lowercase
    pub currency: String,

    pub quantity: u32,
}

/// Request for a hosted checkout session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSessionRequest {
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: String,

    /// Carries the tour id through to the webhook
    pub client_reference_id: String,

    pub line_items: Vec<LineItem>,
}

impl CheckoutSessionRequest {
    /// Sum of all line items in minor units
    pub fn amount_total(&self) -> i64 {
        self.line_items
            .iter()
            .map(|item| item.unit_amount * i64::from(item.quantity))
            .sum()
    }
}

/// Checkout session object as returned by the provider
///
/// Only the fields this service reads are typed; everything else is kept in
/// `extra` and passed through to clients unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub client_reference_id: Option<String>,

    #[serde(default)]
    pub customer_email: Option<String>,

    /// Minor currency units
    #[serde(default)]
    pub amount_total: Option<i64>,

    #[serde(default)]
    pub payment_status: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CheckoutSession {
    /// Customer email, falling back to `customer_details.email`
    pub fn email(&self) -> Option<&str> {
        self.customer_email.as_deref().or_else(|| {
            self.extra
                .get("customer_details")
                .and_then(|details| details.get("email"))
                .and_then(Value::as_str)
        })
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some(PAYMENT_STATUS_PAID)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub object: Value,
}

/// Verified webhook event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    pub data: EventData,
}

impl WebhookEvent {
    /// The event's object decoded as a checkout session
    pub fn checkout_session(&self) -> Result<CheckoutSession, PaymentError> {
        serde_json::from_value(self.data.object.clone())
            .map_err(|e| PaymentError::InvalidPayload(e.to_string()))
    }
}

/// Verifies a webhook delivery and decodes its event
pub fn construct_event(
    payload: &[u8],
    signature_header: &str,
    webhook_secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<WebhookEvent, PaymentError> {
    signature::verify_signature(payload, signature_header, webhook_secret, tolerance_secs, now)?;

    serde_json::from_slice(payload).map_err(|e| PaymentError::InvalidPayload(e.to_string()))
}

/// Payment provider operations
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a hosted checkout session
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Verifies a webhook delivery against the shared secret
    fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, PaymentError>;
}
