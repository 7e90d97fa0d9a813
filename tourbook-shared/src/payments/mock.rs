/// Mock payment provider
///
/// Creates sessions in-process and records every request. Webhook
/// verification uses the real signature check, so tests sign deliveries
/// with [`MockPaymentProvider::sign`].
///
/// # Example
///
/// ```
/// use tourbook_shared::payments::mock::MockPaymentProvider;
/// use tourbook_shared::payments::PaymentProvider;
///
/// let provider = MockPaymentProvider::new("whsec_test");
/// let body = br#"{"id":"evt_1","type":"ping","data":{"object":{}}}"#;
/// let header = provider.sign(body);
/// assert!(provider.construct_event(body, &header).is_ok());
/// ```

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::{
    construct_event, signature::{sign_payload, DEFAULT_TOLERANCE_SECS}, CheckoutSession,
    CheckoutSessionRequest, PaymentError, PaymentProvider, WebhookEvent,
    CHECKOUT_SESSION_COMPLETED,
};

pub struct MockPaymentProvider {
    webhook_secret: String,
    requests: Mutex<Vec<CheckoutSessionRequest>>,
    failing: AtomicBool,
}

impl MockPaymentProvider {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            requests: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Makes session creation fail with a provider error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CheckoutSessionRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Signature header for `payload`, timestamped now
    pub fn sign(&self, payload: &[u8]) -> String {
        sign_payload(payload, &self.webhook_secret, Utc::now().timestamp())
    }

    /// Body of a `checkout.session.completed` event for `session`
    pub fn completed_event(session: &CheckoutSession) -> Vec<u8> {
        let event = json!({
            "id": format!("evt_{}", Uuid::new_v4().simple()),
            "object": "event",
            "type": CHECKOUT_SESSION_COMPLETED,
            "data": { "object": session },
        });

        serde_json::to_vec(&event).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PaymentError::Provider {
                status: 500,
                message: "mock provider unavailable".to_string(),
            });
        }

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let id = format!("cs_test_{}", Uuid::new_v4().simple());
        let mut extra = Map::new();
        extra.insert("object".to_string(), Value::from("checkout.session"));
        extra.insert("mode".to_string(), Value::from("payment"));
        extra.insert("success_url".to_string(), Value::from(request.success_url.clone()));
        extra.insert("cancel_url".to_string(), Value::from(request.cancel_url.clone()));

        Ok(CheckoutSession {
            url: Some(format!("https://checkout.stripe.test/c/pay/{id}")),
            id,
            client_reference_id: Some(request.client_reference_id.clone()),
            customer_email: Some(request.customer_email.clone()),
            amount_total: Some(request.amount_total()),
            payment_status: Some("unpaid".to_string()),
            extra,
        })
    }

    fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, PaymentError> {
        construct_event(
            payload,
            signature_header,
            &self.webhook_secret,
            DEFAULT_TOLERANCE_SECS,
            Utc::now().timestamp(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::LineItem;

    fn request(unit_amount: i64) -> CheckoutSessionRequest {
        CheckoutSessionRequest {
            success_url: "http://localhost/my-tours".to_string(),
            cancel_url: "http://localhost/tour/x".to_string(),
            customer_email: "a@b.c".to_string(),
            client_reference_id: "tour".to_string(),
            line_items: vec![LineItem {
                name: "X Tour".to_string(),
                description: "x".to_string(),
                images: vec![],
                unit_amount,
                currency: "usd".to_string(),
                quantity: 1,
            }],
        }
    }

    #[tokio::test]
    async fn test_create_session_records_request() {
        let provider = MockPaymentProvider::new("whsec");
        let session = provider.create_checkout_session(&request(49700)).await.unwrap();

        assert!(session.id.starts_with("cs_test_"));
        assert_eq!(session.amount_total, Some(49700));
        assert_eq!(session.client_reference_id.as_deref(), Some("tour"));
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_provider() {
        let provider = MockPaymentProvider::new("whsec");
        provider.set_failing(true);

        let err = provider.create_checkout_session(&request(1)).await.unwrap_err();
        assert!(matches!(err, PaymentError::Provider { status: 500, .. }));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_completed_event_verifies() {
        let provider = MockPaymentProvider::new("whsec");
        let mut session = provider.create_checkout_session(&request(100)).await.unwrap();
        session.payment_status = Some("paid".to_string());

        let body = MockPaymentProvider::completed_event(&session);
        let event = provider.construct_event(&body, &provider.sign(&body)).unwrap();

        assert_eq!(event.event_type, CHECKOUT_SESSION_COMPLETED);
        assert_eq!(event.checkout_session().unwrap(), session);
        assert!(provider.construct_event(&body, "t=1,v1=00").is_err());
    }
}
