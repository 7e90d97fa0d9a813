/// Stripe checkout sessions client
///
/// Sessions are created with a form-encoded `POST /v1/checkout/sessions`
/// authenticated by the secret key. The base URL is configurable so tests
/// and staging can point at a stub server.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    construct_event, signature::DEFAULT_TOLERANCE_SECS, CheckoutSession, CheckoutSessionRequest,
    PaymentError, PaymentProvider, WebhookEvent,
};

/// Default API endpoint
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Stripe credentials and endpoint
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key (`sk_...`)
    pub secret_key: String,

    /// Webhook signing secret (`whsec_...`)
    pub webhook_secret: String,

    pub api_base: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// HTTP client for Stripe
pub struct StripeClient {
    http: Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, config })
    }

    fn sessions_url(&self) -> String {
        format!(
            "{}/v1/checkout/sessions",
            self.config.api_base.trim_end_matches('/')
        )
    }
}

/// Flattens a checkout request into Stripe's bracketed form encoding
pub fn form_params(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("customer_email".to_string(), request.customer_email.clone()),
        (
            "client_reference_id".to_string(),
            request.client_reference_id.clone(),
        ),
    ];

    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        params.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        params.push((format!("{prefix}[price_data][currency]"), item.currency.clone()));
        params.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.unit_amount.to_string(),
        ));
        params.push((
            format!("{prefix}[price_data][product_data][name]"),
            item.name.clone(),
        ));
        params.push((
            format!("{prefix}[price_data][product_data][description]"),
            item.description.clone(),
        ));
        for (j, image) in item.images.iter().enumerate() {
            params.push((
                format!("{prefix}[price_data][product_data][images][{j}]"),
                image.clone(),
            ));
        }
    }

    params
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        debug!(
            client_reference_id = %request.client_reference_id,
            amount_total = request.amount_total(),
            "Creating checkout session"
        );

        let response = self
            .http
            .post(self.sessions_url())
            .bearer_auth(&self.config.secret_key)
            .form(&form_params(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error.message.unwrap_or_else(|| status.to_string()),
                Err(_) => status.to_string(),
            };
            warn!(status = status.as_u16(), message = %message, "Checkout session request rejected");

            return Err(PaymentError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let session = response
            .json::<CheckoutSession>()
            .await
            .map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;

        debug!(session_id = %session.id, "Checkout session created");
        Ok(session)
    }

    fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, PaymentError> {
        construct_event(
            payload,
            signature_header,
            &self.config.webhook_secret,
            DEFAULT_TOLERANCE_SECS,
            Utc::now().timestamp(),
        )
    }
}
