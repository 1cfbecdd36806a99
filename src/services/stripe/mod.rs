// NOTE: async-stripe is compiled with a minimal feature set (runtime-tokio-hyper, checkout,
// webhook-events, and connect to satisfy webhook payload types). Touching APIs outside those
// features will require updating Cargo.toml explicitly so we keep compile times and binary
// size in check.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum StripeServiceError {
    #[error("payment processor request failed: {0}")]
    Api(String),
    #[error("webhook signature rejected: {0}")]
    Webhook(String),
    #[error("unknown checkout session: {0}")]
    NotFound(String),
    #[error("invalid checkout parameters: {0}")]
    Config(String),
    #[error("unreadable processor payload: {0}")]
    Serde(String),
    #[error("payment processor error: {0}")]
    Other(String),
}

impl From<stripe::StripeError> for StripeServiceError {
    fn from(err: stripe::StripeError) -> Self {
        StripeServiceError::Api(err.to_string())
    }
}

impl From<stripe::WebhookError> for StripeServiceError {
    fn from(err: stripe::WebhookError) -> Self {
        StripeServiceError::Webhook(err.to_string())
    }
}

/// Ad-hoc priced line item; plans are not Stripe catalog prices.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutLineItem {
    pub name: String,
    pub description: Option<String>,
    pub unit_amount: i64,
    pub quantity: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateCheckoutSessionRequest {
    pub success_url: String,
    pub cancel_url: String,
    pub currency: String,
    pub line_items: Vec<CheckoutLineItem>,
    pub customer_email: Option<String>,
    pub client_reference_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// The subset of a Checkout Session the reconciliation paths rely on.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutSessionDetails {
    pub id: String,
    pub payment_status: String,
    pub amount_total: Option<i64>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutSessionDetails {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    /// Reads a Checkout Session object as Stripe serializes it, both in
    /// webhook payloads (`data.object`) and in direct retrievals.
    pub fn from_json(obj: &serde_json::Value) -> Option<Self> {
        let id = obj.get("id")?.as_str()?.to_string();
        let payment_status = obj
            .get("payment_status")
            .and_then(|v| v.as_str())
            .unwrap_or("unpaid")
            .to_string();
        let amount_total = obj.get("amount_total").and_then(|v| v.as_i64());
        let details = obj.get("customer_details");
        let customer_email = details
            .and_then(|d| d.get("email"))
            .and_then(|v| v.as_str())
            .or_else(|| obj.get("customer_email").and_then(|v| v.as_str()))
            .map(|s| s.to_string());
        let customer_name = details
            .and_then(|d| d.get("name"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let metadata = obj
            .get("metadata")
            .and_then(|m| m.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            id,
            payment_status,
            amount_total,
            customer_email,
            customer_name,
            metadata,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    pub r#type: String,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait StripeService: Send + Sync {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionDetails, StripeServiceError>;

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError>;
}

mod live;
#[cfg(test)]
mod mock;

pub use live::LiveStripeService;
#[cfg(test)]
pub use mock::MockStripeService;
