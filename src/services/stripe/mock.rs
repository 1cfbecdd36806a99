use super::{
    CheckoutSession, CheckoutSessionDetails, CreateCheckoutSessionRequest, StripeEvent,
    StripeService, StripeServiceError,
};
use crate::utils::stripe_signature::{signature_header, verify_signature, DEFAULT_TOLERANCE_SECS};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;

/// Records checkout requests, serves sessions from memory and verifies
/// webhook signatures the way Stripe does.
#[derive(Clone, Default)]
pub struct MockStripeService {
    pub webhook_secret: String,
    pub created_sessions: Arc<Mutex<Vec<CheckoutSession>>>,
    pub last_create_requests: Arc<Mutex<Vec<CreateCheckoutSessionRequest>>>,
    pub sessions: Arc<Mutex<HashMap<String, CheckoutSessionDetails>>>,
    pub retrieve_calls: Arc<Mutex<usize>>,
    pub fail_create: bool,
    pub fail_retrieve: bool,
}

impl MockStripeService {
    pub fn new(webhook_secret: &str) -> Self {
        Self {
            webhook_secret: webhook_secret.to_string(),
            ..Default::default()
        }
    }

    pub fn sign(&self, payload: &[u8]) -> String {
        signature_header(
            &self.webhook_secret,
            OffsetDateTime::now_utc().unix_timestamp(),
            payload,
        )
    }

    pub fn insert_session(&self, details: CheckoutSessionDetails) {
        self.sessions
            .lock()
            .unwrap()
            .insert(details.id.clone(), details);
    }

    pub fn mark_paid(&self, session_id: &str) {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(session_id) {
            session.payment_status = "paid".into();
        }
    }
}

fn make_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

#[async_trait]
impl StripeService for MockStripeService {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError> {
        self.last_create_requests.lock().unwrap().push(req.clone());
        if self.fail_create {
            return Err(StripeServiceError::Api("mock create failure".into()));
        }

        let session = CheckoutSession {
            id: make_id("cs_test"),
            url: Some("https://example.test/checkout".into()),
        };
        let amount_total: i64 = req
            .line_items
            .iter()
            .map(|li| li.unit_amount * li.quantity as i64)
            .sum();
        self.insert_session(CheckoutSessionDetails {
            id: session.id.clone(),
            payment_status: "unpaid".into(),
            amount_total: Some(amount_total),
            customer_email: req.customer_email.clone(),
            customer_name: None,
            metadata: req.metadata.clone(),
        });
        self.created_sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionDetails, StripeServiceError> {
        *self.retrieve_calls.lock().unwrap() += 1;
        if self.fail_retrieve {
            return Err(StripeServiceError::Api("mock retrieve failure".into()));
        }
        let found = self.sessions.lock().unwrap().get(session_id).cloned();
        found.ok_or_else(|| {
            StripeServiceError::NotFound(format!("checkout session {} not found", session_id))
        })
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError> {
        verify_signature(
            payload,
            signature_header,
            &self.webhook_secret,
            OffsetDateTime::now_utc().unix_timestamp(),
            DEFAULT_TOLERANCE_SECS,
        )
        .map_err(|e| StripeServiceError::Webhook(e.to_string()))?;

        let val: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        let id = val
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| make_id("evt"));
        let ty = val
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        Ok(StripeEvent {
            id,
            r#type: ty,
            payload: val,
        })
    }
}
