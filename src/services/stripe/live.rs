use super::{
    CheckoutLineItem, CheckoutSession, CheckoutSessionDetails, CreateCheckoutSessionRequest,
    StripeEvent, StripeService, StripeServiceError,
};
use async_trait::async_trait;

pub struct LiveStripeService {
    client: stripe::Client,
    webhook_secret: String,
}

impl LiveStripeService {
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        let client = stripe::Client::new(secret_key);
        Self {
            client,
            webhook_secret: webhook_secret.into(),
        }
    }

    pub fn from_settings(settings: &crate::config::StripeSettings) -> Self {
        Self::new(settings.secret_key.clone(), settings.webhook_secret.clone())
    }
}

fn map_line_items(
    items: &[CheckoutLineItem],
    currency: stripe::Currency,
) -> Vec<stripe::CreateCheckoutSessionLineItems> {
    items
        .iter()
        .map(|li| stripe::CreateCheckoutSessionLineItems {
            price_data: Some(stripe::CreateCheckoutSessionLineItemsPriceData {
                currency,
                product_data: Some(stripe::CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: li.name.clone(),
                    description: li.description.clone(),
                    ..Default::default()
                }),
                unit_amount: Some(li.unit_amount),
                ..Default::default()
            }),
            quantity: Some(li.quantity),
            ..Default::default()
        })
        .collect()
}

#[async_trait]
impl StripeService for LiveStripeService {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError> {
        let currency = req
            .currency
            .to_ascii_lowercase()
            .parse::<stripe::Currency>()
            .map_err(|e| StripeServiceError::Config(e.to_string()))?;

        let mut params = stripe::CreateCheckoutSession::new();
        params.mode = Some(stripe::CheckoutSessionMode::Payment);
        params.success_url = Some(req.success_url.as_str());
        params.cancel_url = Some(req.cancel_url.as_str());
        if let Some(ref id) = req.client_reference_id {
            params.client_reference_id = Some(id.as_str());
        }
        if let Some(ref email) = req.customer_email {
            params.customer_email = Some(email.as_str());
        }
        if !req.metadata.is_empty() {
            let mut m = std::collections::HashMap::new();
            for (k, v) in req.metadata.iter() {
                m.insert(k.clone(), v.clone());
            }
            params.metadata = Some(m);
        }
        if !req.line_items.is_empty() {
            params.line_items = Some(map_line_items(&req.line_items, currency));
        }

        let session = stripe::CheckoutSession::create(&self.client, params).await?;
        Ok(CheckoutSession {
            id: session.id.to_string(),
            url: session.url.clone(),
        })
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionDetails, StripeServiceError> {
        let id = session_id
            .parse::<stripe::CheckoutSessionId>()
            .map_err(|e| StripeServiceError::Other(e.to_string()))?;
        let session = stripe::CheckoutSession::retrieve(&self.client, &id, &[]).await?;
        let value =
            serde_json::to_value(&session).map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        CheckoutSessionDetails::from_json(&value).ok_or_else(|| {
            StripeServiceError::Serde(format!("unreadable checkout session {session_id}"))
        })
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError> {
        let payload_str =
            std::str::from_utf8(payload).map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        let event =
            stripe::Webhook::construct_event(payload_str, signature_header, &self.webhook_secret)?;
        let payload =
            serde_json::to_value(&event).map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        Ok(StripeEvent {
            id: event.id.to_string(),
            r#type: event.type_.to_string(),
            payload,
        })
    }
}
