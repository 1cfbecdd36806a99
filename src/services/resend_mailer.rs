use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::services::smtp_mailer::{MailError, Mailer, OutboundEmail};

const RESEND_API_BASE: &str = "https://api.resend.com";

#[derive(Clone)]
pub struct ResendMailer {
    api_key: String,
    base_url: String,
    http: Client,
}

impl ResendMailer {
    pub fn new(http: &Client, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: RESEND_API_BASE.to_string(),
            http: http.clone(),
        }
    }

    pub fn from_env(http: &Client) -> Result<Self, MailError> {
        let api_key = std::env::var("RESEND_API_KEY")
            .map_err(|_| MailError::EnvVarMissing("RESEND_API_KEY".into()))?;
        Ok(Self::new(http, api_key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        let payload = json!({
            "from": email.from,
            "to": [email.to],
            "subject": email.subject,
            "text": email.body,
        });

        let resp = self
            .http
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MailError::SendError(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            Err(MailError::SendError(format!(
                "Resend send failed: {} {}",
                status, text
            )))
        }
    }
}
