use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;

use crate::services::smtp_mailer::{MailError, Mailer, OutboundEmail};

use super::resend_mailer::ResendMailer;
use super::smtp_mailer::SmtpMailer;

#[derive(Clone)]
enum AppSender {
    Smtp(Arc<SmtpMailer>),
    Resend(Arc<ResendMailer>),
}

/// Picks the outbound transport from `EMAIL_PROVIDER` once at startup.
#[derive(Clone)]
pub struct PluggableMailer {
    app_sender: AppSender,
}

impl PluggableMailer {
    pub fn from_env(http: &Client) -> Result<Self, MailError> {
        let provider = std::env::var("EMAIL_PROVIDER").unwrap_or_else(|_| "smtp".into());
        let provider = provider.to_ascii_lowercase();

        match provider.as_str() {
            "smtp" => Ok(Self {
                app_sender: AppSender::Smtp(Arc::new(SmtpMailer::from_env()?)),
            }),
            "resend" => Ok(Self {
                app_sender: AppSender::Resend(Arc::new(ResendMailer::from_env(http)?)),
            }),
            other => Err(MailError::Other(format!(
                "Unsupported EMAIL_PROVIDER: {} (expected 'smtp' or 'resend')",
                other
            ))),
        }
    }

    pub fn provider(&self) -> &'static str {
        match &self.app_sender {
            AppSender::Smtp(_) => "smtp",
            AppSender::Resend(_) => "resend",
        }
    }
}

#[async_trait]
impl Mailer for PluggableMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        match &self.app_sender {
            AppSender::Smtp(smtp) => smtp.send(email).await,
            AppSender::Resend(resend) => resend.send(email).await,
        }
    }
}
