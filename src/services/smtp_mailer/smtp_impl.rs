use async_trait::async_trait;
use lettre::{
    message::Mailbox,
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

use super::{MailError, Mailer, OutboundEmail};

#[derive(Clone)]
pub struct SmtpMailer {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpMailer {
    pub fn from_env() -> Result<Self, MailError> {
        let host = std::env::var("SMTP_HOST")?;
        let port: u16 = std::env::var("SMTP_PORT")?
            .parse()
            .map_err(|_| MailError::EnvVarMissing("SMTP_PORT must be a port number".into()))?;

        let disabled_tls = std::env::var("SMTP_TLS_DISABLED")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";

        let mailer = if disabled_tls {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host)
                .port(port)
                .build()
        } else {
            let username = std::env::var("SMTP_USERNAME")?;
            let password = std::env::var("SMTP_PASSWORD")?;
            let creds = Credentials::new(username, password);
            let tls = TlsParameters::new(host.clone())?;

            AsyncSmtpTransport::<Tokio1Executor>::relay(&host)?
                .port(port)
                .tls(Tls::Required(tls))
                .credentials(creds)
                .build()
        };

        Ok(Self {
            transport: Arc::new(mailer),
        })
    }
}

pub(crate) fn build_message(email: &OutboundEmail) -> Result<Message, MailError> {
    let from: Mailbox = email.from.parse()?;
    let to: Mailbox = email.to.parse()?;
    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.as_str())
        .body(email.body.clone())?;
    Ok(message)
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        let message = build_message(email)?;
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| e.into())
    }
}
