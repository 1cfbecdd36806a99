use std::sync::Arc;

use tracing::{info, warn};

use crate::models::payment::PaymentRecord;
use crate::services::quota::{QuotaError, QuotaLedger};
use crate::services::smtp_mailer::{MailError, Mailer, OutboundEmail};
use crate::utils::money::format_minor_units;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error(transparent)]
    Quota(#[from] QuotaError),
    #[error("mail delivery failed: {0}")]
    Mail(#[from] MailError),
}

/// Every outbound email goes through here: reserve one slot, send, and give
/// the slot back if the provider refuses the message.
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    quota: QuotaLedger,
    from: String,
    admin_email: String,
    portal_base: String,
}

impl Notifier {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        quota: QuotaLedger,
        from: impl Into<String>,
        admin_email: impl Into<String>,
        frontend_origin: &str,
    ) -> Self {
        Self {
            mailer,
            quota,
            from: from.into(),
            admin_email: admin_email.into(),
            portal_base: format!("{}/portal", frontend_origin.trim_end_matches('/')),
        }
    }

    pub async fn send_guarded(&self, email: &OutboundEmail) -> Result<(), NotifyError> {
        let permit = self.quota.reserve(1).await?;
        if let Err(err) = self.mailer.send(email).await {
            if let Err(release_err) = self.quota.release(permit).await {
                warn!(?release_err, "failed to release email quota after send failure");
            }
            return Err(err.into());
        }
        info!(to = %email.to, subject = %email.subject, remaining = permit.remaining, "email sent");
        Ok(())
    }

    fn portal_link(&self, record: &PaymentRecord) -> String {
        format!("{}/{}", self.portal_base, record.access_token)
    }

    fn to_payer(&self, record: &PaymentRecord, subject: String, body: String) -> OutboundEmail {
        OutboundEmail {
            from: self.from.clone(),
            to: record.email.clone(),
            subject,
            body,
        }
    }

    pub fn deposit_received_email(&self, record: &PaymentRecord) -> OutboundEmail {
        let body = format!(
            "Hi {name},\n\nWe received your deposit of {paid} for {plan}. Your project code is {code}.\n\n\
             The remaining {due} will be due once your project is ready for review.\n\n\
             Track progress any time:\n{link}\n",
            name = display_name(record),
            paid = format_minor_units(record.first_payment),
            plan = record.plan_name,
            code = record.project_code,
            due = format_minor_units(record.second_payment),
            link = self.portal_link(record),
        );
        self.to_payer(
            record,
            format!("Deposit received for project {}", record.project_code),
            body,
        )
    }

    pub fn project_ready_email(&self, record: &PaymentRecord) -> OutboundEmail {
        let body = format!(
            "Hi {name},\n\nYour {plan} project ({code}) is ready. The final payment of {due} is now due.\n\n\
             Review the project and pay here:\n{link}\n",
            name = display_name(record),
            plan = record.plan_name,
            code = record.project_code,
            due = format_minor_units(record.second_payment),
            link = self.portal_link(record),
        );
        self.to_payer(
            record,
            format!("Project {} is ready for final payment", record.project_code),
            body,
        )
    }

    pub fn final_payment_received_email(&self, record: &PaymentRecord) -> OutboundEmail {
        let body = format!(
            "Hi {name},\n\nWe received your final payment of {paid} for project {code}. \
             Your project is now complete, thank you!\n\n{link}\n",
            name = display_name(record),
            paid = format_minor_units(record.second_payment),
            code = record.project_code,
            link = self.portal_link(record),
        );
        self.to_payer(
            record,
            format!("Final payment received for project {}", record.project_code),
            body,
        )
    }

    pub fn fallback_alert_email(&self, record: &PaymentRecord, session_id: &str) -> OutboundEmail {
        let body = format!(
            "A deposit was recorded by the success-page fallback because no webhook had arrived.\n\n\
             Project: {code}\nSession: {session}\nPayer: {email}\nAmount: {paid}\n\n\
             Check the webhook endpoint configuration and delivery logs.\n",
            code = record.project_code,
            session = session_id,
            email = record.email,
            paid = format_minor_units(record.first_payment),
        );
        OutboundEmail {
            from: self.from.clone(),
            to: self.admin_email.clone(),
            subject: format!("Webhook fallback used for project {}", record.project_code),
            body,
        }
    }

    pub async fn deposit_received(&self, record: &PaymentRecord) {
        self.dispatch("deposit_received", record, self.deposit_received_email(record))
            .await
    }

    pub async fn project_ready(&self, record: &PaymentRecord) {
        self.dispatch("project_ready", record, self.project_ready_email(record))
            .await
    }

    pub async fn final_payment_received(&self, record: &PaymentRecord) {
        self.dispatch(
            "final_payment_received",
            record,
            self.final_payment_received_email(record),
        )
        .await
    }

    pub async fn fallback_alert(&self, record: &PaymentRecord, session_id: &str) {
        self.dispatch(
            "fallback_alert",
            record,
            self.fallback_alert_email(record, session_id),
        )
        .await
    }

    // Notification failures never fail the operation that triggered them.
    async fn dispatch(&self, kind: &'static str, record: &PaymentRecord, email: OutboundEmail) {
        if let Err(err) = self.send_guarded(&email).await {
            warn!(
                ?err,
                kind,
                project_code = %record.project_code,
                payment_id = %record.id,
                "notification not delivered"
            );
        }
    }
}

fn display_name(record: &PaymentRecord) -> &str {
    let name = record.name.trim();
    if name.is_empty() {
        "there"
    } else {
        name
    }
}
