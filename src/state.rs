use std::sync::Arc;

use crate::config::Config;
use crate::db::{payment_repository::PaymentRepository, quota_repository::QuotaRepository};
use crate::services::checkout::CheckoutSessionFactory;
use crate::services::notifications::Notifier;
use crate::services::payments::PaymentRecorder;
use crate::services::project_status::ProjectStatusMachine;
use crate::services::quota::QuotaLedger;
use crate::services::reconcile::SuccessReconciler;
use crate::services::smtp_mailer::Mailer;
use crate::services::stripe::StripeService;
use crate::services::webhook::WebhookIngestor;

#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<dyn PaymentRepository>,
    pub stripe: Arc<dyn StripeService>,
    pub quota: QuotaLedger,
    pub notifier: Notifier,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        config: Config,
        payments: Arc<dyn PaymentRepository>,
        quota_repo: Arc<dyn QuotaRepository>,
        stripe: Arc<dyn StripeService>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let quota = QuotaLedger::new(quota_repo, config.email.daily_limit);
        let notifier = Notifier::new(
            mailer,
            quota.clone(),
            config.email.from.clone(),
            config.email.admin_alert_email.clone(),
            &config.frontend_origin,
        );
        Self {
            payments,
            stripe,
            quota,
            notifier,
            config: Arc::new(config),
        }
    }

    pub fn checkout(&self) -> CheckoutSessionFactory {
        CheckoutSessionFactory::new(
            self.payments.clone(),
            self.stripe.clone(),
            &self.config.frontend_origin,
            &self.config.stripe.currency,
        )
    }

    pub fn recorder(&self) -> PaymentRecorder {
        PaymentRecorder::new(self.payments.clone(), self.notifier.clone())
    }

    pub fn webhooks(&self) -> WebhookIngestor {
        WebhookIngestor::new(self.recorder())
    }

    pub fn reconciler(&self) -> SuccessReconciler {
        SuccessReconciler::new(
            self.payments.clone(),
            self.stripe.clone(),
            self.recorder(),
            self.config.reconcile,
        )
    }

    pub fn status_machine(&self) -> ProjectStatusMachine {
        ProjectStatusMachine::new(self.payments.clone(), self.notifier.clone())
    }
}
