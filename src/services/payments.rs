use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::db::payment_repository::PaymentRepository;
use crate::models::checkout::{FinalPaymentMetadata, InitialPaymentMetadata};
use crate::models::payment::{
    CreatePaymentOutcome, FinalPaymentUpdate, NewPaymentRecord, PaymentRecord,
};
use crate::services::notifications::Notifier;
use crate::utils::codes::generate_access_token;

/// Which resolver established the deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSource {
    Webhook,
    Fallback,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSource::Webhook => "webhook",
            RecordSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositOutcome {
    Created(PaymentRecord),
    /// Another delivery or the other resolver got there first.
    AlreadyRecorded(PaymentRecord),
}

impl DepositOutcome {
    pub fn record(&self) -> &PaymentRecord {
        match self {
            DepositOutcome::Created(r) | DepositOutcome::AlreadyRecorded(r) => r,
        }
    }

    pub fn into_record(self) -> PaymentRecord {
        match self {
            DepositOutcome::Created(r) | DepositOutcome::AlreadyRecorded(r) => r,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, DepositOutcome::Created(_))
    }
}

pub fn new_deposit(
    meta: &InitialPaymentMetadata,
    session_id: &str,
    paid_at: OffsetDateTime,
) -> NewPaymentRecord {
    NewPaymentRecord {
        project_code: meta.project_code.clone(),
        access_token: generate_access_token(),
        plan_name: meta.plan_name.clone(),
        total_amount: meta.total_amount,
        first_payment: meta.first_payment,
        second_payment: meta.second_payment,
        email: meta.customer_email.clone(),
        name: meta.customer_name.clone(),
        first_session_id: session_id.to_string(),
        first_paid_at: paid_at,
        terms_accepted_at: meta.terms_accepted_at,
    }
}

/// The single write path for payment facts, shared by the webhook and the
/// success-page fallback. Notifications go out only after the store commits.
#[derive(Clone)]
pub struct PaymentRecorder {
    payments: Arc<dyn PaymentRepository>,
    notifier: Notifier,
}

impl PaymentRecorder {
    pub fn new(payments: Arc<dyn PaymentRepository>, notifier: Notifier) -> Self {
        Self { payments, notifier }
    }

    pub async fn record_deposit(
        &self,
        new: NewPaymentRecord,
        source: RecordSource,
    ) -> Result<DepositOutcome, sqlx::Error> {
        let outcome = match self.payments.create_initial_payment(&new).await? {
            CreatePaymentOutcome::Created(record) => {
                info!(
                    project_code = %record.project_code,
                    session_id = %new.first_session_id,
                    payment_id = %record.id,
                    source = source.as_str(),
                    "recorded deposit"
                );
                DepositOutcome::Created(record)
            }
            CreatePaymentOutcome::AlreadyExists(record) => {
                self.note_existing(&record, &new, source);
                DepositOutcome::AlreadyRecorded(record)
            }
            CreatePaymentOutcome::LostRace => {
                info!(
                    project_code = %new.project_code,
                    session_id = %new.first_session_id,
                    source = source.as_str(),
                    "lost deposit creation race, re-reading winner"
                );
                let winner = self
                    .payments
                    .find_by_code_or_session(Some(&new.project_code), &new.first_session_id)
                    .await?;
                match winner {
                    Some(record) => {
                        self.note_existing(&record, &new, source);
                        DepositOutcome::AlreadyRecorded(record)
                    }
                    None => {
                        error!(
                            project_code = %new.project_code,
                            session_id = %new.first_session_id,
                            "unique violation without a matching payment record"
                        );
                        return Err(sqlx::Error::RowNotFound);
                    }
                }
            }
        };

        if let DepositOutcome::Created(record) = &outcome {
            self.notifier.deposit_received(record).await;
            if source == RecordSource::Fallback {
                self.notifier
                    .fallback_alert(record, &new.first_session_id)
                    .await;
            }
        }
        Ok(outcome)
    }

    fn note_existing(&self, record: &PaymentRecord, new: &NewPaymentRecord, source: RecordSource) {
        let same_session = record.first_session_id.as_deref() == Some(new.first_session_id.as_str());
        if same_session {
            info!(
                project_code = %record.project_code,
                session_id = %new.first_session_id,
                source = source.as_str(),
                "deposit already recorded"
            );
        } else {
            error!(
                project_code = %new.project_code,
                session_id = %new.first_session_id,
                existing_session_id = ?record.first_session_id,
                payment_id = %record.id,
                "project code already used by a different checkout session"
            );
        }
    }

    pub async fn record_final(
        &self,
        meta: &FinalPaymentMetadata,
        session_id: &str,
    ) -> Result<FinalPaymentUpdate, sqlx::Error> {
        let update = self
            .payments
            .record_final_payment(meta.payment_id, session_id, OffsetDateTime::now_utc())
            .await?;

        match &update {
            FinalPaymentUpdate::Applied(record) => {
                if record.project_code != meta.project_code || record.second_payment != meta.amount
                {
                    warn!(
                        payment_id = %record.id,
                        project_code = %record.project_code,
                        metadata_project_code = %meta.project_code,
                        metadata_amount = meta.amount,
                        second_payment = record.second_payment,
                        "final payment metadata disagrees with the stored record"
                    );
                }
                info!(
                    payment_id = %record.id,
                    project_code = %record.project_code,
                    session_id,
                    "recorded final payment"
                );
                self.notifier.final_payment_received(record).await;
            }
            FinalPaymentUpdate::AlreadyPaid(record) => {
                info!(
                    payment_id = %record.id,
                    project_code = %record.project_code,
                    session_id,
                    "final payment already recorded"
                );
            }
            FinalPaymentUpdate::NotFound => {
                error!(
                    payment_id = %meta.payment_id,
                    project_code = %meta.project_code,
                    session_id,
                    "final payment received for a payment record that does not exist"
                );
            }
        }
        Ok(update)
    }
}
