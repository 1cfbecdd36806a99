use time::OffsetDateTime;
use tracing::{info, warn};

use crate::models::checkout::{MetadataError, SessionMetadata};
use crate::models::payment::FinalPaymentUpdate;
use crate::services::payments::{new_deposit, DepositOutcome, PaymentRecorder, RecordSource};
use crate::services::stripe::{CheckoutSessionDetails, StripeEvent};

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const CHECKOUT_ASYNC_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("event {event_id} has no checkout session object")]
    MissingSession { event_id: String },
    #[error("session {session_id} metadata: {source}")]
    Metadata {
        session_id: String,
        #[source]
        source: MetadataError,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Deposit(DepositOutcome),
    FinalPayment(FinalPaymentUpdate),
    /// Completed checkout whose funds have not settled yet.
    NotPaid { session_id: String },
    Ignored { event_type: String },
}

/// Authoritative resolver: applies verified processor events to the store.
#[derive(Clone)]
pub struct WebhookIngestor {
    recorder: PaymentRecorder,
}

impl WebhookIngestor {
    pub fn new(recorder: PaymentRecorder) -> Self {
        Self { recorder }
    }

    pub async fn handle_event(&self, event: &StripeEvent) -> Result<WebhookOutcome, WebhookError> {
        let evt_type = event.r#type.as_str();
        if evt_type != CHECKOUT_COMPLETED && evt_type != CHECKOUT_ASYNC_SUCCEEDED {
            info!(event_id = %event.id, evt_type, "ignoring stripe event");
            return Ok(WebhookOutcome::Ignored {
                event_type: evt_type.to_string(),
            });
        }

        let session = event
            .payload
            .pointer("/data/object")
            .and_then(CheckoutSessionDetails::from_json)
            .ok_or_else(|| WebhookError::MissingSession {
                event_id: event.id.clone(),
            })?;

        if !session.is_paid() {
            info!(
                event_id = %event.id,
                session_id = %session.id,
                payment_status = %session.payment_status,
                "checkout completed without settled payment, waiting for async result"
            );
            return Ok(WebhookOutcome::NotPaid {
                session_id: session.id,
            });
        }

        let metadata =
            SessionMetadata::from_map(&session.metadata).map_err(|source| WebhookError::Metadata {
                session_id: session.id.clone(),
                source,
            })?;

        match metadata {
            SessionMetadata::Initial(meta) => {
                let new = new_deposit(&meta, &session.id, OffsetDateTime::now_utc());
                let outcome = self
                    .recorder
                    .record_deposit(new, RecordSource::Webhook)
                    .await?;
                Ok(WebhookOutcome::Deposit(outcome))
            }
            SessionMetadata::Final(meta) => {
                let update = self.recorder.record_final(&meta, &session.id).await?;
                Ok(WebhookOutcome::FinalPayment(update))
            }
        }
    }
}

impl WebhookError {
    /// Whether redelivering the same event could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebhookError::Database(_))
    }

    pub fn log(&self) {
        warn!(err = %self, "stripe webhook event not applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock_db::{sample_record, MockPaymentRepository, MockQuotaRepository};
    use crate::models::checkout::{FinalPaymentMetadata, InitialPaymentMetadata};
    use crate::models::payment::ProjectStatus;
    use crate::services::notifications::Notifier;
    use crate::services::quota::QuotaLedger;
    use crate::services::smtp_mailer::MockMailer;
    use serde_json::json;
    use std::sync::Arc;

    fn ingestor(repo: Arc<MockPaymentRepository>, mailer: Arc<MockMailer>) -> WebhookIngestor {
        let notifier = Notifier::new(
            mailer,
            QuotaLedger::new(Arc::new(MockQuotaRepository::default()), 100),
            "billing@example.com",
            "ops@example.com",
            "https://studio.example",
        );
        WebhookIngestor::new(PaymentRecorder::new(repo, notifier))
    }

    fn deposit_event(session_id: &str, payment_status: &str) -> StripeEvent {
        let metadata = SessionMetadata::Initial(InitialPaymentMetadata {
            project_code: "K7M2QX".into(),
            plan_name: "Growth Site".into(),
            total_amount: 500_000,
            first_payment: 250_000,
            second_payment: 250_000,
            customer_email: "client@example.com".into(),
            customer_name: "Casey Client".into(),
            terms_accepted_at: None,
        })
        .to_map();
        StripeEvent {
            id: "evt_1".into(),
            r#type: CHECKOUT_COMPLETED.into(),
            payload: json!({
                "id": "evt_1",
                "type": CHECKOUT_COMPLETED,
                "data": { "object": {
                    "id": session_id,
                    "payment_status": payment_status,
                    "amount_total": 250000,
                    "metadata": metadata,
                }}
            }),
        }
    }

    #[tokio::test]
    async fn duplicate_delivery_creates_one_record() {
        let repo = Arc::new(MockPaymentRepository::default());
        let mailer = Arc::new(MockMailer::default());
        let ingest = ingestor(repo.clone(), mailer.clone());
        let event = deposit_event("cs_test_1", "paid");

        let first = ingest.handle_event(&event).await.unwrap();
        let second = ingest.handle_event(&event).await.unwrap();

        match (first, second) {
            (
                WebhookOutcome::Deposit(DepositOutcome::Created(a)),
                WebhookOutcome::Deposit(DepositOutcome::AlreadyRecorded(b)),
            ) => {
                assert_eq!(a.id, b.id);
                assert!(a.first_paid);
                assert_eq!(a.project_status, ProjectStatus::InProgress);
                assert_eq!(a.first_session_id.as_deref(), Some("cs_test_1"));
            }
            other => panic!("unexpected outcomes {other:?}"),
        }
        assert_eq!(repo.all().len(), 1);
        assert_eq!(mailer.sent_count(), 1);
    }

    #[tokio::test]
    async fn unpaid_completion_creates_nothing() {
        let repo = Arc::new(MockPaymentRepository::default());
        let ingest = ingestor(repo.clone(), Arc::new(MockMailer::default()));

        let outcome = ingest
            .handle_event(&deposit_event("cs_test_1", "unpaid"))
            .await
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::NotPaid { .. }));
        assert!(repo.all().is_empty());
    }

    #[tokio::test]
    async fn async_success_is_treated_like_completion() {
        let repo = Arc::new(MockPaymentRepository::default());
        let ingest = ingestor(repo.clone(), Arc::new(MockMailer::default()));
        let mut event = deposit_event("cs_test_1", "paid");
        event.r#type = CHECKOUT_ASYNC_SUCCEEDED.into();

        ingest.handle_event(&event).await.unwrap();
        assert_eq!(repo.all().len(), 1);
    }

    #[tokio::test]
    async fn unrelated_events_are_ignored() {
        let repo = Arc::new(MockPaymentRepository::default());
        let ingest = ingestor(repo.clone(), Arc::new(MockMailer::default()));
        let event = StripeEvent {
            id: "evt_2".into(),
            r#type: "invoice.paid".into(),
            payload: json!({}),
        };
        let outcome = ingest.handle_event(&event).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
    }

    #[tokio::test]
    async fn inconsistent_split_is_rejected_before_the_store() {
        let repo = Arc::new(MockPaymentRepository::default());
        let mailer = Arc::new(MockMailer::default());
        let ingest = ingestor(repo.clone(), mailer.clone());
        let mut event = deposit_event("cs_test_1", "paid");
        event.payload["data"]["object"]["metadata"]["second_payment"] = json!("1");

        let err = ingest.handle_event(&event).await.unwrap_err();

        assert!(matches!(
            err,
            WebhookError::Metadata {
                source: MetadataError::InconsistentSplit { .. },
                ..
            }
        ));
        assert!(!err.is_retryable());
        assert_eq!(*repo.create_attempts.lock().unwrap(), 0);
        assert_eq!(mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn missing_metadata_is_reported_not_retryable() {
        let ingest = ingestor(
            Arc::new(MockPaymentRepository::default()),
            Arc::new(MockMailer::default()),
        );
        let event = StripeEvent {
            id: "evt_3".into(),
            r#type: CHECKOUT_COMPLETED.into(),
            payload: json!({ "data": { "object": {
                "id": "cs_test_9", "payment_status": "paid", "metadata": {}
            }}}),
        };
        let err = ingest.handle_event(&event).await.unwrap_err();
        assert!(matches!(err, WebhookError::Metadata { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn final_phase_marks_second_payment() {
        let record = sample_record("K7M2QX", "cs_test_1");
        let id = record.id;
        let repo = Arc::new(MockPaymentRepository::with_records(vec![record]));
        let ingest = ingestor(repo.clone(), Arc::new(MockMailer::default()));
        let metadata = SessionMetadata::Final(FinalPaymentMetadata {
            payment_id: id,
            project_code: "K7M2QX".into(),
            amount: 150_000,
        })
        .to_map();
        let event = StripeEvent {
            id: "evt_4".into(),
            r#type: CHECKOUT_COMPLETED.into(),
            payload: json!({ "data": { "object": {
                "id": "cs_test_final", "payment_status": "paid", "metadata": metadata
            }}}),
        };

        let outcome = ingest.handle_event(&event).await.unwrap();
        assert!(matches!(
            outcome,
            WebhookOutcome::FinalPayment(FinalPaymentUpdate::Applied(_))
        ));
        let stored = repo.all().remove(0);
        assert!(stored.second_paid);
        assert_eq!(stored.project_status, ProjectStatus::Completed);
        assert_eq!(repo.all().len(), 1);
    }
}
